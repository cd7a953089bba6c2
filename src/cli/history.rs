//! `history` and `record` subcommands

use clap::Args;

use super::context::CliContext;
use crate::infrastructure::database::Database;
use crate::infrastructure::services::ConversationHistoryService;

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Raw user id; it is hashed before it reaches the store
    pub user: String,

    /// Only show the most recent turns
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug)]
pub struct RecordArgs {
    pub user: String,
    pub asker: String,
    pub responder: String,
}

pub async fn show(context: &CliContext, args: HistoryArgs) -> anyhow::Result<()> {
    let history_config = context.config.history_config();

    Database::scoped(&context.database, |db| async move {
        let service = ConversationHistoryService::with_config(db, history_config);
        let turns = service
            .get_history(&args.user, args.limit)
            .await
            .unwrap_or_default_logged("history.read");

        println!("{}", serde_json::to_string_pretty(&turns)?);
        Ok::<_, anyhow::Error>(())
    })
    .await
}

pub async fn record(context: &CliContext, args: RecordArgs) -> anyhow::Result<()> {
    let history_config = context.config.history_config();

    Database::scoped(&context.database, |db| async move {
        let service = ConversationHistoryService::with_config(db, history_config);

        match service
            .add_interaction(&args.user, &args.asker, &args.responder)
            .await
            .log_and_continue("history.write")
        {
            Some(turns) => println!("Stored, {} turn(s) in history", turns),
            None => println!("Turn not stored, see log"),
        }

        Ok::<_, anyhow::Error>(())
    })
    .await
}
