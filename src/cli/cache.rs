//! `lookup` and `remember` subcommands

use anyhow::Context;
use clap::Args;
use serde_json::Value;

use super::context::CliContext;
use crate::domain::CacheLookup;
use crate::infrastructure::database::Database;
use crate::infrastructure::services::ConversationMemory;

#[derive(Args, Debug)]
pub struct LookupArgs {
    pub query: String,
}

#[derive(Args, Debug)]
pub struct RememberArgs {
    pub query: String,

    /// JSON document to cache
    pub result: String,
}

pub async fn lookup(context: &CliContext, args: LookupArgs) -> anyhow::Result<()> {
    let embedder = context.embedder()?;
    let history_config = context.config.history_config();
    let cache_config = context.config.cache_config();

    Database::scoped(&context.database, |db| async move {
        let memory = ConversationMemory::new(db, embedder, history_config, cache_config)?;
        let lookup = memory
            .cache_service()
            .lookup(&args.query)
            .await?
            .log_and_continue("cache.lookup");

        match lookup {
            Some(CacheLookup::Hit(hit)) => {
                println!(
                    "{:?} hit (similarity {:.4}, entry {})",
                    hit.match_kind, hit.similarity, hit.entry_id
                );
                println!("{}", serde_json::to_string_pretty(&hit.payload)?);
            }
            Some(CacheLookup::Miss) | None => println!("Miss"),
        }

        Ok::<_, anyhow::Error>(())
    })
    .await
}

pub async fn remember(context: &CliContext, args: RememberArgs) -> anyhow::Result<()> {
    let result: Value =
        serde_json::from_str(&args.result).context("Result must be a JSON document")?;
    let embedder = context.embedder()?;
    let history_config = context.config.history_config();
    let cache_config = context.config.cache_config();

    Database::scoped(&context.database, |db| async move {
        let memory = ConversationMemory::new(db, embedder, history_config, cache_config)?;
        memory.store_result(&args.query, result).await?;

        println!("Cached result for '{}'", args.query);
        Ok::<_, anyhow::Error>(())
    })
    .await
}
