//! `provision` and `sweep` subcommands

use tracing::info;

use super::context::CliContext;
use crate::infrastructure::database::Database;

pub async fn provision(context: &CliContext) -> anyhow::Result<()> {
    Database::scoped(&context.database, |db| async move {
        info!(
            history = db.history_container(),
            cache = db.cache_container(),
            backend = db.store().backend_name(),
            "Containers provisioned"
        );
        println!(
            "Provisioned '{}' and '{}'",
            db.history_container(),
            db.cache_container()
        );
        Ok::<_, anyhow::Error>(())
    })
    .await
}

pub async fn sweep(context: &CliContext) -> anyhow::Result<()> {
    Database::scoped(&context.database, |db| async move {
        let purged = db.sweep_expired().await?;

        println!("Purged {} expired document(s)", purged);
        Ok::<_, anyhow::Error>(())
    })
    .await
}
