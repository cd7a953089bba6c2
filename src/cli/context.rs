//! Shared setup for every subcommand

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::warn;

use crate::config::AppConfig;
use crate::domain::Embedder;
use crate::infrastructure::database::DatabaseConfig;
use crate::infrastructure::embedding::AzureOpenAiEmbedder;
use crate::infrastructure::http_client::HttpClient;
use crate::infrastructure::logging;

const EMBEDDING_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct CliContext {
    pub config: AppConfig,
    pub database: DatabaseConfig,
}

impl CliContext {
    /// Read `.env` and the configuration sources, then start logging
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = AppConfig::load().context("Failed to load configuration")?;
        config.validate()?;

        logging::init_logging(&config.logging_config())?;

        let database = config.database_config()?;

        if !database.store.store_type().is_durable() {
            warn!(
                backend = %config.store_backend,
                "Store is in-process, history and cached results are dropped when this command exits"
            );
        }

        Ok(Self { config, database })
    }

    /// Azure OpenAI embedder from the configured deployment
    pub fn embedder(&self) -> anyhow::Result<Arc<dyn Embedder>> {
        let client = HttpClient::with_timeout(EMBEDDING_REQUEST_TIMEOUT)?;
        let embedder = AzureOpenAiEmbedder::new(client, self.config.embedding_config()?)?;

        Ok(Arc::new(embedder))
    }
}
