use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::{DomainError, EvictionMode, HistoryConfig, SemanticCacheConfig};
use crate::infrastructure::database::DatabaseConfig;
use crate::infrastructure::embedding::EmbeddingConfig;
use crate::infrastructure::logging::LoggingConfig;
use crate::infrastructure::store::{PostgresStoreConfig, StoreConfig, StoreType};

/// Application configuration
///
/// Keys are flat so they map one to one onto environment variables
/// (`CACHE_MAX_SIZE` sets `cache_max_size`).
#[derive(Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_ttl_secs")]
    pub history_ttl: u64,
    #[serde(default = "default_ttl_secs")]
    pub cache_ttl: u64,
    #[serde(default = "default_similarity_threshold")]
    pub cache_similarity_threshold: f32,
    #[serde(default = "default_cache_max_size")]
    pub cache_max_size: usize,
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,

    #[serde(default = "default_store_backend")]
    pub store_backend: String,
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub store_key: Option<String>,
    #[serde(default = "default_db_name")]
    pub db_name: String,
    #[serde(default = "default_history_container")]
    pub history_container: String,
    #[serde(default = "default_cache_container")]
    pub cache_container: String,
    #[serde(default = "default_container_throughput")]
    pub container_throughput: u32,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default)]
    pub embedding_endpoint: Option<String>,
    #[serde(default)]
    pub embedding_api_key: Option<String>,
    #[serde(default = "default_embedding_api_version")]
    pub embedding_api_version: String,
    #[serde(default = "default_embedding_deployment")]
    pub embedding_deployment: String,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,

    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
    /// Background expiry sweep period, 0 disables it
    #[serde(default)]
    pub ttl_sweep_interval_secs: u64,
    #[serde(default)]
    pub strict_eviction: bool,

    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn default_ttl_secs() -> u64 {
    10800
}

fn default_similarity_threshold() -> f32 {
    0.95
}

fn default_cache_max_size() -> usize {
    1000
}

fn default_max_history_turns() -> usize {
    5
}

fn default_store_backend() -> String {
    "memory".to_string()
}

fn default_db_name() -> String {
    "convo_cache".to_string()
}

fn default_history_container() -> String {
    "conversation_history".to_string()
}

fn default_cache_container() -> String {
    "semantic_cache".to_string()
}

fn default_container_throughput() -> u32 {
    400
}

fn default_max_connections() -> u32 {
    10
}

fn default_embedding_api_version() -> String {
    "2024-02-01".to_string()
}

fn default_embedding_deployment() -> String {
    "text-embedding-ada-002".to_string()
}

fn default_embedding_dimensions() -> usize {
    1536
}

fn default_operation_timeout_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            history_ttl: default_ttl_secs(),
            cache_ttl: default_ttl_secs(),
            cache_similarity_threshold: default_similarity_threshold(),
            cache_max_size: default_cache_max_size(),
            max_history_turns: default_max_history_turns(),
            store_backend: default_store_backend(),
            database_url: None,
            store_key: None,
            db_name: default_db_name(),
            history_container: default_history_container(),
            cache_container: default_cache_container(),
            container_throughput: default_container_throughput(),
            max_connections: default_max_connections(),
            embedding_endpoint: None,
            embedding_api_key: None,
            embedding_api_version: default_embedding_api_version(),
            embedding_deployment: default_embedding_deployment(),
            embedding_dimensions: default_embedding_dimensions(),
            operation_timeout_ms: default_operation_timeout_ms(),
            ttl_sweep_interval_secs: 0,
            strict_eviction: false,
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |secret: &Option<String>| secret.as_ref().map(|_| "<redacted>");

        f.debug_struct("AppConfig")
            .field("history_ttl", &self.history_ttl)
            .field("cache_ttl", &self.cache_ttl)
            .field("cache_similarity_threshold", &self.cache_similarity_threshold)
            .field("cache_max_size", &self.cache_max_size)
            .field("max_history_turns", &self.max_history_turns)
            .field("store_backend", &self.store_backend)
            .field("database_url", &self.database_url)
            .field("store_key", &redact(&self.store_key))
            .field("db_name", &self.db_name)
            .field("history_container", &self.history_container)
            .field("cache_container", &self.cache_container)
            .field("embedding_endpoint", &self.embedding_endpoint)
            .field("embedding_api_key", &redact(&self.embedding_api_key))
            .field("embedding_deployment", &self.embedding_deployment)
            .field("embedding_dimensions", &self.embedding_dimensions)
            .field("operation_timeout_ms", &self.operation_timeout_ms)
            .field("strict_eviction", &self.strict_eviction)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl AppConfig {
    /// Load from `config/default`, `config/local` and the process environment
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_with_env(None)
    }

    /// Same as [`AppConfig::load`] with an explicit environment, used by tests
    pub fn load_with_env(env: Option<HashMap<String, String>>) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::default()
                    .source(env)
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Reject values no component can work with
    pub fn validate(&self) -> Result<(), DomainError> {
        if !(0.0..=1.0).contains(&self.cache_similarity_threshold) {
            return Err(DomainError::configuration(format!(
                "cache_similarity_threshold must be within [0, 1], got {}",
                self.cache_similarity_threshold
            )));
        }

        if self.cache_max_size == 0 {
            return Err(DomainError::configuration("cache_max_size must be at least 1"));
        }

        if self.max_history_turns == 0 {
            return Err(DomainError::configuration("max_history_turns must be at least 1"));
        }

        if self.embedding_dimensions == 0 {
            return Err(DomainError::configuration("embedding_dimensions must be at least 1"));
        }

        Ok(())
    }

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level.clone(),
            format: self.log_format.clone(),
        }
    }

    pub fn history_config(&self) -> HistoryConfig {
        HistoryConfig::new()
            .with_max_turns(self.max_history_turns)
            .with_ttl(Duration::from_secs(self.history_ttl))
    }

    pub fn cache_config(&self) -> SemanticCacheConfig {
        let eviction = if self.strict_eviction {
            EvictionMode::Serialized
        } else {
            EvictionMode::BestEffort
        };

        SemanticCacheConfig::new()
            .with_similarity_threshold(self.cache_similarity_threshold)
            .with_max_entries(self.cache_max_size)
            .with_ttl(Duration::from_secs(self.cache_ttl))
            .with_dimensions(self.embedding_dimensions)
            .with_eviction(eviction)
    }

    pub fn embedding_config(&self) -> Result<EmbeddingConfig, DomainError> {
        let endpoint = self
            .embedding_endpoint
            .clone()
            .ok_or_else(|| DomainError::configuration("embedding_endpoint is not set"))?;
        let api_key = self
            .embedding_api_key
            .clone()
            .ok_or_else(|| DomainError::configuration("embedding_api_key is not set"))?;

        Ok(EmbeddingConfig::new(endpoint, api_key)
            .with_api_version(&self.embedding_api_version)
            .with_deployment(&self.embedding_deployment)
            .with_dimensions(self.embedding_dimensions))
    }

    pub fn store_config(&self) -> Result<StoreConfig, DomainError> {
        let store_type = StoreType::parse(&self.store_backend).ok_or_else(|| {
            DomainError::configuration(format!("Unknown store backend '{}'", self.store_backend))
        })?;

        match store_type {
            StoreType::InMemory => Ok(StoreConfig::in_memory()),
            StoreType::Postgres => {
                let url = self.database_url.clone().ok_or_else(|| {
                    DomainError::configuration("database_url is required for the postgres backend")
                })?;

                let mut pg = PostgresStoreConfig::new(url, &self.db_name)
                    .with_max_connections(self.max_connections);

                if let Some(ref key) = self.store_key {
                    pg = pg.with_key(key);
                }

                Ok(StoreConfig::postgres(pg))
            }
        }
    }

    pub fn database_config(&self) -> Result<DatabaseConfig, DomainError> {
        let mut config = DatabaseConfig::new(self.store_config()?)
            .with_containers(&self.history_container, &self.cache_container)
            .with_ttls(
                Duration::from_secs(self.history_ttl),
                Duration::from_secs(self.cache_ttl),
            )
            .with_embedding_dimensions(self.embedding_dimensions)
            .with_operation_timeout(Duration::from_millis(self.operation_timeout_ms));

        config.throughput = self.container_throughput;

        if self.ttl_sweep_interval_secs > 0 {
            config = config.with_sweep_interval(Duration::from_secs(self.ttl_sweep_interval_secs));
        }

        Ok(config)
    }
}
