//! Store factory for runtime backend selection

use std::sync::Arc;

use crate::domain::store::DocumentStore;
use crate::domain::DomainError;

use super::in_memory::InMemoryDocumentStore;
use super::postgres::{PostgresDocumentStore, PostgresStoreConfig};

/// Supported store backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreType {
    /// In-process store (tests and local runs)
    InMemory,
    /// PostgreSQL with pgvector
    Postgres,
}

impl StoreType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "memory" | "inmemory" | "in-memory" | "in_memory" => Some(Self::InMemory),
            "postgres" | "postgresql" | "pg" => Some(Self::Postgres),
            _ => None,
        }
    }

    /// Whether documents outlive the process that wrote them
    pub fn is_durable(self) -> bool {
        matches!(self, Self::Postgres)
    }
}

/// Store backend configuration
#[derive(Debug, Clone)]
pub enum StoreConfig {
    InMemory,
    Postgres(PostgresStoreConfig),
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self::InMemory
    }

    pub fn postgres(config: PostgresStoreConfig) -> Self {
        Self::Postgres(config)
    }

    pub fn store_type(&self) -> StoreType {
        match self {
            Self::InMemory => StoreType::InMemory,
            Self::Postgres(_) => StoreType::Postgres,
        }
    }
}

/// Factory for document store instances
#[derive(Debug)]
pub struct StoreFactory;

impl StoreFactory {
    /// Create and connect a store for the configured backend
    pub async fn create(config: &StoreConfig) -> Result<Arc<dyn DocumentStore>, DomainError> {
        match config {
            StoreConfig::InMemory => Ok(Arc::new(InMemoryDocumentStore::new())),
            StoreConfig::Postgres(pg_config) => {
                let store = PostgresDocumentStore::connect(pg_config).await?;
                Ok(Arc::new(store))
            }
        }
    }
}
