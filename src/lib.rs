//! Conversation memory for assistant services
//!
//! Two best-effort stores share one document store client:
//! - a bounded per-user conversation history, keyed by hashed user id
//! - a semantic response cache, hit by exact query hash or by embedding similarity
//!
//! Store outages degrade to empty histories and cache misses instead of failing
//! the request.

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
pub use infrastructure::database::{Database, DatabaseConfig};
pub use infrastructure::services::{
    ConversationHistoryService, ConversationMemory, SemanticCacheService,
};
