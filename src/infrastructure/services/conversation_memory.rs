//! Facade combining the transcript and the semantic cache
//!
//! This is where recovered store failures are logged and dropped: reads that
//! fail look like an empty history or a cache miss, writes that fail are
//! skipped. Embedding failures still reach the caller.

use std::sync::Arc;

use serde_json::Value;

use super::history_service::ConversationHistoryService;
use super::semantic_cache_service::SemanticCacheService;
use crate::domain::embedding::Embedder;
use crate::domain::history::{HistoryConfig, Turn};
use crate::domain::semantic_cache::{CacheLookup, SemanticCacheConfig};
use crate::domain::DomainError;
use crate::infrastructure::database::Database;

#[derive(Debug)]
pub struct ConversationMemory {
    history: ConversationHistoryService,
    cache: SemanticCacheService,
}

impl ConversationMemory {
    pub fn new(
        database: Database,
        embedder: Arc<dyn Embedder>,
        history_config: HistoryConfig,
        cache_config: SemanticCacheConfig,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            history: ConversationHistoryService::with_config(database.clone(), history_config),
            cache: SemanticCacheService::with_config(database, embedder, cache_config)?,
        })
    }

    pub fn history_service(&self) -> &ConversationHistoryService {
        &self.history
    }

    pub fn cache_service(&self) -> &SemanticCacheService {
        &self.cache
    }

    /// Recent turns for a user; empty when the store is unavailable
    pub async fn history(&self, user_id: &str, limit: Option<usize>) -> Vec<Turn> {
        self.history
            .get_history(user_id, limit)
            .await
            .unwrap_or_default_logged("history.read")
    }

    /// Record a turn; a store failure is logged and the turn is lost
    pub async fn record_turn(&self, user_id: &str, asker_text: &str, responder_text: &str) {
        let _ = self
            .history
            .add_interaction(user_id, asker_text, responder_text)
            .await
            .log_and_continue("history.write");
    }

    /// Cached payload for a query, `None` on a miss or a store failure
    pub async fn cached_result(&self, query_text: &str) -> Result<Option<Value>, DomainError> {
        Ok(self
            .cache
            .lookup(query_text)
            .await?
            .log_and_continue("cache.lookup")
            .and_then(CacheLookup::into_payload))
    }

    /// Cache a payload for a query; a store failure is logged and skipped
    pub async fn store_result(&self, query_text: &str, result: Value) -> Result<(), DomainError> {
        let _ = self
            .cache
            .update_cache(query_text, result)
            .await?
            .log_and_continue("cache.write");

        Ok(())
    }
}
