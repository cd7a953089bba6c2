//! Conversation history service
//!
//! Keeps a bounded, per-user transcript in the history container. User ids are
//! hashed once per call before they reach the store.

use tracing::debug;

use crate::domain::history::{HistoryConfig, HistoryRecord, Turn};
use crate::domain::store::DocumentStoreExt;
use crate::domain::{DomainError, PseudonymizedUserId, Recoverable};
use crate::infrastructure::database::Database;
use crate::infrastructure::metrics::record_history_write;

/// Reads and appends conversation turns
#[derive(Debug, Clone)]
pub struct ConversationHistoryService {
    database: Database,
    config: HistoryConfig,
}

impl ConversationHistoryService {
    pub fn new(database: Database) -> Self {
        Self::with_config(database, HistoryConfig::default())
    }

    pub fn with_config(database: Database, config: HistoryConfig) -> Self {
        Self { database, config }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Stored turns for a user, oldest first
    ///
    /// An unknown user has an empty history. With `limit`, only the most recent
    /// `limit` turns come back.
    pub async fn get_history(&self, user_id: &str, limit: Option<usize>) -> Recoverable<Vec<Turn>> {
        let user = PseudonymizedUserId::from_raw(user_id);

        let record = match self.read(&user).await {
            Ok(record) => record,
            Err(e) => return Recoverable::Recovered(e),
        };

        let turns = match (record, limit) {
            (None, _) => Vec::new(),
            (Some(record), Some(limit)) => record.recent(limit).to_vec(),
            (Some(record), None) => record.into_turns(),
        };

        debug!(user = %user, turns = turns.len(), "Read conversation history");

        Recoverable::Complete(turns)
    }

    /// Append one turn, keeping only the most recent `max_turns`
    ///
    /// Returns the number of turns stored. If the current history cannot be
    /// read nothing is written, so a transient failure never truncates it.
    pub async fn add_interaction(
        &self,
        user_id: &str,
        asker_text: &str,
        responder_text: &str,
    ) -> Recoverable<usize> {
        let user = PseudonymizedUserId::from_raw(user_id);
        let result = self.append(&user, Turn::new(asker_text, responder_text)).await;

        record_history_write(result.is_ok());

        Recoverable::from_result(result)
    }

    async fn read(&self, user: &PseudonymizedUserId) -> Result<Option<HistoryRecord>, DomainError> {
        let store = self.database.store();

        self.database
            .within(
                "history.read",
                store.read_item::<HistoryRecord>(
                    self.database.history_container(),
                    user.as_str(),
                    user.as_str(),
                ),
            )
            .await
    }

    async fn append(&self, user: &PseudonymizedUserId, turn: Turn) -> Result<usize, DomainError> {
        let mut record = self
            .read(user)
            .await?
            .unwrap_or_else(|| HistoryRecord::new(user));

        record.push_turn(turn, self.config.max_turns);

        let store = self.database.store();
        self.database
            .within(
                "history.upsert",
                store.upsert_item(self.database.history_container(), &record),
            )
            .await?;

        debug!(user = %user, turns = record.turns().len(), "Recorded conversation turn");

        Ok(record.turns().len())
    }
}
