//! Cached result entry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::hashing::QueryHash;
use crate::domain::store::ContainerDocument;

/// A cached result, keyed by the hash of its normalized query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    id: String,
    query_hash: String,
    /// Original text, kept for debugging and re-embedding
    query_text: String,
    /// Opaque cached value
    result: Value,
    embedding: Vec<f32>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    last_accessed_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Field carrying the vector index
    pub const EMBEDDING_FIELD: &'static str = "embedding";
    /// Field eviction orders by
    pub const LAST_ACCESSED_FIELD: &'static str = "last_accessed_at";

    pub fn new(
        hash: &QueryHash,
        query_text: impl Into<String>,
        result: Value,
        embedding: Vec<f32>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: hash.as_str().to_string(),
            query_hash: hash.as_str().to_string(),
            query_text: query_text.into(),
            result,
            embedding,
            created_at: now,
            last_accessed_at: now,
        }
    }

    /// Keep the creation time of an entry being rewritten
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_last_accessed_at(mut self, last_accessed_at: DateTime<Utc>) -> Self {
        self.last_accessed_at = last_accessed_at;
        self
    }

    pub fn query_hash(&self) -> &str {
        &self.query_hash
    }

    pub fn query_text(&self) -> &str {
        &self.query_text
    }

    pub fn result(&self) -> &Value {
        &self.result
    }

    pub fn into_result(self) -> Value {
        self.result
    }

    pub fn embedding(&self) -> &[f32] {
        &self.embedding
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_accessed_at(&self) -> DateTime<Utc> {
        self.last_accessed_at
    }

    /// Record a read or write at `now`
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_accessed_at = now;
    }
}

impl ContainerDocument for CacheEntry {
    const PARTITION_KEY_PATH: &'static str = "query_hash";

    fn id(&self) -> &str {
        &self.id
    }

    fn partition_key(&self) -> &str {
        &self.query_hash
    }
}
