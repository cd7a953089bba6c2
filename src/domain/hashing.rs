//! Content hashing for partition keys and user pseudonyms

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of digest bytes kept (128 bits, 32 hex chars)
const DIGEST_BYTES: usize = 16;

/// Stable fixed-width hex digest of arbitrary text
pub fn digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..DIGEST_BYTES])
}

/// Normalize query text before hashing so trivially different spellings share a key
pub fn normalize_query(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Exact-match key of a cache entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryHash(String);

impl QueryHash {
    pub fn of(query_text: &str) -> Self {
        Self(digest(&normalize_query(query_text)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A user identifier that has been through the hashing seam
///
/// The raw identifier cannot be recovered from this type and there is no
/// constructor that accepts an already-hashed string, so only hashed ids reach
/// the history container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PseudonymizedUserId(String);

impl PseudonymizedUserId {
    pub fn from_raw(raw_user_id: &str) -> Self {
        Self(digest(raw_user_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PseudonymizedUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
