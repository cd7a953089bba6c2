//! Cache lookup and write outcomes

use serde_json::Value;

use crate::domain::hashing::QueryHash;

/// Which lookup phase produced a hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Same normalized query text
    Exact,
    /// Nearest neighbor at or above the similarity threshold
    Similar,
}

/// A served cache entry
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    pub payload: Value,
    pub match_kind: MatchKind,
    /// 1.0 for exact hits
    pub similarity: f32,
    pub entry_id: String,
}

/// Result of looking a query up in the cache
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CacheLookup {
    Hit(CacheHit),
    #[default]
    Miss,
}

impl CacheLookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }

    pub fn hit(&self) -> Option<&CacheHit> {
        match self {
            Self::Hit(hit) => Some(hit),
            Self::Miss => None,
        }
    }

    pub fn into_payload(self) -> Option<Value> {
        match self {
            Self::Hit(hit) => Some(hit.payload),
            Self::Miss => None,
        }
    }
}

/// What a completed cache write did
#[derive(Debug, Clone, PartialEq)]
pub struct CacheWrite {
    pub hash: QueryHash,
    /// False when an existing entry under the same hash was rewritten
    pub created: bool,
    /// Id of the entry evicted to make room, if any
    pub evicted: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_miss_is_default() {
        let lookup = CacheLookup::default();

        assert!(!lookup.is_hit());
        assert!(lookup.hit().is_none());
        assert!(lookup.into_payload().is_none());
    }

    #[test]
    fn test_hit_payload() {
        let lookup = CacheLookup::Hit(CacheHit {
            payload: json!({"answer": "Paris"}),
            match_kind: MatchKind::Similar,
            similarity: 0.97,
            entry_id: "abc".to_string(),
        });

        assert!(lookup.is_hit());
        assert_eq!(lookup.hit().map(|h| h.match_kind), Some(MatchKind::Similar));
        assert_eq!(lookup.into_payload(), Some(json!({"answer": "Paris"})));
    }
}
