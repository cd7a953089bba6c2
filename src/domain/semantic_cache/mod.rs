//! Semantic cache domain models
//!
//! Cached results are found by exact hash of the normalized query first and by
//! nearest-neighbor similarity of query embeddings second.

mod config;
mod entry;
mod lookup;

pub use config::{EvictionMode, SemanticCacheConfig};
pub use entry::CacheEntry;
pub use lookup::{CacheHit, CacheLookup, CacheWrite, MatchKind};
