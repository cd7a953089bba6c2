//! Domain layer - records, store contracts and cache semantics

pub mod embedding;
pub mod error;
pub mod hashing;
pub mod history;
pub mod outcome;
pub mod semantic_cache;
pub mod store;

pub use embedding::{cosine_similarity, Embedder};
pub use error::DomainError;
pub use hashing::{digest, normalize_query, PseudonymizedUserId, QueryHash};
pub use history::{HistoryConfig, HistoryRecord, Turn};
pub use outcome::Recoverable;
pub use semantic_cache::{
    CacheEntry, CacheHit, CacheLookup, CacheWrite, EvictionMode, MatchKind, SemanticCacheConfig,
};
pub use store::{
    ContainerDocument, ContainerSpec, DocumentQuery, DocumentStore, DocumentStoreExt, QueryHit,
    QueryOrder, SortDirection, VectorIndexSpec,
};
