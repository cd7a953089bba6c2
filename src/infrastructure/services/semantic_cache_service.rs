//! Semantic response caching service
//!
//! Looks a query up by exact hash of its normalized text first and falls back to
//! the single nearest stored embedding. Store failures come back as
//! [`Recoverable::Recovered`]; embedding failures are returned as errors before
//! anything is written.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::embedding::{cosine_similarity, Embedder};
use crate::domain::semantic_cache::{
    CacheEntry, CacheHit, CacheLookup, CacheWrite, EvictionMode, MatchKind, SemanticCacheConfig,
};
use crate::domain::store::{ContainerDocument, DocumentQuery, DocumentStoreExt, SortDirection};
use crate::domain::{DomainError, QueryHash, Recoverable};
use crate::infrastructure::database::Database;
use crate::infrastructure::metrics::{
    record_cache_eviction, record_cache_lookup, record_cache_write, LookupOutcome,
};

/// Semantic cache over the cache container
#[derive(Debug)]
pub struct SemanticCacheService {
    database: Database,
    embedder: Arc<dyn Embedder>,
    config: SemanticCacheConfig,
    write_lock: Mutex<()>,
}

impl SemanticCacheService {
    pub fn new(database: Database, embedder: Arc<dyn Embedder>) -> Result<Self, DomainError> {
        Self::with_config(database, embedder, SemanticCacheConfig::default())
    }

    /// Fails when the embedder's vector length differs from the cache's
    pub fn with_config(
        database: Database,
        embedder: Arc<dyn Embedder>,
        config: SemanticCacheConfig,
    ) -> Result<Self, DomainError> {
        if embedder.dimensions() != config.dimensions {
            return Err(DomainError::configuration(format!(
                "Embedder '{}' produces {} dimensions, cache expects {}",
                embedder.provider_name(),
                embedder.dimensions(),
                config.dimensions
            )));
        }

        Ok(Self {
            database,
            embedder,
            config,
            write_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &SemanticCacheConfig {
        &self.config
    }

    /// Find a cached result for a query
    ///
    /// The exact phase never embeds. Only its miss (or failure) leads to the
    /// similarity phase, which embeds the query and accepts the nearest entry
    /// when its similarity is at least the threshold.
    pub async fn lookup(&self, query_text: &str) -> Result<Recoverable<CacheLookup>, DomainError> {
        let started = Instant::now();
        let hash = QueryHash::of(query_text);

        let exact_failure = match self.read_entry(&hash).await {
            Ok(Some(entry)) => {
                debug!(hash = %hash, "Semantic cache exact hit");
                let hit = self.serve(entry, MatchKind::Exact, 1.0).await;
                record_cache_lookup(LookupOutcome::ExactHit, started.elapsed());
                return Ok(Recoverable::Complete(CacheLookup::Hit(hit)));
            }
            Ok(None) => None,
            Err(e) => {
                warn!(hash = %hash, error = %e, "Exact cache read failed, trying similarity");
                Some(e)
            }
        };

        let vector = self.embed(query_text).await?;

        let nearest = match self.nearest(&vector).await {
            Ok(nearest) => nearest,
            Err(e) => {
                record_cache_lookup(LookupOutcome::Recovered, started.elapsed());
                return Ok(Recoverable::Recovered(e));
            }
        };

        if let Some((entry, similarity)) = nearest {
            if self.accepts(similarity) {
                debug!(
                    hash = %hash,
                    entry = %entry.id(),
                    similarity,
                    "Semantic cache similarity hit"
                );
                let hit = self.serve(entry, MatchKind::Similar, similarity).await;
                record_cache_lookup(LookupOutcome::SimilarHit, started.elapsed());
                return Ok(Recoverable::Complete(CacheLookup::Hit(hit)));
            }

            debug!(
                hash = %hash,
                similarity,
                threshold = self.config.similarity_threshold,
                "Nearest cache entry below threshold"
            );
        } else {
            debug!(hash = %hash, "Semantic cache is empty");
        }

        match exact_failure {
            Some(e) => {
                record_cache_lookup(LookupOutcome::Recovered, started.elapsed());
                Ok(Recoverable::Recovered(e))
            }
            None => {
                record_cache_lookup(LookupOutcome::Miss, started.elapsed());
                Ok(Recoverable::Complete(CacheLookup::Miss))
            }
        }
    }

    /// Store a result under a query, making room first when the cache is full
    ///
    /// The embedding is computed before the store is touched, so an embedding
    /// error leaves the cache unchanged. Capacity is checked with a count and at
    /// most one least-recently-accessed entry is evicted per write.
    pub async fn update_cache(
        &self,
        query_text: &str,
        result: Value,
    ) -> Result<Recoverable<CacheWrite>, DomainError> {
        let hash = QueryHash::of(query_text);
        let vector = self.embed(query_text).await?;

        let written = match self.config.eviction {
            EvictionMode::Serialized => {
                let _turn = self.write_lock.lock().await;
                self.write_entry(hash, query_text, result, vector).await
            }
            EvictionMode::BestEffort => self.write_entry(hash, query_text, result, vector).await,
        };

        record_cache_write(written.is_ok());

        Ok(Recoverable::from_result(written))
    }

    fn accepts(&self, similarity: f32) -> bool {
        !similarity.is_nan() && similarity >= self.config.similarity_threshold
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, DomainError> {
        let vector = self.embedder.embed(text).await?;

        if vector.len() != self.config.dimensions {
            return Err(DomainError::validation(format!(
                "Embedder '{}' returned {} dimensions, cache expects {}",
                self.embedder.provider_name(),
                vector.len(),
                self.config.dimensions
            )));
        }

        Ok(vector)
    }

    async fn read_entry(&self, hash: &QueryHash) -> Result<Option<CacheEntry>, DomainError> {
        let store = self.database.store();

        self.database
            .within(
                "cache.read",
                store.read_item::<CacheEntry>(
                    self.database.cache_container(),
                    hash.as_str(),
                    hash.as_str(),
                ),
            )
            .await
    }

    async fn nearest(&self, vector: &[f32]) -> Result<Option<(CacheEntry, f32)>, DomainError> {
        let store = self.database.store();
        let query = DocumentQuery::nearest(CacheEntry::EMBEDDING_FIELD, vector.to_vec(), 1);

        let hits = self
            .database
            .within(
                "cache.nearest",
                store.query_items::<CacheEntry>(self.database.cache_container(), &query),
            )
            .await?;

        Ok(hits.into_iter().next().map(|(entry, similarity)| {
            let similarity =
                similarity.unwrap_or_else(|| cosine_similarity(vector, entry.embedding()));
            (entry, similarity)
        }))
    }

    /// Refresh the access time of a hit and hand out its payload
    ///
    /// A failed refresh only costs eviction accuracy, so the hit is served anyway.
    async fn serve(&self, mut entry: CacheEntry, match_kind: MatchKind, similarity: f32) -> CacheHit {
        entry.touch(Utc::now());

        let store = self.database.store();
        let touched = self
            .database
            .within(
                "cache.touch",
                store.upsert_item(self.database.cache_container(), &entry),
            )
            .await;

        if let Err(e) = touched {
            warn!(entry = %entry.id(), error = %e, "Failed to refresh cache entry access time");
        }

        CacheHit {
            entry_id: entry.id().to_string(),
            payload: entry.into_result(),
            match_kind,
            similarity,
        }
    }

    async fn write_entry(
        &self,
        hash: QueryHash,
        query_text: &str,
        result: Value,
        vector: Vec<f32>,
    ) -> Result<CacheWrite, DomainError> {
        let evicted = match self.make_room().await {
            Ok(evicted) => evicted,
            Err(e) => {
                warn!(error = %e, "Cache capacity check failed, writing anyway");
                None
            }
        };

        let existing = match self.read_entry(&hash).await {
            Ok(existing) => existing,
            Err(e) => {
                warn!(hash = %hash, error = %e, "Failed to read existing cache entry");
                None
            }
        };

        let mut entry = CacheEntry::new(&hash, query_text, result, vector, Utc::now());

        if let Some(ref previous) = existing {
            entry = entry.with_created_at(previous.created_at());
        }

        let store = self.database.store();
        self.database
            .within(
                "cache.upsert",
                store.upsert_item(self.database.cache_container(), &entry),
            )
            .await?;

        debug!(hash = %hash, created = existing.is_none(), "Cached result");

        Ok(CacheWrite {
            hash,
            created: existing.is_none(),
            evicted,
        })
    }

    /// Evict the least recently accessed entry if the cache is at capacity
    async fn make_room(&self) -> Result<Option<String>, DomainError> {
        let store = self.database.store();
        let container = self.database.cache_container();

        let count = self.database.within("cache.count", store.count(container)).await?;

        if count < self.config.max_entries {
            return Ok(None);
        }

        let query = DocumentQuery::new()
            .order_by(CacheEntry::LAST_ACCESSED_FIELD, SortDirection::Ascending)
            .with_top(1);

        let oldest = self
            .database
            .within("cache.oldest", store.query_items::<CacheEntry>(container, &query))
            .await?;

        let Some((victim, _)) = oldest.into_iter().next() else {
            return Ok(None);
        };

        let removed = self
            .database
            .within(
                "cache.evict",
                store.delete(container, victim.id(), victim.partition_key()),
            )
            .await?;

        if !removed {
            return Ok(None);
        }

        record_cache_eviction();
        debug!(entry = %victim.id(), count, "Evicted least recently accessed cache entry");

        Ok(Some(victim.id().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;
    use std::time::Duration;

    use crate::domain::embedding::MockEmbedder;
    use crate::domain::store::mock::{FlakyStore, StoreOp};
    use crate::domain::store::DocumentStore;
    use crate::infrastructure::database::DatabaseConfig;
    use crate::infrastructure::store::InMemoryDocumentStore;

    const DIMS: usize = 4;

    async fn database_on(store: Arc<dyn DocumentStore>) -> Database {
        let config = DatabaseConfig::default()
            .with_containers("history", "cache")
            .with_embedding_dimensions(DIMS);
        Database::with_store(store, &config).await.unwrap()
    }

    fn cache_config() -> SemanticCacheConfig {
        SemanticCacheConfig::new().with_dimensions(DIMS)
    }

    async fn service_with(
        embedder: MockEmbedder,
        config: SemanticCacheConfig,
    ) -> (SemanticCacheService, Arc<InMemoryDocumentStore>, Arc<MockEmbedder>) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let embedder = Arc::new(embedder);
        let service =
            SemanticCacheService::with_config(database_on(store.clone()).await, embedder.clone(), config)
                .unwrap();
        (service, store, embedder)
    }

    async fn lookup(service: &SemanticCacheService, query: &str) -> CacheLookup {
        service.lookup(query).await.unwrap().ok().unwrap()
    }

    async fn seed(store: &InMemoryDocumentStore, query: &str, vector: Vec<f32>, accessed_secs_ago: i64) {
        let now = Utc::now();
        let entry = CacheEntry::new(&QueryHash::of(query), query, json!({"q": query}), vector, now)
            .with_last_accessed_at(now - ChronoDuration::seconds(accessed_secs_ago));
        store.upsert_item("cache", &entry).await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_cache_misses() {
        let (service, _, _) = service_with(MockEmbedder::new(DIMS), cache_config()).await;

        assert_eq!(lookup(&service, "anything").await, CacheLookup::Miss);
    }

    #[tokio::test]
    async fn test_exact_round_trip() {
        let (service, _, _) = service_with(MockEmbedder::new(DIMS), cache_config()).await;
        let payload = json!({"answer": "Paris"});

        let write = service
            .update_cache("capital of France", payload.clone())
            .await
            .unwrap()
            .ok()
            .unwrap();
        assert!(write.created);
        assert_eq!(write.hash, QueryHash::of("capital of France"));

        let hit = lookup(&service, "capital of France").await;
        let hit = hit.hit().unwrap();
        assert_eq!(hit.payload, payload);
        assert_eq!(hit.match_kind, MatchKind::Exact);
    }

    #[tokio::test]
    async fn test_exact_hit_does_not_embed() {
        let (service, _, embedder) = service_with(MockEmbedder::new(DIMS), cache_config()).await;
        let _ = service.update_cache("q", json!(1)).await.unwrap();
        let calls = embedder.calls();

        assert!(lookup(&service, "  Q ").await.is_hit());
        assert_eq!(embedder.calls(), calls);
    }

    #[tokio::test]
    async fn test_france_scenario_similarity_hit() {
        let embedder = MockEmbedder::new(DIMS)
            .with_vector("capital of France", vec![1.0, 0.0, 0.0, 0.0])
            .with_vector("what is the capital of france", vec![0.97, 0.2431, 0.0, 0.0]);
        let (service, _, _) = service_with(embedder, cache_config()).await;

        let _ = service
            .update_cache("capital of France", json!({"answer": "Paris"}))
            .await
            .unwrap();

        let result = lookup(&service, "what is the capital of france").await;
        let hit = result.hit().unwrap();

        assert_eq!(hit.match_kind, MatchKind::Similar);
        assert_eq!(hit.payload, json!({"answer": "Paris"}));
        assert!(hit.similarity >= 0.95);
    }

    #[tokio::test]
    async fn test_threshold_is_inclusive() {
        let stored = vec![1.0, 0.0, 0.0, 0.0];
        let probe = vec![0.9, 0.3, 0.1, 0.0];
        let similarity = cosine_similarity(&probe, &stored);

        let embedder = MockEmbedder::new(DIMS)
            .with_vector("stored", stored.clone())
            .with_vector("probe", probe.clone());
        let config = cache_config().with_similarity_threshold(similarity);
        let (service, _, _) = service_with(embedder, config).await;
        let _ = service.update_cache("stored", json!("v")).await.unwrap();

        assert!(lookup(&service, "probe").await.is_hit());
    }

    #[tokio::test]
    async fn test_just_below_threshold_misses() {
        let stored = vec![1.0, 0.0, 0.0, 0.0];
        let probe = vec![0.9, 0.3, 0.1, 0.0];
        let similarity = cosine_similarity(&probe, &stored);
        let threshold = f32::from_bits(similarity.to_bits() + 1);

        let embedder = MockEmbedder::new(DIMS)
            .with_vector("stored", stored)
            .with_vector("probe", probe);
        let config = cache_config().with_similarity_threshold(threshold);
        let (service, _, _) = service_with(embedder, config).await;
        let _ = service.update_cache("stored", json!("v")).await.unwrap();

        assert_eq!(lookup(&service, "probe").await, CacheLookup::Miss);
    }

    #[tokio::test]
    async fn test_eviction_at_capacity() {
        let config = cache_config().with_max_entries(2);
        let (service, store, _) = service_with(MockEmbedder::new(DIMS), config).await;
        seed(&store, "old", vec![1.0, 0.0, 0.0, 0.0], 60).await;
        seed(&store, "newer", vec![0.0, 1.0, 0.0, 0.0], 30).await;

        let write = service
            .update_cache("third", json!("v"))
            .await
            .unwrap()
            .ok()
            .unwrap();

        assert_eq!(write.evicted.as_deref(), Some(QueryHash::of("old").as_str()));
        assert_eq!(store.count("cache").await.unwrap(), 2);

        let old = QueryHash::of("old");
        assert!(store.point_read("cache", old.as_str(), old.as_str()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_hit_refreshes_eviction_order() {
        let config = cache_config().with_max_entries(2);
        let embedder = MockEmbedder::new(DIMS)
            .with_vector("old", vec![1.0, 0.0, 0.0, 0.0])
            .with_vector("newer", vec![0.0, 1.0, 0.0, 0.0]);
        let (service, store, _) = service_with(embedder, config).await;
        seed(&store, "old", vec![1.0, 0.0, 0.0, 0.0], 60).await;
        seed(&store, "newer", vec![0.0, 1.0, 0.0, 0.0], 30).await;

        assert!(lookup(&service, "old").await.is_hit());

        let write = service
            .update_cache("third", json!("v"))
            .await
            .unwrap()
            .ok()
            .unwrap();

        assert_eq!(write.evicted.as_deref(), Some(QueryHash::of("newer").as_str()));
    }

    #[tokio::test]
    async fn test_rewrite_keeps_created_at() {
        let (service, store, _) = service_with(MockEmbedder::new(DIMS), cache_config()).await;
        seed(&store, "q", vec![1.0, 0.0, 0.0, 0.0], 60).await;
        let hash = QueryHash::of("q");
        let before: CacheEntry = store
            .read_item("cache", hash.as_str(), hash.as_str())
            .await
            .unwrap()
            .unwrap();

        let write = service
            .update_cache("q", json!("new"))
            .await
            .unwrap()
            .ok()
            .unwrap();

        let after: CacheEntry = store
            .read_item("cache", hash.as_str(), hash.as_str())
            .await
            .unwrap()
            .unwrap();

        assert!(!write.created);
        assert_eq!(after.created_at(), before.created_at());
        assert!(after.last_accessed_at() > before.last_accessed_at());
        assert_eq!(after.result(), &json!("new"));
    }

    #[tokio::test]
    async fn test_rewrite_at_capacity_still_evicts() {
        let config = cache_config().with_max_entries(2);
        let (service, store, _) = service_with(MockEmbedder::new(DIMS), config).await;
        seed(&store, "a", vec![1.0, 0.0, 0.0, 0.0], 60).await;
        seed(&store, "b", vec![0.0, 1.0, 0.0, 0.0], 30).await;

        let write = service
            .update_cache("b", json!("again"))
            .await
            .unwrap()
            .ok()
            .unwrap();

        assert!(!write.created);
        assert_eq!(write.evicted.as_deref(), Some(QueryHash::of("a").as_str()));
        assert_eq!(store.count("cache").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_similarity_hit_refreshes_access_time() {
        let stored = vec![1.0, 0.0, 0.0, 0.0];
        let embedder = MockEmbedder::new(DIMS)
            .with_vector("stored", stored.clone())
            .with_vector("close", vec![0.99, 0.05, 0.0, 0.0]);
        let (service, store, _) = service_with(embedder, cache_config()).await;
        seed(&store, "stored", stored, 60).await;
        let hash = QueryHash::of("stored");
        let before: CacheEntry = store
            .read_item("cache", hash.as_str(), hash.as_str())
            .await
            .unwrap()
            .unwrap();

        let result = lookup(&service, "close").await;
        assert_eq!(result.hit().unwrap().match_kind, MatchKind::Similar);

        let after: CacheEntry = store
            .read_item("cache", hash.as_str(), hash.as_str())
            .await
            .unwrap()
            .unwrap();

        assert!(after.last_accessed_at() > before.last_accessed_at());
        assert_eq!(after.created_at(), before.created_at());
    }

    #[tokio::test]
    async fn test_similarity_hit_survives_next_eviction() {
        let config = cache_config().with_max_entries(2);
        let embedder = MockEmbedder::new(DIMS)
            .with_vector("old", vec![1.0, 0.0, 0.0, 0.0])
            .with_vector("near old", vec![0.99, 0.05, 0.0, 0.0]);
        let (service, store, _) = service_with(embedder, config).await;
        seed(&store, "old", vec![1.0, 0.0, 0.0, 0.0], 60).await;
        seed(&store, "newer", vec![0.0, 1.0, 0.0, 0.0], 30).await;

        assert!(lookup(&service, "near old").await.is_hit());

        let write = service
            .update_cache("third", json!("v"))
            .await
            .unwrap()
            .ok()
            .unwrap();

        assert_eq!(write.evicted.as_deref(), Some(QueryHash::of("newer").as_str()));
    }

    #[tokio::test]
    async fn test_embedding_error_propagates_without_write() {
        let embedder = MockEmbedder::new(DIMS).with_error("quota exceeded");
        let (service, store, _) = service_with(embedder, cache_config()).await;

        assert!(service.update_cache("q", json!(1)).await.is_err());
        assert!(service.lookup("q").await.is_err());
        assert_eq!(store.count("cache").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_wrong_dimensions_rejected() {
        let embedder = MockEmbedder::new(DIMS).with_vector("q", vec![0.5; DIMS + 1]);
        let (service, store, _) = service_with(embedder, cache_config()).await;

        let result = service.update_cache("q", json!(1)).await;

        assert!(matches!(result, Err(DomainError::Validation { .. })));
        assert_eq!(store.count("cache").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mismatched_embedder_refused_at_construction() {
        let store = Arc::new(InMemoryDocumentStore::new());

        let result = SemanticCacheService::with_config(
            database_on(store).await,
            Arc::new(MockEmbedder::new(DIMS + 1)),
            cache_config(),
        );

        assert!(matches!(result, Err(DomainError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_store_failure_is_recovered() {
        let inner = Arc::new(InMemoryDocumentStore::new());
        let flaky = Arc::new(
            FlakyStore::new(inner)
                .failing(StoreOp::Upsert)
                .failing(StoreOp::Query),
        );
        let service = SemanticCacheService::with_config(
            database_on(flaky).await,
            Arc::new(MockEmbedder::new(DIMS)),
            cache_config(),
        )
        .unwrap();

        let write = service.update_cache("q", json!(1)).await.unwrap();
        assert!(write.is_recovered());

        let lookup = service.lookup("q").await.unwrap();
        assert!(lookup.is_recovered());
    }

    #[tokio::test]
    async fn test_exact_read_failure_falls_back_to_similarity() {
        let inner = Arc::new(InMemoryDocumentStore::new());
        let flaky = Arc::new(FlakyStore::new(inner.clone()).failing(StoreOp::PointRead));
        let service = SemanticCacheService::with_config(
            database_on(flaky).await,
            Arc::new(MockEmbedder::new(DIMS)),
            cache_config(),
        )
        .unwrap();
        seed(&inner, "q", MockEmbedder::new(DIMS).embed("q").await.unwrap(), 0).await;

        let result = service.lookup("q").await.unwrap().ok().unwrap();

        assert_eq!(result.hit().unwrap().match_kind, MatchKind::Similar);
    }

    #[tokio::test]
    async fn test_timed_out_read_is_recovered_miss() {
        let inner = Arc::new(InMemoryDocumentStore::new());
        let flaky = Arc::new(
            FlakyStore::new(inner).stalling(StoreOp::Query, Duration::from_millis(200)),
        );
        let config = DatabaseConfig::default()
            .with_containers("history", "cache")
            .with_embedding_dimensions(DIMS)
            .with_operation_timeout(Duration::from_millis(20));
        let database = Database::with_store(flaky, &config).await.unwrap();
        let service = SemanticCacheService::with_config(
            database,
            Arc::new(MockEmbedder::new(DIMS)),
            cache_config(),
        )
        .unwrap();

        let lookup = service.lookup("q").await.unwrap();

        assert!(matches!(lookup.error(), Some(DomainError::Timeout { .. })));
        assert!(lookup.ok().is_none());
    }

    #[tokio::test]
    async fn test_serialized_eviction_holds_capacity() {
        let config = cache_config()
            .with_max_entries(3)
            .with_eviction(EvictionMode::Serialized);
        let (service, store, _) = service_with(MockEmbedder::new(DIMS), config).await;
        let service = Arc::new(service);

        let mut tasks = Vec::new();
        for i in 0..10 {
            let service = service.clone();
            tasks.push(tokio::spawn(async move {
                let _ = service.update_cache(&format!("query {}", i), json!(i)).await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert!(store.count("cache").await.unwrap() <= 3);
    }
}
