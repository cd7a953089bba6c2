//! Store lifecycle: connect, provision both containers, close
//!
//! A [`Database`] is a cheap clonable handle around one store client. Use
//! [`Database::scoped`] to guarantee the client is released when the work is
//! done, whether it succeeded, failed or was cancelled.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::store::{ContainerDocument, ContainerSpec, DocumentStore, VectorIndexSpec};
use crate::domain::{CacheEntry, DomainError, HistoryRecord};
use crate::infrastructure::metrics::record_expired_purged;
use crate::infrastructure::store::{StoreConfig, StoreFactory};

const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything needed to open and provision the store
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub store: StoreConfig,
    pub history_container: String,
    pub cache_container: String,
    /// Provisioned throughput for both containers
    pub throughput: u32,
    pub history_ttl: Duration,
    pub cache_ttl: Duration,
    pub embedding_dimensions: usize,
    /// Upper bound for any single store call
    pub operation_timeout: Duration,
    /// Period of the background expiry sweep, disabled when `None`
    pub sweep_interval: Option<Duration>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::InMemory,
            history_container: "conversation_history".to_string(),
            cache_container: "semantic_cache".to_string(),
            throughput: 400,
            history_ttl: Duration::from_secs(10800),
            cache_ttl: Duration::from_secs(10800),
            embedding_dimensions: 1536,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            sweep_interval: None,
        }
    }
}

impl DatabaseConfig {
    pub fn new(store: StoreConfig) -> Self {
        Self {
            store,
            ..Default::default()
        }
    }

    pub fn with_containers(
        mut self,
        history_container: impl Into<String>,
        cache_container: impl Into<String>,
    ) -> Self {
        self.history_container = history_container.into();
        self.cache_container = cache_container.into();
        self
    }

    pub fn with_ttls(mut self, history_ttl: Duration, cache_ttl: Duration) -> Self {
        self.history_ttl = history_ttl;
        self.cache_ttl = cache_ttl;
        self
    }

    pub fn with_embedding_dimensions(mut self, dimensions: usize) -> Self {
        self.embedding_dimensions = dimensions;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// A zero interval disables the sweep
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = (!interval.is_zero()).then_some(interval);
        self
    }

    /// Transcript container: partitioned by hashed user id
    pub fn history_spec(&self) -> ContainerSpec {
        ContainerSpec::new(&self.history_container, HistoryRecord::PARTITION_KEY_PATH)
            .with_throughput(self.throughput)
            .with_default_ttl(self.history_ttl)
    }

    /// Cache container: partitioned by query hash, cosine index over the embedding
    pub fn cache_spec(&self) -> ContainerSpec {
        ContainerSpec::new(&self.cache_container, CacheEntry::PARTITION_KEY_PATH)
            .with_throughput(self.throughput)
            .with_default_ttl(self.cache_ttl)
            .with_vector_index(VectorIndexSpec::quantized_cosine(
                CacheEntry::EMBEDDING_FIELD,
                self.embedding_dimensions,
            ))
    }
}

/// Handle to a provisioned store
#[derive(Debug, Clone)]
pub struct Database {
    store: Arc<dyn DocumentStore>,
    history_container: String,
    cache_container: String,
    operation_timeout: Duration,
    sweeper: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Database {
    /// Open the configured backend and provision both containers
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DomainError> {
        let store = StoreFactory::create(&config.store).await?;
        Self::with_store(store, config).await
    }

    /// Provision both containers on an already open store
    ///
    /// The store is closed before a provisioning error is returned.
    pub async fn with_store(
        store: Arc<dyn DocumentStore>,
        config: &DatabaseConfig,
    ) -> Result<Self, DomainError> {
        for spec in [config.history_spec(), config.cache_spec()] {
            if let Err(e) = store.ensure_container(&spec).await {
                warn!(container = %spec.name, error = %e, "Failed to provision container");
                store.close().await;
                return Err(e);
            }
        }

        let database = Self {
            store,
            history_container: config.history_container.clone(),
            cache_container: config.cache_container.clone(),
            operation_timeout: config.operation_timeout,
            sweeper: Arc::new(Mutex::new(None)),
        };

        if let Some(interval) = config.sweep_interval {
            database.start_sweeper(interval);
        }

        info!(
            backend = database.store.backend_name(),
            history = %database.history_container,
            cache = %database.cache_container,
            "Database ready"
        );

        Ok(database)
    }

    /// Connect, run `work`, and close the client whatever the outcome
    pub async fn scoped<F, Fut, T, E>(config: &DatabaseConfig, work: F) -> Result<T, E>
    where
        F: FnOnce(Database) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<DomainError>,
    {
        let database = Self::connect(config).await?;
        database.run_scoped(work).await
    }

    /// Run `work` against this handle and close it afterwards
    pub async fn run_scoped<F, Fut, T, E>(self, work: F) -> Result<T, E>
    where
        F: FnOnce(Database) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let guard = CloseGuard::new(self.clone());
        let result = work(self.clone()).await;
        guard.disarm();

        self.close().await;
        result
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn history_container(&self) -> &str {
        &self.history_container
    }

    pub fn cache_container(&self) -> &str {
        &self.cache_container
    }

    /// Bound a store call by the operation timeout
    pub async fn within<T, F>(&self, operation: &str, future: F) -> Result<T, DomainError>
    where
        F: Future<Output = Result<T, DomainError>>,
    {
        match tokio::time::timeout(self.operation_timeout, future).await {
            Ok(result) => result,
            Err(_) => Err(DomainError::timeout(
                operation,
                self.operation_timeout.as_millis() as u64,
            )),
        }
    }

    /// Purge expired documents from both containers once
    pub async fn sweep_expired(&self) -> Result<usize, DomainError> {
        purge_containers(
            self.store.as_ref(),
            &[self.history_container.as_str(), self.cache_container.as_str()],
        )
        .await
    }

    /// Stop the sweeper and release the store client; safe to call twice
    pub async fn close(&self) {
        let sweeper = self.sweeper.lock().ok().and_then(|mut slot| slot.take());

        if let Some(handle) = sweeper {
            handle.abort();
        }

        self.store.close().await;
        debug!(backend = self.store.backend_name(), "Database closed");
    }

    fn start_sweeper(&self, interval: Duration) {
        let store = Arc::clone(&self.store);
        let containers = [self.history_container.clone(), self.cache_container.clone()];

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let names = [containers[0].as_str(), containers[1].as_str()];

                if let Err(e) = purge_containers(store.as_ref(), &names).await {
                    warn!(error = %e, "Expiry sweep failed");
                }
            }
        });

        if let Ok(mut slot) = self.sweeper.lock() {
            *slot = Some(handle);
        }
    }
}

async fn purge_containers(
    store: &dyn DocumentStore,
    containers: &[&str],
) -> Result<usize, DomainError> {
    let mut total = 0;

    for container in containers {
        let purged = store.purge_expired(container).await?;

        if purged > 0 {
            debug!(container = %container, purged, "Purged expired documents");
            record_expired_purged(container, purged);
        }

        total += purged;
    }

    Ok(total)
}

/// Closes the database if the scope is dropped before it finishes
struct CloseGuard {
    database: Option<Database>,
}

impl CloseGuard {
    fn new(database: Database) -> Self {
        Self {
            database: Some(database),
        }
    }

    fn disarm(mut self) {
        self.database = None;
    }
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        let Some(database) = self.database.take() else {
            return;
        };

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                database.close().await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::store::mock::{FlakyStore, StoreOp};
    use crate::domain::store::VectorIndexKind;
    use crate::infrastructure::store::InMemoryDocumentStore;
    use serde_json::json;

    fn config() -> DatabaseConfig {
        DatabaseConfig::default()
            .with_containers("history", "cache")
            .with_embedding_dimensions(4)
    }

    #[test]
    fn test_container_specs() {
        let config = config();

        let history = config.history_spec();
        assert_eq!(history.name, "history");
        assert_eq!(history.partition_key_path, "user_id");
        assert_eq!(history.default_ttl, Some(Duration::from_secs(10800)));
        assert!(history.vector_index.is_none());

        let cache = config.cache_spec();
        assert_eq!(cache.partition_key_path, "query_hash");
        let index = cache.vector_index.unwrap();
        assert_eq!(index.path, "embedding");
        assert_eq!(index.kind, VectorIndexKind::QuantizedFlat);
        assert_eq!(index.dimensions, 4);
    }

    #[tokio::test]
    async fn test_with_store_provisions_containers() {
        let store = Arc::new(InMemoryDocumentStore::new());

        let database = Database::with_store(store.clone(), &config()).await.unwrap();

        assert!(store.container_spec("history").is_some());
        assert!(store.container_spec("cache").is_some());
        assert_eq!(database.history_container(), "history");
        assert_eq!(database.cache_container(), "cache");
    }

    #[tokio::test]
    async fn test_provisioning_failure_closes_store() {
        let inner = Arc::new(InMemoryDocumentStore::new());
        let flaky = Arc::new(FlakyStore::new(inner.clone()).failing(StoreOp::EnsureContainer));

        let result = Database::with_store(flaky, &config()).await;

        assert!(matches!(result, Err(DomainError::Storage { .. })));
        assert!(inner.is_closed());
    }

    #[tokio::test]
    async fn test_connect_in_memory() {
        let database = Database::connect(&config()).await.unwrap();

        assert_eq!(database.store().backend_name(), "in_memory");
        database.close().await;
    }

    #[tokio::test]
    async fn test_scope_closes_on_success() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let database = Database::with_store(store.clone(), &config()).await.unwrap();

        let value = database
            .run_scoped(|db| async move { db.store().count("history").await })
            .await
            .unwrap();

        assert_eq!(value, 0);
        assert!(store.is_closed());
    }

    #[tokio::test]
    async fn test_scope_closes_on_error() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let database = Database::with_store(store.clone(), &config()).await.unwrap();

        let result: Result<(), DomainError> = database
            .run_scoped(|_db| async move { Err(DomainError::internal("boom")) })
            .await;

        assert!(result.is_err());
        assert!(store.is_closed());
    }

    #[tokio::test]
    async fn test_cancelled_scope_still_closes() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let database = Database::with_store(store.clone(), &config()).await.unwrap();

        let scope = database.run_scoped(|_db| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, DomainError>(())
        });
        let _ = tokio::time::timeout(Duration::from_millis(20), scope).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.is_closed());
    }

    #[tokio::test]
    async fn test_scoped_with_anyhow_error() {
        let result: anyhow::Result<usize> = Database::scoped(&config(), |db| async move {
            Ok::<_, anyhow::Error>(db.store().count("cache").await?)
        })
        .await;

        assert_eq!(result.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_within_times_out() {
        let inner = Arc::new(InMemoryDocumentStore::new());
        let flaky = Arc::new(
            FlakyStore::new(inner).stalling(StoreOp::Count, Duration::from_millis(200)),
        );
        let config = config().with_operation_timeout(Duration::from_millis(20));
        let database = Database::with_store(flaky, &config).await.unwrap();

        let result = database
            .within("count", database.store().count("history"))
            .await;

        assert!(matches!(result, Err(DomainError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_sweep_expired() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let config = config().with_ttls(Duration::from_millis(30), Duration::from_secs(60));
        let database = Database::with_store(store.clone(), &config).await.unwrap();

        store
            .upsert("history", json!({"id": "u", "user_id": "u", "turns": []}))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(database.sweep_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_background_sweeper_stops_on_close() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let config = config().with_sweep_interval(Duration::from_millis(10));
        let database = Database::with_store(store, &config).await.unwrap();

        assert!(database.sweeper.lock().unwrap().is_some());

        database.close().await;

        assert!(database.sweeper.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_zero_sweep_interval_disables_sweeper() {
        let config = config().with_sweep_interval(Duration::ZERO);
        assert!(config.sweep_interval.is_none());

        let database = Database::with_store(Arc::new(InMemoryDocumentStore::new()), &config)
            .await
            .unwrap();

        assert!(database.sweeper.lock().unwrap().is_none());
        database.close().await;
    }
}
