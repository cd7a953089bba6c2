//! Document store trait definition

use std::fmt::Debug;

use async_trait::async_trait;
use serde_json::Value;

use super::container::{ContainerDocument, ContainerSpec};
use super::query::{DocumentQuery, QueryHit};
use crate::domain::DomainError;

/// Key/partition-addressed document store
///
/// Documents are JSON bodies; `id` and the partition key are read from the body
/// using the container's declared partition key path. Documents past their
/// container's TTL are invisible to every read, whether or not they have been
/// physically purged yet. This trait uses JSON values to stay dyn-compatible; use
/// [`DocumentStoreExt`] for typed access.
#[async_trait]
pub trait DocumentStore: Send + Sync + Debug {
    /// Create the container if it does not exist; an existing container is left as is
    async fn ensure_container(&self, spec: &ContainerSpec) -> Result<(), DomainError>;

    /// Insert or fully replace a document
    async fn upsert(&self, container: &str, document: Value) -> Result<(), DomainError>;

    /// Read one document by id within a partition
    async fn point_read(
        &self,
        container: &str,
        id: &str,
        partition_key: &str,
    ) -> Result<Option<Value>, DomainError>;

    /// Delete one document, returns true if it existed
    async fn delete(
        &self,
        container: &str,
        id: &str,
        partition_key: &str,
    ) -> Result<bool, DomainError>;

    /// Run a filter/order/top-K query across all partitions
    async fn query(
        &self,
        container: &str,
        query: &DocumentQuery,
    ) -> Result<Vec<QueryHit>, DomainError>;

    /// Number of live documents in the container
    async fn count(&self, container: &str) -> Result<usize, DomainError>;

    /// Physically remove expired documents, returns how many went
    async fn purge_expired(&self, container: &str) -> Result<usize, DomainError>;

    /// Release the underlying client; later calls fail
    async fn close(&self);

    /// Backend name for logs
    fn backend_name(&self) -> &'static str;
}

/// Extension trait providing typed document operations
pub trait DocumentStoreExt: DocumentStore {
    /// Upsert a typed document
    fn upsert_item<'a, T>(
        &'a self,
        container: &'a str,
        item: &'a T,
    ) -> impl std::future::Future<Output = Result<(), DomainError>> + Send + 'a
    where
        T: ContainerDocument,
    {
        async move {
            let document = serde_json::to_value(item).map_err(|e| {
                DomainError::storage(format!("Failed to serialize document: {}", e))
            })?;
            self.upsert(container, document).await
        }
    }

    /// Point-read a typed document
    fn read_item<'a, T>(
        &'a self,
        container: &'a str,
        id: &'a str,
        partition_key: &'a str,
    ) -> impl std::future::Future<Output = Result<Option<T>, DomainError>> + Send + 'a
    where
        T: ContainerDocument,
    {
        async move {
            match self.point_read(container, id, partition_key).await? {
                Some(document) => {
                    let item: T = serde_json::from_value(document).map_err(|e| {
                        DomainError::storage(format!("Failed to deserialize document: {}", e))
                    })?;
                    Ok(Some(item))
                }
                None => Ok(None),
            }
        }
    }

    /// Run a query and deserialize each hit, keeping its similarity
    fn query_items<'a, T>(
        &'a self,
        container: &'a str,
        query: &'a DocumentQuery,
    ) -> impl std::future::Future<Output = Result<Vec<(T, Option<f32>)>, DomainError>> + Send + 'a
    where
        T: ContainerDocument,
    {
        async move {
            let hits = self.query(container, query).await?;
            let mut items = Vec::with_capacity(hits.len());

            for hit in hits {
                let item: T = serde_json::from_value(hit.document).map_err(|e| {
                    DomainError::storage(format!("Failed to deserialize document: {}", e))
                })?;
                items.push((item, hit.similarity));
            }

            Ok(items)
        }
    }
}

impl<S: DocumentStore + ?Sized> DocumentStoreExt for S {}
