//! In-memory document store implementation

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::embedding::cosine_similarity;
use crate::domain::store::{
    ContainerSpec, DocumentQuery, DocumentStore, QueryHit, QueryOrder, SortDirection,
};
use crate::domain::DomainError;

#[derive(Debug, Clone)]
struct StoredDocument {
    body: Value,
    vector: Option<Vec<f32>>,
    modified_at: DateTime<Utc>,
}

#[derive(Debug)]
struct ContainerState {
    spec: ContainerSpec,
    documents: HashMap<(String, String), StoredDocument>,
}

impl ContainerState {
    fn new(spec: ContainerSpec) -> Self {
        Self {
            spec,
            documents: HashMap::new(),
        }
    }

    fn is_live(&self, document: &StoredDocument, now: DateTime<Utc>) -> bool {
        match self.spec.default_ttl {
            None => true,
            Some(ttl) => now
                .signed_duration_since(document.modified_at)
                .to_std()
                .map(|age| age < ttl)
                .unwrap_or(true),
        }
    }

    fn live_documents(&self, now: DateTime<Utc>) -> impl Iterator<Item = &StoredDocument> {
        self.documents
            .values()
            .filter(move |doc| self.is_live(doc, now))
    }
}

/// Document store held in process memory
///
/// Vector queries are exact brute-force cosine scans. Expired documents stay in
/// the map until [`DocumentStore::purge_expired`] runs but are never returned.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    containers: RwLock<HashMap<String, ContainerState>>,
    closed: AtomicBool,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether [`DocumentStore::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(AtomicOrdering::SeqCst)
    }

    /// Provisioned settings of a container
    pub fn container_spec(&self, name: &str) -> Option<ContainerSpec> {
        self.containers
            .read()
            .ok()?
            .get(name)
            .map(|state| state.spec.clone())
    }

    fn check_open(&self) -> Result<(), DomainError> {
        if self.is_closed() {
            return Err(DomainError::storage("Document store is closed"));
        }
        Ok(())
    }

    fn with_container<R>(
        &self,
        name: &str,
        f: impl FnOnce(&ContainerState) -> Result<R, DomainError>,
    ) -> Result<R, DomainError> {
        self.check_open()?;

        let containers = self
            .containers
            .read()
            .map_err(|e| DomainError::storage(format!("Lock error: {}", e)))?;

        let state = containers
            .get(name)
            .ok_or_else(|| DomainError::not_found(format!("Container '{}' does not exist", name)))?;

        f(state)
    }

    fn with_container_mut<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut ContainerState) -> Result<R, DomainError>,
    ) -> Result<R, DomainError> {
        self.check_open()?;

        let mut containers = self
            .containers
            .write()
            .map_err(|e| DomainError::storage(format!("Lock error: {}", e)))?;

        let state = containers
            .get_mut(name)
            .ok_or_else(|| DomainError::not_found(format!("Container '{}' does not exist", name)))?;

        f(state)
    }
}

/// Order two JSON scalars; numbers and strings compare naturally, anything else ties
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

fn document_id(document: &Value) -> &str {
    document.get("id").and_then(Value::as_str).unwrap_or_default()
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn ensure_container(&self, spec: &ContainerSpec) -> Result<(), DomainError> {
        self.check_open()?;
        spec.validate()?;

        let mut containers = self
            .containers
            .write()
            .map_err(|e| DomainError::storage(format!("Lock error: {}", e)))?;

        containers
            .entry(spec.name.clone())
            .or_insert_with(|| ContainerState::new(spec.clone()));

        Ok(())
    }

    async fn upsert(&self, container: &str, document: Value) -> Result<(), DomainError> {
        self.with_container_mut(container, |state| {
            let keys = state.spec.document_keys(&document)?;
            let vector = state.spec.document_vector(&document)?;

            state.documents.insert(
                keys,
                StoredDocument {
                    body: document,
                    vector,
                    modified_at: Utc::now(),
                },
            );

            Ok(())
        })
    }

    async fn point_read(
        &self,
        container: &str,
        id: &str,
        partition_key: &str,
    ) -> Result<Option<Value>, DomainError> {
        let now = Utc::now();

        self.with_container(container, |state| {
            Ok(state
                .documents
                .get(&(id.to_string(), partition_key.to_string()))
                .filter(|doc| state.is_live(doc, now))
                .map(|doc| doc.body.clone()))
        })
    }

    async fn delete(
        &self,
        container: &str,
        id: &str,
        partition_key: &str,
    ) -> Result<bool, DomainError> {
        self.with_container_mut(container, |state| {
            Ok(state
                .documents
                .remove(&(id.to_string(), partition_key.to_string()))
                .is_some())
        })
    }

    async fn query(
        &self,
        container: &str,
        query: &DocumentQuery,
    ) -> Result<Vec<QueryHit>, DomainError> {
        let now = Utc::now();

        self.with_container(container, |state| {
            let candidates = state
                .live_documents(now)
                .filter(|doc| query.matches(&doc.body));

            let mut hits: Vec<QueryHit> = match query.order {
                Some(QueryOrder::VectorDistance {
                    ref field,
                    ref vector,
                }) => {
                    let indexed = state
                        .spec
                        .vector_index
                        .as_ref()
                        .is_some_and(|index| &index.path == field);

                    if !indexed {
                        return Err(DomainError::validation(format!(
                            "Container '{}' has no vector index on '{}'",
                            container, field
                        )));
                    }

                    let mut scored: Vec<QueryHit> = candidates
                        .filter_map(|doc| {
                            let stored = doc.vector.as_ref()?;
                            Some(
                                QueryHit::new(doc.body.clone())
                                    .with_similarity(cosine_similarity(vector, stored)),
                            )
                        })
                        .collect();

                    scored.sort_by(|a, b| {
                        b.similarity
                            .partial_cmp(&a.similarity)
                            .unwrap_or(Ordering::Equal)
                            .then_with(|| document_id(&a.document).cmp(document_id(&b.document)))
                    });

                    scored
                }
                Some(QueryOrder::Field {
                    ref field,
                    direction,
                }) => {
                    let mut ordered: Vec<QueryHit> =
                        candidates.map(|doc| QueryHit::new(doc.body.clone())).collect();

                    ordered.sort_by(|a, b| {
                        let by_field = compare_values(a.document.get(field), b.document.get(field));
                        let by_field = match direction {
                            SortDirection::Ascending => by_field,
                            SortDirection::Descending => by_field.reverse(),
                        };
                        by_field
                            .then_with(|| document_id(&a.document).cmp(document_id(&b.document)))
                    });

                    ordered
                }
                None => candidates.map(|doc| QueryHit::new(doc.body.clone())).collect(),
            };

            if let Some(top) = query.top {
                hits.truncate(top);
            }

            Ok(hits)
        })
    }

    async fn count(&self, container: &str) -> Result<usize, DomainError> {
        let now = Utc::now();
        self.with_container(container, |state| Ok(state.live_documents(now).count()))
    }

    async fn purge_expired(&self, container: &str) -> Result<usize, DomainError> {
        let now = Utc::now();

        self.with_container_mut(container, |state| {
            if state.spec.default_ttl.is_none() {
                return Ok(0);
            }

            let expired: Vec<(String, String)> = state
                .documents
                .iter()
                .filter(|(_, doc)| !state.is_live(doc, now))
                .map(|(key, _)| key.clone())
                .collect();

            for key in &expired {
                state.documents.remove(key);
            }

            Ok(expired.len())
        })
    }

    async fn close(&self) {
        self.closed.store(true, AtomicOrdering::SeqCst);
    }

    fn backend_name(&self) -> &'static str {
        "in_memory"
    }
}
