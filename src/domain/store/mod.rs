//! Document store domain - container declarations, queries and the store trait

mod container;
mod query;
mod repository;

pub use container::{
    validate_identifier, ContainerDocument, ContainerSpec, VectorIndexKind, VectorIndexSpec,
    VectorMetric,
};
pub use query::{DocumentQuery, FieldFilter, QueryHit, QueryOrder, SortDirection};
pub use repository::{DocumentStore, DocumentStoreExt};

#[cfg(test)]
pub use repository::mock;
