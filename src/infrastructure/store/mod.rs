//! Document store backends

mod factory;
mod in_memory;
mod postgres;

pub use factory::{StoreConfig, StoreFactory, StoreType};
pub use in_memory::InMemoryDocumentStore;
pub use postgres::{PostgresDocumentStore, PostgresStoreConfig};
