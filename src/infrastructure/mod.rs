//! Infrastructure layer - store backends, embedding client and services

pub mod database;
pub mod embedding;
pub mod http_client;
pub mod logging;
pub mod metrics;
pub mod services;
pub mod store;
