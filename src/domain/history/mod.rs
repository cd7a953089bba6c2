//! Conversation history domain models

mod config;
mod entity;

pub use config::HistoryConfig;
pub use entity::{HistoryRecord, Turn};
