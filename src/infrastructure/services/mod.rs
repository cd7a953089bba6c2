//! Service layer - history, semantic cache and the facade over both

mod conversation_memory;
mod history_service;
mod semantic_cache_service;

pub use conversation_memory::ConversationMemory;
pub use history_service::ConversationHistoryService;
pub use semantic_cache_service::SemanticCacheService;
