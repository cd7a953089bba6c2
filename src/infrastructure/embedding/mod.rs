//! Embedding provider implementations

mod azure_openai;

pub use azure_openai::{AzureOpenAiEmbedder, EmbeddingConfig};
