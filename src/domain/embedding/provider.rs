//! Embedding provider trait definition

use async_trait::async_trait;
use std::fmt::Debug;

use crate::domain::DomainError;

/// Maps text to a fixed-dimension dense vector
#[async_trait]
pub trait Embedder: Send + Sync + Debug {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DomainError>;

    /// Length of every vector this embedder returns
    fn dimensions(&self) -> usize;

    /// Name used in logs and errors
    fn provider_name(&self) -> &'static str;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::RwLock;

    /// Deterministic embedder for tests
    ///
    /// Texts registered with [`MockEmbedder::with_vector`] embed to exactly that
    /// vector; anything else gets a vector derived from its bytes.
    #[derive(Debug)]
    pub struct MockEmbedder {
        dimensions: usize,
        vectors: RwLock<HashMap<String, Vec<f32>>>,
        error: Option<String>,
        calls: AtomicUsize,
    }

    impl MockEmbedder {
        pub fn new(dimensions: usize) -> Self {
            Self {
                dimensions,
                vectors: RwLock::new(HashMap::new()),
                error: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn with_vector(self, text: impl Into<String>, vector: Vec<f32>) -> Self {
            self.vectors.write().unwrap().insert(text.into(), vector);
            self
        }

        pub fn with_error(mut self, error: impl Into<String>) -> Self {
            self.error = Some(error.into());
            self
        }

        /// Number of embed calls made so far
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Embedder for MockEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, DomainError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            if let Some(ref error) = self.error {
                return Err(DomainError::provider("mock", error));
            }

            if let Some(vector) = self.vectors.read().unwrap().get(text) {
                return Ok(vector.clone());
            }

            let hash = text
                .bytes()
                .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));

            Ok((0..self.dimensions)
                .map(|i| ((hash.wrapping_add(i as u64 * 7919) % 1000) as f32 / 1000.0) - 0.5)
                .collect())
        }

        fn dimensions(&self) -> usize {
            self.dimensions
        }

        fn provider_name(&self) -> &'static str {
            "mock"
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_mock_embedder_dimensions() {
            let embedder = MockEmbedder::new(16);

            let vector = embedder.embed("hello").await.unwrap();

            assert_eq!(vector.len(), 16);
            assert_eq!(embedder.calls(), 1);
        }

        #[tokio::test]
        async fn test_mock_embedder_is_deterministic() {
            let embedder = MockEmbedder::new(8);

            let first = embedder.embed("hello").await.unwrap();
            let second = embedder.embed("hello").await.unwrap();

            assert_eq!(first, second);
        }

        #[tokio::test]
        async fn test_mock_embedder_registered_vector() {
            let embedder = MockEmbedder::new(2).with_vector("fixed", vec![1.0, 0.0]);

            assert_eq!(embedder.embed("fixed").await.unwrap(), vec![1.0, 0.0]);
        }

        #[tokio::test]
        async fn test_mock_embedder_error() {
            let embedder = MockEmbedder::new(2).with_error("quota exceeded");

            assert!(embedder.embed("hello").await.is_err());
        }
    }
}
