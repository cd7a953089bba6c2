//! Semantic cache configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the capacity check on the write path is coordinated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionMode {
    /// Count, evict and insert without coordination; concurrent writers can
    /// overshoot the capacity transiently
    #[default]
    BestEffort,
    /// Writers in this process take turns through the count/evict/insert sequence
    Serialized,
}

/// Configuration for semantic caching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticCacheConfig {
    /// Similarity threshold for cache hits (0.0 to 1.0)
    /// A candidate below it is a miss; one equal to it is a hit
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Maximum number of entries to store
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Idle seconds before the store expires an entry
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Length of every stored embedding
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    #[serde(default)]
    pub eviction: EvictionMode,
}

fn default_similarity_threshold() -> f32 {
    0.95
}

fn default_max_entries() -> usize {
    1000
}

fn default_ttl_secs() -> u64 {
    10800
}

fn default_dimensions() -> usize {
    1536
}

impl Default for SemanticCacheConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            max_entries: default_max_entries(),
            ttl_secs: default_ttl_secs(),
            dimensions: default_dimensions(),
            eviction: EvictionMode::default(),
        }
    }
}

impl SemanticCacheConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Get TTL as Duration
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Set the similarity threshold
    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Set the maximum number of entries
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Set the TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_secs = ttl.as_secs();
        self
    }

    /// Set the embedding dimensionality
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn with_eviction(mut self, eviction: EvictionMode) -> Self {
        self.eviction = eviction;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SemanticCacheConfig::default();

        assert!((config.similarity_threshold - 0.95).abs() < f32::EPSILON);
        assert_eq!(config.max_entries, 1000);
        assert_eq!(config.ttl(), Duration::from_secs(10800));
        assert_eq!(config.dimensions, 1536);
        assert_eq!(config.eviction, EvictionMode::BestEffort);
    }

    #[test]
    fn test_config_builder() {
        let config = SemanticCacheConfig::new()
            .with_similarity_threshold(0.9)
            .with_max_entries(2)
            .with_ttl(Duration::from_secs(60))
            .with_dimensions(4)
            .with_eviction(EvictionMode::Serialized);

        assert!((config.similarity_threshold - 0.9).abs() < f32::EPSILON);
        assert_eq!(config.max_entries, 2);
        assert_eq!(config.ttl_secs, 60);
        assert_eq!(config.dimensions, 4);
        assert_eq!(config.eviction, EvictionMode::Serialized);
    }

    #[test]
    fn test_similarity_threshold_clamped() {
        let config = SemanticCacheConfig::new().with_similarity_threshold(1.5);
        assert!((config.similarity_threshold - 1.0).abs() < f32::EPSILON);

        let config = SemanticCacheConfig::new().with_similarity_threshold(-0.5);
        assert!(config.similarity_threshold.abs() < f32::EPSILON);
    }

    #[test]
    fn test_eviction_mode_deserializes_snake_case() {
        let mode: EvictionMode = serde_json::from_str("\"serialized\"").unwrap();
        assert_eq!(mode, EvictionMode::Serialized);
    }
}
