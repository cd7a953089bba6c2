//! Container declarations and stored document traits

use std::fmt::Debug;
use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::domain::DomainError;

/// Trait for types that live in a document container
pub trait ContainerDocument: Clone + Debug + Send + Sync + Serialize + DeserializeOwned {
    /// Path of the field the container partitions on
    const PARTITION_KEY_PATH: &'static str;

    /// Document id, unique within its partition
    fn id(&self) -> &str;

    /// Value of the partition key field
    fn partition_key(&self) -> &str;
}

/// Vector index algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorIndexKind {
    /// Quantized approximate nearest-neighbor index
    QuantizedFlat,
    /// Exact scan over full-precision vectors
    Flat,
}

/// Similarity metric for a vector index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorMetric {
    Cosine,
}

/// Vector index declared over one document field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorIndexSpec {
    pub path: String,
    pub kind: VectorIndexKind,
    pub metric: VectorMetric,
    pub dimensions: usize,
}

impl VectorIndexSpec {
    /// Quantized cosine index, the layout the semantic cache needs
    pub fn quantized_cosine(path: impl Into<String>, dimensions: usize) -> Self {
        Self {
            path: path.into(),
            kind: VectorIndexKind::QuantizedFlat,
            metric: VectorMetric::Cosine,
            dimensions,
        }
    }
}

/// Everything a store needs to provision a container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub partition_key_path: String,
    pub throughput: u32,
    /// Idle time after the last write before a document expires
    pub default_ttl: Option<Duration>,
    pub vector_index: Option<VectorIndexSpec>,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, partition_key_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition_key_path: partition_key_path.into(),
            throughput: 400,
            default_ttl: None,
            vector_index: None,
        }
    }

    pub fn with_throughput(mut self, throughput: u32) -> Self {
        self.throughput = throughput;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    pub fn with_vector_index(mut self, index: VectorIndexSpec) -> Self {
        self.vector_index = Some(index);
        self
    }

    /// Check names before they reach a backend that interpolates them
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_identifier(&self.name)?;
        validate_identifier(&self.partition_key_path)?;

        if let Some(ref index) = self.vector_index {
            validate_identifier(&index.path)?;

            if index.dimensions == 0 {
                return Err(DomainError::validation(format!(
                    "Vector index on '{}' must have at least one dimension",
                    index.path
                )));
            }
        }

        Ok(())
    }

    /// Extract `(id, partition_key)` from a document body
    pub fn document_keys(&self, document: &Value) -> Result<(String, String), DomainError> {
        let id = string_field(document, "id").ok_or_else(|| {
            DomainError::validation(format!(
                "Document for container '{}' is missing a string 'id'",
                self.name
            ))
        })?;

        let partition_key = string_field(document, &self.partition_key_path).ok_or_else(|| {
            DomainError::validation(format!(
                "Document for container '{}' is missing partition key '{}'",
                self.name, self.partition_key_path
            ))
        })?;

        Ok((id, partition_key))
    }

    /// Extract the indexed vector, checking its length against the index
    pub fn document_vector(&self, document: &Value) -> Result<Option<Vec<f32>>, DomainError> {
        let Some(ref index) = self.vector_index else {
            return Ok(None);
        };

        let Some(raw) = document.get(&index.path) else {
            return Ok(None);
        };

        let vector: Vec<f32> = serde_json::from_value(raw.clone()).map_err(|e| {
            DomainError::validation(format!("Field '{}' is not a vector: {}", index.path, e))
        })?;

        if vector.len() != index.dimensions {
            return Err(DomainError::validation(format!(
                "Field '{}' has {} dimensions, index expects {}",
                index.path,
                vector.len(),
                index.dimensions
            )));
        }

        Ok(Some(vector))
    }
}

fn string_field(document: &Value, path: &str) -> Option<String> {
    document.get(path)?.as_str().map(str::to_string)
}

/// Validate a container, schema or field name
///
/// Only ASCII letters, digits and underscores are allowed, starting with a letter
/// or underscore, at most 63 characters.
pub fn validate_identifier(name: &str) -> Result<(), DomainError> {
    let mut chars = name.chars();

    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid_start || !valid_rest || name.len() > 63 {
        return Err(DomainError::validation(format!(
            "Invalid identifier '{}': use letters, digits and underscores",
            name
        )));
    }

    Ok(())
}
