//! Azure OpenAI embedding client

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::domain::embedding::Embedder;
use crate::domain::DomainError;
use crate::infrastructure::http_client::HttpClientTrait;

const DEFAULT_DEPLOYMENT: &str = "text-embedding-ada-002";
const DEFAULT_API_VERSION: &str = "2024-02-01";
const DEFAULT_DIMENSIONS: usize = 1536;

/// Azure OpenAI embedding settings
#[derive(Clone)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    pub api_key: String,
    pub api_version: String,
    pub deployment: String,
    pub dimensions: usize,
}

impl std::fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("api_version", &self.api_version)
            .field("deployment", &self.deployment)
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

impl EmbeddingConfig {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            deployment: DEFAULT_DEPLOYMENT.to_string(),
            dimensions: DEFAULT_DIMENSIONS,
        }
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn with_deployment(mut self, deployment: impl Into<String>) -> Self {
        self.deployment = deployment.into();
        self
    }

    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }
}

/// Embedder backed by an Azure OpenAI embeddings deployment
#[derive(Debug)]
pub struct AzureOpenAiEmbedder<C: HttpClientTrait> {
    client: C,
    config: EmbeddingConfig,
    url: String,
}

impl<C: HttpClientTrait> AzureOpenAiEmbedder<C> {
    pub fn new(client: C, config: EmbeddingConfig) -> Result<Self, DomainError> {
        if config.endpoint.trim().is_empty() {
            return Err(DomainError::configuration("Embedding endpoint is not set"));
        }

        if config.api_key.is_empty() {
            return Err(DomainError::configuration("Embedding API key is not set"));
        }

        let url = format!(
            "{}/openai/deployments/{}/embeddings?api-version={}",
            config.endpoint.trim_end_matches('/'),
            config.deployment,
            config.api_version
        );

        Ok(Self {
            client,
            config,
            url,
        })
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        vec![
            ("api-key", self.config.api_key.as_str()),
            ("Content-Type", "application/json"),
        ]
    }

    fn parse_response(&self, json: serde_json::Value) -> Result<Vec<f32>, DomainError> {
        let response: AzureEmbeddingResponse = serde_json::from_value(json).map_err(|e| {
            DomainError::embedding(format!("Failed to parse embedding response: {}", e))
        })?;

        response
            .data
            .into_iter()
            .min_by_key(|d| d.index)
            .map(|d| d.embedding)
            .ok_or_else(|| DomainError::embedding("No embedding returned"))
    }
}

#[async_trait]
impl<C: HttpClientTrait> Embedder for AzureOpenAiEmbedder<C> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DomainError> {
        let body = serde_json::json!({
            "input": text,
            "encoding_format": "float",
        });

        let response = self.client.post_json(&self.url, self.headers(), &body).await?;
        let vector = self.parse_response(response)?;

        debug!(
            deployment = %self.config.deployment,
            dimensions = vector.len(),
            "Embedded text"
        );

        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn provider_name(&self) -> &'static str {
        "azure_openai"
    }
}

#[derive(Debug, Deserialize)]
struct AzureEmbeddingResponse {
    data: Vec<AzureEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct AzureEmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}
