use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::StoreError;

/// Dimensionality of the embedding space backing every collection.
pub const EMBEDDING_DIM: usize = 768;

/// The embedding call gets a hard deadline; everything downstream of a hung
/// embedding service would otherwise block the whole session.
const EMBED_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text. Failures always propagate from here: the caller
    /// decides whether a failed embedding is fatal (store path) or
    /// degradable (search path).
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError>;
    fn model_id(&self) -> &str;
    fn dimensions(&self) -> usize;
}

/// Ollama embedding endpoint: `POST /api/embeddings` with `{model, prompt}`.
#[derive(Clone)]
pub struct OllamaEmbeddingProvider {
    client: reqwest::Client,
    model: String,
    base_url: String,
}

impl OllamaEmbeddingProvider {
    pub fn new() -> Self {
        Self::with_model("nomic-embed-text")
    }

    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            model: model.into(),
            base_url: "http://localhost:11434".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base: String = base_url.into();
        self.base_url = base.trim_end_matches('/').to_string();
        self
    }
}

impl Default for OllamaEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct OllamaEmbeddingRequest {
    model: String,
    prompt: String,
}

#[derive(Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        let endpoint = format!("{}/api/embeddings", self.base_url);
        let request = OllamaEmbeddingRequest {
            model: self.model.clone(),
            prompt: text.to_string(),
        };

        let response = self
            .client
            .post(&endpoint)
            .timeout(EMBED_TIMEOUT)
            .json(&request)
            .send()
            .await
            .map_err(StoreError::Embedding)?
            .error_for_status()
            .map_err(StoreError::Embedding)?;

        let parsed: OllamaEmbeddingResponse =
            response.json().await.map_err(StoreError::Embedding)?;
        Ok(parsed.embedding)
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }
}

/// Deterministic hash-based vectors for tests and for running without an
/// embedding service. Not semantically meaningful.
#[derive(Clone)]
pub struct StubEmbeddingProvider {
    dims: usize,
}

impl StubEmbeddingProvider {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    fn hash_to_unit_range(text: &str, index: usize) -> f32 {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update(index.to_le_bytes());
        let hash = hasher.finalize();
        let value = u32::from_le_bytes([hash[0], hash[1], hash[2], hash[3]]);
        (value as f32 / u32::MAX as f32) * 2.0 - 1.0
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        Ok((0..self.dims)
            .map(|index| Self::hash_to_unit_range(text, index))
            .collect())
    }

    fn model_id(&self) -> &str {
        "stub"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}
