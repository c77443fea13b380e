//! Embedding service clients and request batching.
//!
//! The [`EmbeddingProvider`] trait is the seam between the pipeline and the
//! vector-encoding service: production code uses [`OpenAiEmbedder`] against
//! an OpenAI-compatible `/embeddings` endpoint, tests use
//! [`MockEmbeddingProvider`] for deterministic, offline vectors.

pub mod batch;
pub mod tokenizer;

use std::hash::Hasher;

use async_trait::async_trait;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;
use crate::types::RagError;

pub use batch::{Batch, BatchAssembler};
pub use tokenizer::Tokenizer;

/// A vector-encoding service: one fixed-dimension vector per input string.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds a batch of texts, returning vectors in input order.
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError>;

    /// The fixed dimensionality of returned vectors.
    fn dimension(&self) -> usize;
}

/// Embeds a single question for the retrieval path.
pub async fn embed_question(
    provider: &dyn EmbeddingProvider,
    question: &str,
) -> Result<Vec<f32>, RagError> {
    let mut vectors = provider.embed_batch(&[question.to_string()]).await?;
    vectors
        .pop()
        .ok_or_else(|| RagError::Embedding("service returned no vector for question".into()))
}

/// Strips, exact-deduplicates, and truncates rows to the per-item token cap
/// before batching. Order of first occurrence is preserved.
pub fn prepare_rows(
    rows: Vec<String>,
    tokenizer: &Tokenizer,
    max_tokens_per_item: usize,
) -> Vec<String> {
    let mut seen = rustc_hash::FxHashSet::default();
    let mut cleaned = Vec::new();
    for row in rows {
        let trimmed = row.trim();
        if trimmed.is_empty() {
            continue;
        }
        let truncated = tokenizer.truncate(trimmed, max_tokens_per_item);
        if seen.insert(truncated.clone()) {
            cleaned.push(truncated);
        }
    }
    cleaned
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ServiceError {
    error: ServiceErrorBody,
}

#[derive(Deserialize)]
struct ServiceErrorBody {
    message: String,
}

/// Client for an OpenAI-compatible embeddings endpoint.
#[derive(Clone, Debug)]
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
}

impl OpenAiEmbedder {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>, config: &EmbeddingConfig) -> Self {
        Self {
            client,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: api_key.into(),
            model: config.model.clone(),
            dimension: config.dimension,
        }
    }

    /// Points the client at a different OpenAI-compatible host.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: inputs,
            })
            .send()
            .await
            .map_err(|err| RagError::Embedding(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ServiceError>().await {
                Ok(body) => body.error.message,
                Err(_) => format!("status {status}"),
            };
            return Err(RagError::Embedding(message));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|err| RagError::Embedding(format!("malformed response: {err}")))?;
        if body.data.len() != inputs.len() {
            return Err(RagError::Embedding(format!(
                "expected {} vectors, got {}",
                inputs.len(),
                body.data.len()
            )));
        }
        let vectors: Vec<Vec<f32>> = body.data.into_iter().map(|d| d.embedding).collect();
        for vector in &vectors {
            if vector.len() != self.dimension {
                return Err(RagError::DimensionMismatch {
                    expected: self.dimension,
                    actual: vector.len(),
                });
            }
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic offline provider for tests and examples. Vectors are
/// derived from a hash of the input text, so identical texts always embed
/// identically.
#[derive(Clone, Debug)]
pub struct MockEmbeddingProvider {
    dimension: usize,
}

impl MockEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new(8)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Ok(inputs
            .iter()
            .map(|text| {
                let mut hasher = FxHasher::default();
                hasher.write(text.as_bytes());
                let mut state = hasher.finish();
                (0..self.dimension)
                    .map(|_| {
                        // xorshift over the seed for a stable pseudo-vector.
                        state ^= state << 13;
                        state ^= state >> 7;
                        state ^= state << 17;
                        (state as f32 / u64::MAX as f32) * 2.0 - 1.0
                    })
                    .collect()
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
