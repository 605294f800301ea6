//! Embedding seam — remote HTTP service plus a local deterministic fallback.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::error::KnowledgeError;

/// Text embedding service.
///
/// Must be idempotent and side-effect-free: the same text embeds to the
/// same vector at knowledge-ingestion time and at query time. An
/// unavailable service surfaces as a transient [`KnowledgeError::Embedding`]
/// — never a silent zero vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, KnowledgeError>;

    /// Output dimension of this embedder.
    fn dimension(&self) -> usize;
}

// ── HTTP embedder ───────────────────────────────────────────────────

/// OpenAI-style `/embeddings` endpoint client.
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    dimension: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(base_url: &str, api_key: SecretString, model: &str, dimension: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            dimension,
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, KnowledgeError> {
        let url = format!("{}/embeddings", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&serde_json::json!({
                "model": self.model,
                "input": text,
            }))
            .send()
            .await
            .map_err(|e| KnowledgeError::Embedding {
                reason: format!("request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(KnowledgeError::Embedding {
                reason: format!("HTTP {status}"),
            });
        }

        let parsed: EmbeddingResponse =
            response.json().await.map_err(|e| KnowledgeError::Embedding {
                reason: format!("invalid response body: {e}"),
            })?;

        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| KnowledgeError::Embedding {
                reason: "empty data array".into(),
            })?;

        debug!(model = %self.model, dim = vector.len(), "Embedded text");
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ── Hashing embedder ────────────────────────────────────────────────

/// Default dimension for the hashing embedder.
const HASH_DIM: usize = 256;

/// Local feature-hashing embedder.
///
/// Hashes lowercase word tokens into a fixed-dimension bucket vector and
/// L2-normalizes. Texts sharing vocabulary land close in cosine space,
/// which is enough for offline runs and tests; production deployments
/// point [`HttpEmbedder`] at a real model instead.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self { dimension: HASH_DIM }
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, KnowledgeError> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() as usize) % self.dimension;
            vector[bucket] += 1.0;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::new();
        let a = embedder.embed("reset my password please").await.unwrap();
        let b = embedder.embed("reset my password please").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn hash_embedder_normalizes() {
        let embedder = HashEmbedder::new();
        let v = embedder.embed("password reset flow").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn hash_embedder_empty_text_is_zero_vector() {
        let embedder = HashEmbedder::new();
        let v = embedder.embed("   ").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn similar_texts_are_closer_than_unrelated() {
        let embedder = HashEmbedder::new();
        let a = embedder.embed("cannot log into my account password").await.unwrap();
        let b = embedder.embed("password problems when I log into the account").await.unwrap();
        let c = embedder.embed("quarterly marketing newsletter metrics").await.unwrap();

        let sim = crate::knowledge::cosine_similarity;
        assert!(sim(&a, &b) > sim(&a, &c));
    }
}
