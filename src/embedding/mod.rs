//! Embedding generation and vector helpers
//!
//! Supports multiple embedding backends:
//! - OpenAI-compatible API - requires `remote-embeddings` feature
//! - Deterministic hash fallback (no external dependencies)
//!
//! Embeddings come from a text model, so magnitude is not meaningful;
//! everything downstream compares vectors by cosine similarity.

mod hash;

pub use hash::HashEmbedder;

use crate::error::{MasteryError, Result};

/// Default embedding dimensionality (fixed per deployment)
pub const DEFAULT_DIMENSIONS: usize = 1024;

/// Trait for embedding generators
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Remote embedding client for OpenAI-compatible APIs.
///
/// Requires the `remote-embeddings` feature to be enabled.
#[cfg(feature = "remote-embeddings")]
pub struct RemoteEmbedder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
}

#[cfg(feature = "remote-embeddings")]
impl RemoteEmbedder {
    /// Create a new remote embedder
    ///
    /// # Arguments
    /// * `api_key` - API key for authentication
    /// * `base_url` - API base URL, defaults to the OpenAI endpoint
    /// * `model` - Model name, defaults to text-embedding-3-small
    /// * `dimensions` - Expected embedding dimensions (must match model output)
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        model: Option<String>,
        dimensions: Option<usize>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: model.unwrap_or_else(|| "text-embedding-3-small".to_string()),
            dimensions: dimensions.unwrap_or(1536),
        }
    }

    /// Async embedding call against the remote API
    pub async fn embed_async(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({
                "input": text,
                "model": self.model,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MasteryError::EmbeddingUnavailable(format!(
                "Embedding API error {}: {}",
                status, body
            )));
        }

        let data: serde_json::Value = response.json().await?;
        let embedding: Vec<f32> = data["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| {
                MasteryError::EmbeddingUnavailable("Invalid response format".to_string())
            })?
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();

        if embedding.len() != self.dimensions {
            return Err(MasteryError::DimensionMismatch {
                expected: self.dimensions,
                got: embedding.len(),
            });
        }

        Ok(embedding)
    }
}

#[cfg(feature = "remote-embeddings")]
impl Embedder for RemoteEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        // Blocking call for sync interface
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(self.embed_async(text))
        })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Cosine distance, the metric used by the clustering engine
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Element-wise mean of a set of equal-length vectors.
///
/// Returns None for an empty input; the caller decides whether that means
/// the conversation is excluded from the run.
pub fn mean_embedding(embeddings: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = embeddings.first()?;
    let dims = first.len();
    let mut sum = vec![0.0f32; dims];
    let mut count = 0usize;

    for embedding in embeddings {
        if embedding.len() != dims {
            continue;
        }
        for (acc, v) in sum.iter_mut().zip(embedding.iter()) {
            *acc += v;
        }
        count += 1;
    }

    if count == 0 {
        return None;
    }

    for v in sum.iter_mut() {
        *v /= count as f32;
    }
    Some(sum)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.001);

        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_mismatched_lengths() {
        let a = vec![1.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_mean_embedding() {
        let mean = mean_embedding(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        assert!((mean[0] - 0.5).abs() < 0.001);
        assert!((mean[1] - 0.5).abs() < 0.001);

        assert!(mean_embedding(&[]).is_none());
    }

    #[test]
    fn test_mean_embedding_skips_bad_lengths() {
        let mean = mean_embedding(&[vec![2.0, 0.0], vec![1.0, 2.0, 3.0]]).unwrap();
        assert_eq!(mean, vec![2.0, 0.0]);
    }

    #[test]
    fn test_hash_embedder_dimensions() {
        let embedder = HashEmbedder::new(DEFAULT_DIMENSIONS);
        let embedding = embedder.embed("Hello world").unwrap();
        assert_eq!(embedding.len(), DEFAULT_DIMENSIONS);
    }
}
