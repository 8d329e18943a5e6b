//! Deterministic hash-based embedding fallback
//!
//! Not a semantic model: vectors are derived from a content digest, so
//! identical text maps to identical vectors and nothing else is promised.
//! Useful for testing and environments where API calls aren't possible.

use sha2::{Digest, Sha256};

use crate::embedding::Embedder;
use crate::error::Result;

/// Digest-based embedder producing fixed-dimension vectors in [-1, 1]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// Expand the content digest until enough bytes exist to fill every
    /// dimension, re-hashing with a counter suffix per block.
    fn digest_bytes(text: &str, wanted: usize) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(wanted);
        let mut counter: u32 = 0;

        while bytes.len() < wanted {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update(counter.to_le_bytes());
            bytes.extend_from_slice(&hasher.finalize());
            counter += 1;
        }

        bytes.truncate(wanted);
        bytes
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let bytes = Self::digest_bytes(text, self.dimensions);

        // Normalize each byte to [-1, 1]
        let embedding = bytes
            .into_iter()
            .map(|b| (b as f32 - 127.5) / 127.5)
            .collect();

        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "hash"
    }
}
