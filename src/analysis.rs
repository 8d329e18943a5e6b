//! Message analysis: concept extraction and embedding generation
//!
//! Each new message is analyzed once: the oracle extracts 0-3 technical
//! concepts, and an embedding is computed over the concept text. A failed
//! analysis leaves the message unprocessed and its conversation excluded
//! from the next clustering run; it never fails the run itself.

use std::sync::Arc;

use crate::embedding::Embedder;
use crate::error::{MasteryError, Result};
use crate::oracle::{parse_extracted_concepts, prompts, ExtractedConcept, Oracle};

/// Result of analyzing one message
#[derive(Debug, Clone)]
pub struct MessageAnalysis {
    /// Extracted concepts (possibly empty for non-technical chatter)
    pub concepts: Vec<ExtractedConcept>,
    /// Embedding over the concept text
    pub embedding: Vec<f32>,
}

/// Analyzer combining the oracle (concepts) with an embedder (vectors)
pub struct MessageAnalyzer {
    embedder: Arc<dyn Embedder>,
}

impl MessageAnalyzer {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    /// Embedding dimensionality of the underlying embedder
    pub fn dimensions(&self) -> usize {
        self.embedder.dimensions()
    }

    /// Extract concepts from a message and embed them.
    ///
    /// Oracle failures surface as `EmbeddingUnavailable` so the pipeline
    /// treats the conversation as missing an embedding for this run.
    pub async fn analyze(&self, oracle: &dyn Oracle, content: &str) -> Result<MessageAnalysis> {
        let prompt = prompts::concept_extraction_prompt(content);
        let response = oracle
            .complete(&prompt)
            .await
            .map_err(|e| MasteryError::EmbeddingUnavailable(e.to_string()))?;

        let concepts = parse_extracted_concepts(&response);
        if concepts.is_empty() {
            tracing::debug!("No technical concepts extracted from message");
        }

        // Embed the concept text rather than the raw message so the vector
        // reflects what the conversation is about, not how it is phrased.
        let embed_input = if concepts.is_empty() {
            content.to_string()
        } else {
            concepts
                .iter()
                .map(|c| format!("{}: {}", c.title, c.summary))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let embedding = self
            .embedder
            .embed(&embed_input)
            .map_err(|e| MasteryError::EmbeddingUnavailable(e.to_string()))?;

        Ok(MessageAnalysis {
            concepts,
            embedding,
        })
    }
}
