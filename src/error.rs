//! Error types for Mastery

use thiserror::Error;

/// Result type alias for Mastery operations
pub type Result<T> = std::result::Result<T, MasteryError>;

/// Main error type for Mastery
#[derive(Error, Debug)]
pub enum MasteryError {
    #[error("Not enough conversations to cluster: have {0}, need at least 2")]
    InsufficientData(usize),

    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Cluster labeling failed: {0}")]
    Labeling(String),

    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Clustering run already in progress")]
    ConcurrentRunRejected,

    #[error("Oracle error: {0}")]
    Oracle(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    #[cfg(any(feature = "anthropic", feature = "remote-embeddings"))]
    Http(#[from] reqwest::Error),

    #[error("HTTP request error: {0}")]
    #[cfg(not(any(feature = "anthropic", feature = "remote-embeddings")))]
    Http(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MasteryError {
    /// Check if error is retryable at the orchestration layer
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MasteryError::Oracle(_)
                | MasteryError::Labeling(_)
                | MasteryError::EmbeddingUnavailable(_)
                | MasteryError::Http(_)
        )
    }

    /// Errors that abort a clustering run outright, as opposed to
    /// I/O-adjacent errors that are absorbed with a fallback.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(
            self,
            MasteryError::InsufficientData(_) | MasteryError::DimensionMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(MasteryError::Oracle("upstream 500".into()).is_retryable());
        assert!(MasteryError::Labeling("timed out".into()).is_retryable());
        assert!(MasteryError::EmbeddingUnavailable("rate limited".into()).is_retryable());
        assert!(!MasteryError::InsufficientData(1).is_retryable());
        assert!(!MasteryError::NotFound("course x".into()).is_retryable());
        assert!(!MasteryError::ConcurrentRunRejected.is_retryable());
    }

    #[test]
    fn test_fatal_for_run_classification() {
        assert!(MasteryError::InsufficientData(0).is_fatal_for_run());
        assert!(MasteryError::DimensionMismatch { expected: 2, got: 3 }.is_fatal_for_run());
        // Absorbed with fallbacks, never aborts a run
        assert!(!MasteryError::Labeling("bad json".into()).is_fatal_for_run());
        assert!(!MasteryError::EmbeddingUnavailable("down".into()).is_fatal_for_run());
    }
}
