//! Mastery - Conversation Clustering and Course Derivation
//!
//! Groups technical conversations into thematic clusters with deterministic
//! k-means over concept embeddings, labels them, and derives structured
//! courses with per-concept progress tracking.

pub mod analysis;
pub mod clustering;
pub mod course;
pub mod embedding;
pub mod error;
pub mod labeling;
pub mod oracle;
pub mod pipeline;
pub mod scheduler;
pub mod store;
pub mod types;

pub use error::{MasteryError, Result};
pub use pipeline::ClusteringPipeline;
pub use scheduler::BackgroundScheduler;
pub use store::{MemoryStore, Store};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
