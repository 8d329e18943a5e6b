//! Conversation clustering engine
//!
//! Partitions conversations into topic clusters over their aggregate
//! embeddings using Lloyd's k-means on cosine distance. Pure computation:
//! no I/O, no suspension points; the surrounding pipeline owns persistence.

mod engine;
mod kmeans;

pub use engine::ClusteringEngine;
pub(crate) use kmeans::lloyd;
