//! Clustering engine: validation, k selection, and cluster assembly

use chrono::Utc;
use std::collections::HashMap;

use super::lloyd;
use crate::error::{MasteryError, Result};
use crate::types::{Cluster, ClusteringConfig, ConversationSummary};

/// Engine that partitions conversations into topic clusters.
///
/// Pure over its inputs; persistence is the caller's responsibility.
pub struct ClusteringEngine {
    config: ClusteringConfig,
}

impl Default for ClusteringEngine {
    fn default() -> Self {
        Self::new(ClusteringConfig::default())
    }
}

impl ClusteringEngine {
    /// Create an engine with the given configuration
    pub fn new(config: ClusteringConfig) -> Self {
        Self { config }
    }

    /// Partition conversations into clusters.
    ///
    /// Requires at least 2 conversations and consistent embedding
    /// dimensionality. When `k_hint` is absent, k is chosen by the
    /// `sqrt(n/2)` heuristic clamped to `[1, min(n, max_k)]`; this is a
    /// heuristic, not a validated-optimal choice.
    pub fn cluster(
        &self,
        conversations: &[ConversationSummary],
        k_hint: Option<usize>,
    ) -> Result<Vec<Cluster>> {
        let n = conversations.len();
        if n < 2 {
            return Err(MasteryError::InsufficientData(n));
        }

        let dims = conversations[0].embedding.len();
        for conv in conversations {
            if conv.embedding.len() != dims {
                return Err(MasteryError::DimensionMismatch {
                    expected: dims,
                    got: conv.embedding.len(),
                });
            }
        }
        if dims == 0 {
            return Err(MasteryError::InvalidInput(
                "Conversation embeddings are empty".to_string(),
            ));
        }

        let k = self.select_k(n, k_hint);
        tracing::debug!(n, k, "Running k-means over conversation embeddings");

        let embeddings: Vec<Vec<f32>> = conversations
            .iter()
            .map(|c| c.embedding.clone())
            .collect();
        let partition = lloyd(&embeddings, k, self.config.max_iterations);

        // Assemble output clusters in centroid index order, skipping any
        // centroid that ended up without members.
        let now = Utc::now();
        let mut clusters = Vec::new();
        for centroid_idx in 0..k {
            let members: Vec<&ConversationSummary> = partition
                .assignments
                .iter()
                .enumerate()
                .filter(|(_, &a)| a == centroid_idx)
                .map(|(i, _)| &conversations[i])
                .collect();

            if members.is_empty() {
                continue;
            }

            let key_concepts = rank_concepts(&members, self.config.top_concepts);

            clusters.push(Cluster {
                id: format!("cluster_{}", clusters.len()),
                label: String::new(),
                description: String::new(),
                conversation_ids: members.iter().map(|m| m.id.clone()).collect(),
                key_concepts,
                centroid: partition.centroids[centroid_idx].clone(),
                created_at: now,
            });
        }

        tracing::info!(
            conversations = n,
            clusters = clusters.len(),
            iterations = partition.iterations,
            "Clustering completed"
        );
        Ok(clusters)
    }

    /// Choose cluster count: hint clamped if supplied, else
    /// `clamp(round(sqrt(n/2)), 1, min(n, max_k))`.
    fn select_k(&self, n: usize, k_hint: Option<usize>) -> usize {
        let ceiling = n.min(self.config.max_k).max(1);
        match k_hint {
            Some(hint) => hint.clamp(1, ceiling),
            None => {
                let heuristic = ((n as f64 / 2.0).sqrt().round()) as usize;
                heuristic.clamp(1, ceiling)
            }
        }
    }
}

/// Top-N most frequent concept titles among member conversations, counted
/// case-insensitively, ties broken by first-seen order. Display keeps the
/// casing of the first occurrence.
fn rank_concepts(members: &[&ConversationSummary], top_n: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut first_seen: Vec<(String, String)> = Vec::new(); // (normalized, display)

    for member in members {
        for concept in &member.concepts {
            let key = concept.to_lowercase();
            let entry = counts.entry(key.clone()).or_insert(0);
            if *entry == 0 {
                first_seen.push((key, concept.clone()));
            }
            *entry += 1;
        }
    }

    let mut ranked: Vec<(usize, usize, String)> = first_seen
        .into_iter()
        .enumerate()
        .map(|(order, (key, display))| (counts[&key], order, display))
        .collect();
    // Count descending, then first-seen order ascending
    ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    ranked
        .into_iter()
        .take(top_n)
        .map(|(_, _, display)| display)
        .collect()
}
