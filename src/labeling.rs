//! Cluster labeling: representative sampling plus oracle invocation
//!
//! The text synthesis itself is delegated to the oracle; what lives here is
//! the sampling policy (which messages represent a cluster) and the
//! mandatory deterministic fallback so that clustering output is never
//! blocked by an external-service outage.

use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use crate::error::{MasteryError, Result};
use crate::oracle::{extract_json_object, prompts, Oracle};
use crate::types::{Cluster, LabelingConfig};

/// Label and description produced for one cluster
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LabelResult {
    /// Short human label, 3-5 words
    pub label: String,
    /// 1-3 sentence description
    pub description: String,
}

/// Orchestrates labeling for clusters produced by a run
pub struct ClusterLabeler {
    config: LabelingConfig,
}

impl Default for ClusterLabeler {
    fn default() -> Self {
        Self::new(LabelingConfig::default())
    }
}

impl ClusterLabeler {
    pub fn new(config: LabelingConfig) -> Self {
        Self { config }
    }

    /// Select up to `sample_cap` representative messages across member
    /// conversations, proportionally distributed so one chatty conversation
    /// cannot dominate the labeling prompt. Round-robin: one message per
    /// conversation per round until the cap is reached.
    pub fn sample_messages(&self, conversations: &[Vec<String>]) -> Vec<String> {
        let cap = self.config.sample_cap;
        let mut samples = Vec::with_capacity(cap);
        let mut round = 0;

        loop {
            let mut took_any = false;
            for messages in conversations {
                if samples.len() >= cap {
                    return samples;
                }
                if let Some(message) = messages.get(round) {
                    samples.push(message.clone());
                    took_any = true;
                }
            }
            if !took_any {
                return samples;
            }
            round += 1;
        }
    }

    /// Ask the oracle for a label and description, under the configured
    /// wall-clock budget. Fails with `Labeling` on timeout, oracle failure,
    /// or an unparseable response; callers fall back to
    /// [`ClusterLabeler::fallback_label`].
    pub async fn label(
        &self,
        oracle: &dyn Oracle,
        cluster: &Cluster,
        samples: &[String],
    ) -> Result<LabelResult> {
        let prompt = prompts::cluster_label_prompt(&cluster.key_concepts, samples);

        let response = timeout(self.config.oracle_timeout, oracle.complete(&prompt))
            .await
            .map_err(|_| {
                MasteryError::Labeling(format!(
                    "Oracle call exceeded {:?} budget",
                    self.config.oracle_timeout
                ))
            })?
            .map_err(|e| MasteryError::Labeling(e.to_string()))?;

        Self::parse_label_response(&response)
    }

    /// Deterministic label built from the top representative concepts.
    /// Used whenever the oracle path fails; a plain-but-valid label, never
    /// an error surfaced to the user.
    pub fn fallback_label(key_concepts: &[String]) -> LabelResult {
        if key_concepts.is_empty() {
            return LabelResult {
                label: "General Technical Topics".to_string(),
                description:
                    "Various technical discussions and professional problem-solving conversations."
                        .to_string(),
            };
        }

        let label = key_concepts
            .iter()
            .take(3)
            .cloned()
            .collect::<Vec<_>>()
            .join(" & ");
        let main = key_concepts[0].to_lowercase();
        let description = format!(
            "Professional discussions focused on {} and related technical concepts. \
             Learn practical approaches to common challenges in this domain.",
            main
        );

        LabelResult { label, description }
    }

    fn parse_label_response(response: &str) -> Result<LabelResult> {
        let json = extract_json_object(response)
            .ok_or_else(|| MasteryError::Labeling("No JSON object in oracle response".into()))?;

        #[derive(Deserialize)]
        struct Raw {
            title: String,
            description: String,
        }

        let raw: Raw = serde_json::from_str(json)
            .map_err(|e| MasteryError::Labeling(format!("Malformed label JSON: {}", e)))?;

        let label = raw.title.trim().to_string();
        let description = raw.description.trim().to_string();
        if label.is_empty() || description.is_empty() {
            return Err(MasteryError::Labeling(
                "Oracle returned an empty label or description".into(),
            ));
        }

        Ok(LabelResult { label, description })
    }
}
