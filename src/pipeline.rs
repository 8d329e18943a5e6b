//! Clustering pipeline orchestration
//!
//! Ties the analysis, clustering, labeling, and course layers together over
//! the store boundary. The clustering engine itself is pure and never
//! suspends; everything that does I/O lives here. I/O-adjacent failures
//! (missing embeddings, labeling outages) are absorbed with fallbacks so a
//! single flaky upstream call never blocks the whole run.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::analysis::MessageAnalyzer;
use crate::clustering::ClusteringEngine;
use crate::course::CourseBuilder;
use crate::embedding::{cosine_similarity, Embedder};
use crate::error::{MasteryError, Result};
use crate::labeling::ClusterLabeler;
use crate::oracle::{parse_topic_suggestions, prompts, Oracle};
use crate::store::Store;
use crate::types::{
    Cluster, ClusteringConfig, ClusteringRunRecord, Course, CourseStage, ConceptStatus,
    LabelingConfig,
};

/// Maximum related topics accepted per oracle call
const RELATED_TOPIC_CAP: usize = 8;

/// Similar-conversation results returned per query
const SIMILAR_LIMIT: usize = 10;

/// Default cosine similarity floor for [`ClusteringPipeline::find_similar`]
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.6;

/// Outcome of one clustering run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Conversations that participated
    pub total_conversations: usize,
    /// Non-empty clusters produced
    pub clusters_created: usize,
    /// Messages analyzed before the run
    pub messages_analyzed: usize,
    /// Clusters whose label came from the deterministic fallback
    pub fallback_labels: usize,
}

/// A conversation similar to a query conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarConversation {
    pub conversation_id: String,
    pub similarity: f32,
    pub concepts: Vec<String>,
}

/// Orchestrates the full clustering-to-courses flow
pub struct ClusteringPipeline {
    store: Arc<dyn Store>,
    oracle: Arc<dyn Oracle>,
    analyzer: MessageAnalyzer,
    engine: ClusteringEngine,
    labeler: ClusterLabeler,
}

impl ClusteringPipeline {
    pub fn new(store: Arc<dyn Store>, oracle: Arc<dyn Oracle>, embedder: Arc<dyn Embedder>) -> Self {
        Self::with_configs(
            store,
            oracle,
            embedder,
            ClusteringConfig::default(),
            LabelingConfig::default(),
        )
    }

    pub fn with_configs(
        store: Arc<dyn Store>,
        oracle: Arc<dyn Oracle>,
        embedder: Arc<dyn Embedder>,
        clustering: ClusteringConfig,
        labeling: LabelingConfig,
    ) -> Self {
        Self {
            store,
            oracle,
            analyzer: MessageAnalyzer::new(embedder),
            engine: ClusteringEngine::new(clustering),
            labeler: ClusterLabeler::new(labeling),
        }
    }

    /// Execute one clustering run: analyze pending messages, partition
    /// conversations, label clusters, persist the new generation.
    ///
    /// Pure-computation errors (`InsufficientData`, `DimensionMismatch`)
    /// abort the run; they are the caller's signal to show a "not enough
    /// data yet" state rather than an error.
    pub async fn run(&self) -> Result<RunSummary> {
        tracing::info!("Starting conversation clustering run");

        let messages_analyzed = self.analyze_unprocessed().await?;

        let summaries = self.store.conversation_summaries().await?;
        if summaries.len() < 2 {
            tracing::warn!(
                conversations = summaries.len(),
                "Not enough conversations to form clusters"
            );
            return Err(MasteryError::InsufficientData(summaries.len()));
        }

        let mut clusters = self.engine.cluster(&summaries, None)?;

        let mut fallback_labels = 0;
        for cluster in &mut clusters {
            if !self.label_cluster(cluster).await {
                fallback_labels += 1;
            }
        }

        let summary = RunSummary {
            total_conversations: summaries.len(),
            clusters_created: clusters.len(),
            messages_analyzed,
            fallback_labels,
        };

        self.store.replace_clusters(clusters).await?;
        self.store
            .record_run(ClusteringRunRecord::new(
                summary.total_conversations,
                summary.clusters_created,
            ))
            .await?;

        tracing::info!(
            conversations = summary.total_conversations,
            clusters = summary.clusters_created,
            fallback_labels = summary.fallback_labels,
            "Clustering run completed"
        );
        Ok(summary)
    }

    /// Analyze every unprocessed message. A failed analysis is logged and
    /// skipped; the message stays unprocessed and its conversation may be
    /// excluded from this run.
    async fn analyze_unprocessed(&self) -> Result<usize> {
        let pending = self.store.unprocessed_messages().await?;
        let mut analyzed = 0;

        for message in pending {
            match self.analyzer.analyze(self.oracle.as_ref(), &message.content).await {
                Ok(analysis) => {
                    let concepts = analysis
                        .concepts
                        .iter()
                        .map(|c| c.title.clone())
                        .collect();
                    self.store
                        .mark_processed(&message.id, concepts, analysis.embedding)
                        .await?;
                    analyzed += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        message_id = %message.id,
                        error = %e,
                        "Message analysis failed; conversation excluded from this run"
                    );
                }
            }
        }

        if analyzed > 0 {
            tracing::info!(analyzed, "Analyzed pending messages");
        }
        Ok(analyzed)
    }

    /// Label one cluster, falling back to the deterministic label on any
    /// oracle failure. Returns whether the oracle label was used.
    async fn label_cluster(&self, cluster: &mut Cluster) -> bool {
        let mut member_messages = Vec::with_capacity(cluster.conversation_ids.len());
        for conversation_id in &cluster.conversation_ids {
            match self.store.conversation_messages(conversation_id).await {
                Ok(messages) => member_messages.push(messages),
                Err(e) => {
                    tracing::warn!(%conversation_id, error = %e, "Could not fetch messages for sampling");
                }
            }
        }

        let samples = self.labeler.sample_messages(&member_messages);
        match self
            .labeler
            .label(self.oracle.as_ref(), cluster, &samples)
            .await
        {
            Ok(result) => {
                cluster.label = result.label;
                cluster.description = result.description;
                true
            }
            Err(e) => {
                tracing::warn!(cluster_id = %cluster.id, error = %e, "Labeling failed, using fallback");
                let fallback = ClusterLabeler::fallback_label(&cluster.key_concepts);
                cluster.label = fallback.label;
                cluster.description = fallback.description;
                false
            }
        }
    }

    /// Open a cluster as a course. Idempotent: re-opening an already
    /// materialized cluster returns the existing course, never a duplicate.
    pub async fn open_course(&self, cluster_id: &str) -> Result<Course> {
        if let Some(existing) = self.store.course_for_cluster(cluster_id).await? {
            return Ok(existing);
        }

        let cluster = self
            .store
            .cluster(cluster_id)
            .await?
            .ok_or_else(|| MasteryError::NotFound(format!("cluster {}", cluster_id)))?;

        let course = CourseBuilder::build_course(&cluster, None);
        self.store.upsert_course(course.clone()).await?;
        tracing::info!(cluster_id, course_id = %course.id, "Materialized course from cluster");
        Ok(course)
    }

    /// Ask the oracle for related topics and append the ones that survive
    /// dedup. An oracle failure leaves the course unchanged; it is logged,
    /// not surfaced.
    pub async fn generate_related_topics(&self, course_id: &str) -> Result<Course> {
        let mut course = self.require_course(course_id).await?;

        let existing: Vec<String> = course
            .concepts
            .iter()
            .map(|c| c.title.clone())
            .collect();
        let prompt = prompts::related_topics_prompt(&existing, &course.label, &course.description);

        let suggestions = match self.oracle.complete(&prompt).await {
            Ok(response) => parse_topic_suggestions(&response, RELATED_TOPIC_CAP),
            Err(e) => {
                tracing::warn!(course_id, error = %e, "Related-topic generation failed");
                Vec::new()
            }
        };

        if !suggestions.is_empty() {
            CourseBuilder::add_related_topics(&mut course, &suggestions);
            self.store.upsert_course(course.clone()).await?;
        }
        Ok(course)
    }

    /// Apply a concept selection to a course
    pub async fn update_selection(
        &self,
        course_id: &str,
        selected_titles: &HashSet<String>,
    ) -> Result<Course> {
        let mut course = self.require_course(course_id).await?;
        CourseBuilder::update_selection(&mut course, selected_titles);
        self.store.upsert_course(course.clone()).await?;
        Ok(course)
    }

    /// Set one concept's status directly. Accepts legacy statuses so older
    /// clients keep working.
    pub async fn update_concept_status(
        &self,
        course_id: &str,
        concept_title: &str,
        status: ConceptStatus,
    ) -> Result<Course> {
        let mut course = self.require_course(course_id).await?;
        let needle = crate::types::normalize_title(concept_title);
        let concept = course
            .concepts
            .iter_mut()
            .find(|c| crate::types::normalize_title(&c.title) == needle)
            .ok_or_else(|| {
                MasteryError::NotFound(format!("concept '{}' in course {}", concept_title, course_id))
            })?;
        concept.status = status;
        course.updated_at = chrono::Utc::now();
        self.store.upsert_course(course.clone()).await?;
        Ok(course)
    }

    /// Manual stage jump; the progression is linear but not gated
    pub async fn set_stage(&self, course_id: &str, stage: CourseStage) -> Result<Course> {
        let mut course = self.require_course(course_id).await?;
        course.stage = stage;
        course.updated_at = chrono::Utc::now();
        self.store.upsert_course(course.clone()).await?;
        Ok(course)
    }

    /// Rank other conversations by cosine similarity to the query
    /// conversation, keeping the top 10 at or above the threshold
    /// ([`DEFAULT_SIMILARITY_THRESHOLD`] unless the caller tightens it).
    pub async fn find_similar(
        &self,
        conversation_id: &str,
        threshold: f32,
    ) -> Result<Vec<SimilarConversation>> {
        let summaries = self.store.conversation_summaries().await?;
        let target = summaries
            .iter()
            .find(|s| s.id == conversation_id)
            .ok_or_else(|| MasteryError::NotFound(format!("conversation {}", conversation_id)))?
            .clone();

        let mut similar: Vec<SimilarConversation> = summaries
            .iter()
            .filter(|s| s.id != conversation_id)
            .map(|s| SimilarConversation {
                conversation_id: s.id.clone(),
                similarity: cosine_similarity(&target.embedding, &s.embedding),
                concepts: s.concepts.clone(),
            })
            .filter(|s| s.similarity >= threshold)
            .collect();

        similar.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        similar.truncate(SIMILAR_LIMIT);
        Ok(similar)
    }

    /// Store handle for callers that need direct reads (status reporting)
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    async fn require_course(&self, course_id: &str) -> Result<Course> {
        self.store
            .course(course_id)
            .await?
            .ok_or_else(|| MasteryError::NotFound(format!("course {}", course_id)))
    }
}
