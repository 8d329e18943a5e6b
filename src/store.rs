//! Persistence boundary
//!
//! The document store itself is out of scope; the pipeline talks to this
//! trait and nothing else. `MemoryStore` is the in-process implementation
//! used by tests and single-process embedders of the crate.

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::embedding::mean_embedding;
use crate::error::{MasteryError, Result};
use crate::types::{
    Cluster, ClusteringRunRecord, ConversationSummary, Course, MessageRecord,
};

/// Read/write access the clustering pipeline needs from the host system
#[async_trait]
pub trait Store: Send + Sync {
    /// Messages not yet analyzed for clustering
    async fn unprocessed_messages(&self) -> Result<Vec<MessageRecord>>;

    /// Count of messages not yet analyzed
    async fn unprocessed_count(&self) -> Result<usize>;

    /// Record a completed analysis for a message
    async fn mark_processed(
        &self,
        message_id: &str,
        concepts: Vec<String>,
        embedding: Vec<f32>,
    ) -> Result<()>;

    /// Clear all processed flags (operator control; forces re-analysis)
    async fn reset_processed_flags(&self) -> Result<()>;

    /// Aggregate summaries for conversations with at least one processed
    /// message, in stable first-seen order
    async fn conversation_summaries(&self) -> Result<Vec<ConversationSummary>>;

    /// Message contents for one conversation, oldest first
    async fn conversation_messages(&self, conversation_id: &str) -> Result<Vec<String>>;

    /// Replace the cluster generation with the output of a new run
    async fn replace_clusters(&self, clusters: Vec<Cluster>) -> Result<()>;

    /// All clusters from the latest run
    async fn clusters(&self) -> Result<Vec<Cluster>>;

    /// One cluster by id
    async fn cluster(&self, cluster_id: &str) -> Result<Option<Cluster>>;

    /// One course by id
    async fn course(&self, course_id: &str) -> Result<Option<Course>>;

    /// The course materialized from a cluster, if any
    async fn course_for_cluster(&self, cluster_id: &str) -> Result<Option<Course>>;

    /// All courses
    async fn courses(&self) -> Result<Vec<Course>>;

    /// Insert or update a course (keyed by course id)
    async fn upsert_course(&self, course: Course) -> Result<()>;

    /// Most recent clustering run, if any
    async fn latest_run(&self) -> Result<Option<ClusteringRunRecord>>;

    /// Append a clustering run record
    async fn record_run(&self, record: ClusteringRunRecord) -> Result<()>;
}

#[derive(Default)]
struct Inner {
    messages: Vec<MessageRecord>,
    clusters: Vec<Cluster>,
    courses: Vec<Course>,
    runs: Vec<ClusteringRunRecord>,
}

/// In-process store backed by a `RwLock`
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a message; the host persistence layer calls this and then
    /// `BackgroundScheduler::notify_message_added` with the conversation id.
    pub fn add_message(&self, message: MessageRecord) {
        self.inner.write().messages.push(message);
    }

    /// Number of stored messages (processed or not)
    pub fn message_count(&self) -> usize {
        self.inner.read().messages.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn unprocessed_messages(&self) -> Result<Vec<MessageRecord>> {
        Ok(self
            .inner
            .read()
            .messages
            .iter()
            .filter(|m| !m.processed)
            .cloned()
            .collect())
    }

    async fn unprocessed_count(&self) -> Result<usize> {
        Ok(self.inner.read().messages.iter().filter(|m| !m.processed).count())
    }

    async fn mark_processed(
        &self,
        message_id: &str,
        concepts: Vec<String>,
        embedding: Vec<f32>,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        let message = inner
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| MasteryError::NotFound(format!("message {}", message_id)))?;
        message.concepts = concepts;
        message.embedding = Some(embedding);
        message.processed = true;
        Ok(())
    }

    async fn reset_processed_flags(&self) -> Result<()> {
        let mut inner = self.inner.write();
        for message in inner.messages.iter_mut() {
            message.processed = false;
        }
        Ok(())
    }

    async fn conversation_summaries(&self) -> Result<Vec<ConversationSummary>> {
        let inner = self.inner.read();

        // First-seen conversation order keeps clustering runs deterministic
        let mut order: Vec<String> = Vec::new();
        for message in &inner.messages {
            if message.processed && !order.contains(&message.conversation_id) {
                order.push(message.conversation_id.clone());
            }
        }

        let mut summaries = Vec::with_capacity(order.len());
        for conversation_id in order {
            let mut embeddings = Vec::new();
            let mut concepts: Vec<String> = Vec::new();

            for message in inner
                .messages
                .iter()
                .filter(|m| m.processed && m.conversation_id == conversation_id)
            {
                if let Some(embedding) = &message.embedding {
                    embeddings.push(embedding.clone());
                }
                for concept in &message.concepts {
                    let seen = concepts
                        .iter()
                        .any(|c| c.to_lowercase() == concept.to_lowercase());
                    if !seen {
                        concepts.push(concept.clone());
                    }
                }
            }

            if let Some(embedding) = mean_embedding(&embeddings) {
                summaries.push(ConversationSummary {
                    id: conversation_id,
                    embedding,
                    concepts,
                });
            }
        }

        Ok(summaries)
    }

    async fn conversation_messages(&self, conversation_id: &str) -> Result<Vec<String>> {
        Ok(self
            .inner
            .read()
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .map(|m| m.content.clone())
            .collect())
    }

    async fn replace_clusters(&self, clusters: Vec<Cluster>) -> Result<()> {
        self.inner.write().clusters = clusters;
        Ok(())
    }

    async fn clusters(&self) -> Result<Vec<Cluster>> {
        Ok(self.inner.read().clusters.clone())
    }

    async fn cluster(&self, cluster_id: &str) -> Result<Option<Cluster>> {
        Ok(self
            .inner
            .read()
            .clusters
            .iter()
            .find(|c| c.id == cluster_id)
            .cloned())
    }

    async fn course(&self, course_id: &str) -> Result<Option<Course>> {
        Ok(self
            .inner
            .read()
            .courses
            .iter()
            .find(|c| c.id == course_id)
            .cloned())
    }

    async fn course_for_cluster(&self, cluster_id: &str) -> Result<Option<Course>> {
        Ok(self
            .inner
            .read()
            .courses
            .iter()
            .find(|c| c.source_cluster_id == cluster_id)
            .cloned())
    }

    async fn courses(&self) -> Result<Vec<Course>> {
        Ok(self.inner.read().courses.clone())
    }

    async fn upsert_course(&self, course: Course) -> Result<()> {
        let mut inner = self.inner.write();
        if let Some(existing) = inner.courses.iter_mut().find(|c| c.id == course.id) {
            *existing = course;
        } else {
            inner.courses.push(course);
        }
        Ok(())
    }

    async fn latest_run(&self) -> Result<Option<ClusteringRunRecord>> {
        Ok(self
            .inner
            .read()
            .runs
            .iter()
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn record_run(&self, record: ClusteringRunRecord) -> Result<()> {
        self.inner.write().runs.push(record);
        Ok(())
    }
}
