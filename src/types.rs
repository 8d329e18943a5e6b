//! Core types for Mastery

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;

/// Unique identifier for a conversation (opaque, storage-assigned)
pub type ConversationId = String;

/// A conversation reduced to what clustering needs: an aggregate embedding
/// (mean of its message embeddings) and the technical concepts discussed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Conversation identifier
    pub id: ConversationId,
    /// Aggregate embedding (element-wise mean of message embeddings)
    pub embedding: Vec<f32>,
    /// Unique concept titles from the conversation, in first-seen order
    #[serde(default)]
    pub concepts: Vec<String>,
}

/// A single chat message as seen by the analysis layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Message identifier
    pub id: String,
    /// Owning conversation
    pub conversation_id: ConversationId,
    /// Raw message content
    pub content: String,
    /// Concept titles extracted from this message
    #[serde(default)]
    pub concepts: Vec<String>,
    /// Message embedding, present once analyzed
    pub embedding: Option<Vec<f32>>,
    /// Whether the message has been analyzed for clustering
    #[serde(default)]
    pub processed: bool,
    /// When the message was created
    pub created_at: DateTime<Utc>,
}

/// A semantic cluster of conversations produced by one clustering run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    /// Stable id within a run: "cluster_0", "cluster_1", ...
    pub id: String,
    /// Short human label, e.g. "Database Design & Optimization"
    pub label: String,
    /// 1-3 sentence cluster summary
    pub description: String,
    /// Member conversations (non-empty, each belongs to exactly one cluster)
    pub conversation_ids: Vec<ConversationId>,
    /// Top technical concepts, frequency-ranked
    pub key_concepts: Vec<String>,
    /// Cluster center vector, same dimensionality as member embeddings
    pub centroid: Vec<f32>,
    /// When the cluster was created
    pub created_at: DateTime<Utc>,
}

impl Cluster {
    /// Number of conversations in this cluster
    pub fn conversation_count(&self) -> usize {
        self.conversation_ids.len()
    }
}

/// Difficulty classification for a learning concept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    #[default]
    Medium,
    Advanced,
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Difficulty::Beginner => write!(f, "beginner"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::Advanced => write!(f, "advanced"),
        }
    }
}

impl std::str::FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "beginner" => Ok(Difficulty::Beginner),
            "medium" => Ok(Difficulty::Medium),
            "advanced" => Ok(Difficulty::Advanced),
            _ => Err(format!("Unknown difficulty: {}", s)),
        }
    }
}

/// Where a concept came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConceptType {
    /// Extracted from the user's own clustered conversations
    #[default]
    Original,
    /// Suggested afterward by the oracle as an adjacent topic
    Related,
}

/// Learning status of a concept.
///
/// Only `NotStarted` and `Reviewing` are actively transitioned by the course
/// builder. The remaining named variants exist in older stored courses and
/// must round-trip; anything else deserializes to `Other` without failing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConceptStatus {
    #[default]
    NotStarted,
    Reviewing,
    /// Legacy: concept was reviewed to completion
    Reviewed,
    /// Legacy: user opted out of the concept
    NotInterested,
    /// Legacy: user already knew the concept
    AlreadyKnow,
    /// Forward-compatible catch-all for unrecognized stored values
    Other(String),
}

impl ConceptStatus {
    /// Canonical wire string for this status
    pub fn as_str(&self) -> &str {
        match self {
            ConceptStatus::NotStarted => "not_started",
            ConceptStatus::Reviewing => "reviewing",
            ConceptStatus::Reviewed => "reviewed",
            ConceptStatus::NotInterested => "not_interested",
            ConceptStatus::AlreadyKnow => "already_know",
            ConceptStatus::Other(s) => s,
        }
    }

    /// Whether the concept counts toward course progress
    pub fn is_started(&self) -> bool {
        !matches!(self, ConceptStatus::NotStarted)
    }

    /// Statuses beyond the two-state selection model are never regressed
    /// by selection updates.
    pub fn is_selectable(&self) -> bool {
        matches!(self, ConceptStatus::NotStarted | ConceptStatus::Reviewing)
    }
}

impl From<&str> for ConceptStatus {
    fn from(s: &str) -> Self {
        match s {
            "not_started" => ConceptStatus::NotStarted,
            "reviewing" => ConceptStatus::Reviewing,
            "reviewed" => ConceptStatus::Reviewed,
            "not_interested" => ConceptStatus::NotInterested,
            "already_know" => ConceptStatus::AlreadyKnow,
            other => ConceptStatus::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for ConceptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for ConceptStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ConceptStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(ConceptStatus::from(s.as_str()))
    }
}

/// A learning concept inside a course.
///
/// Titles are unique within a course by normalized comparison; each course
/// owns its concept list outright, copies are never shared across courses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    /// Display title (original casing preserved)
    pub title: String,
    /// Difficulty level, never absent
    #[serde(default)]
    pub difficulty: Difficulty,
    /// Original vs oracle-suggested
    #[serde(default, rename = "type")]
    pub concept_type: ConceptType,
    /// Learning status
    #[serde(default)]
    pub status: ConceptStatus,
}

impl Concept {
    /// Create a concept in its initial state
    pub fn new(title: impl Into<String>, difficulty: Difficulty, concept_type: ConceptType) -> Self {
        Self {
            title: title.into(),
            difficulty,
            concept_type,
            status: ConceptStatus::NotStarted,
        }
    }
}

/// Stage of the course learning flow.
///
/// The progression is linear but manual stage jumps are allowed; stages are
/// not sequentially gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CourseStage {
    #[default]
    Explore,
    Absorb,
    TeachBack,
}

impl std::fmt::Display for CourseStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CourseStage::Explore => write!(f, "explore"),
            CourseStage::Absorb => write!(f, "absorb"),
            CourseStage::TeachBack => write!(f, "teach_back"),
        }
    }
}

impl std::str::FromStr for CourseStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "explore" => Ok(CourseStage::Explore),
            "absorb" => Ok(CourseStage::Absorb),
            "teach_back" => Ok(CourseStage::TeachBack),
            _ => Err(format!("Unknown course stage: {}", s)),
        }
    }
}

/// A course materialized from a cluster for structured learning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    /// Course identifier
    pub id: String,
    /// Label copied from the source cluster
    pub label: String,
    /// Description copied from the source cluster
    pub description: String,
    /// Conversations the course was derived from
    pub conversation_ids: Vec<ConversationId>,
    /// Ordered concept list (unique by normalized title)
    pub concepts: Vec<Concept>,
    /// Source cluster; may become orphaned after re-clustering
    pub source_cluster_id: String,
    /// Current learning stage
    #[serde(default)]
    pub stage: CourseStage,
    /// When the course was created
    pub created_at: DateTime<Utc>,
    /// When the course was last mutated
    pub updated_at: DateTime<Utc>,
}

impl Course {
    /// Learning progress percentage, always derived, never stored.
    ///
    /// `round(100 * count(status != not_started) / total)`, 0 when empty.
    pub fn progress(&self) -> u32 {
        if self.concepts.is_empty() {
            return 0;
        }
        let started = self.concepts.iter().filter(|c| c.status.is_started()).count();
        ((started as f64 / self.concepts.len() as f64) * 100.0).round() as u32
    }

    /// Find a concept by normalized title
    pub fn concept_by_title(&self, title: &str) -> Option<&Concept> {
        let needle = normalize_title(title);
        self.concepts
            .iter()
            .find(|c| normalize_title(&c.title) == needle)
    }

    /// Concept titles in display order
    pub fn concept_titles(&self) -> Vec<&str> {
        self.concepts.iter().map(|c| c.title.as_str()).collect()
    }
}

/// Record of one clustering run, used for time-threshold triggering
/// and operator status reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringRunRecord {
    /// Run identifier
    pub run_id: String,
    /// Conversations that participated in the run
    pub total_conversations: usize,
    /// Non-empty clusters produced
    pub clusters_created: usize,
    /// When the run completed
    pub created_at: DateTime<Utc>,
}

impl ClusteringRunRecord {
    /// Create a record for a run that just completed
    pub fn new(total_conversations: usize, clusters_created: usize) -> Self {
        Self {
            run_id: format!("run_{}", uuid::Uuid::new_v4().simple()),
            total_conversations,
            clusters_created,
            created_at: Utc::now(),
        }
    }
}

/// Configuration for the clustering engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Ceiling on cluster count when k is chosen heuristically
    pub max_k: usize,
    /// Lloyd iteration cap; the partition at cap is returned, never an error
    pub max_iterations: usize,
    /// Representative concepts kept per cluster
    pub top_concepts: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            max_k: 8,
            max_iterations: 100,
            top_concepts: 5,
        }
    }
}

/// Configuration for cluster labeling
#[derive(Debug, Clone)]
pub struct LabelingConfig {
    /// Representative messages sent to the oracle per cluster
    pub sample_cap: usize,
    /// Wall-clock budget for the oracle call before falling back
    pub oracle_timeout: Duration,
}

impl Default for LabelingConfig {
    fn default() -> Self {
        Self {
            sample_cap: 8,
            oracle_timeout: Duration::from_secs(30),
        }
    }
}

/// Configuration for the background trigger policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Master switch for background clustering
    pub enabled: bool,
    /// Unprocessed-message count that triggers a run
    pub message_threshold: usize,
    /// Minutes since the last run that trigger a run
    pub time_threshold_minutes: f64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            message_threshold: 3,
            time_threshold_minutes: 30.0,
        }
    }
}

/// Inputs to the trigger policy, assembled from storage by the scheduler
#[derive(Debug, Clone)]
pub struct TriggerState {
    /// Messages not yet analyzed for clustering
    pub unprocessed_count: usize,
    /// Minutes since the last completed run; None when no run exists
    pub minutes_since_last_run: Option<f64>,
    /// Whether any clustering run has ever completed
    pub has_ever_run: bool,
}

/// Outcome of a trigger policy evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerDecision {
    /// Whether clustering should run now
    pub trigger: bool,
    /// Human-readable explanation for the operator surface
    pub reason: String,
}

impl TriggerDecision {
    pub fn yes(reason: impl Into<String>) -> Self {
        Self {
            trigger: true,
            reason: reason.into(),
        }
    }

    pub fn no(reason: impl Into<String>) -> Self {
        Self {
            trigger: false,
            reason: reason.into(),
        }
    }
}

/// Status report for the operator surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStatus {
    /// Whether background clustering is enabled
    pub enabled: bool,
    /// Whether a run is currently in flight
    pub run_in_progress: bool,
    /// Messages awaiting analysis
    pub unprocessed_messages: usize,
    /// Minutes since the last completed run, if any
    pub minutes_since_last_run: Option<f64>,
    /// Current trigger evaluation
    pub decision: TriggerDecision,
    /// Metadata for the most recent run, if any
    pub latest_run: Option<ClusteringRunRecord>,
}

/// Normalize a concept title for dedup comparison: trim, lowercase,
/// collapse internal whitespace. Display always keeps the original casing.
pub fn normalize_title(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("  SQL   Joins "), "sql joins");
        assert_eq!(normalize_title("Rust"), "rust");
        assert_eq!(normalize_title(""), "");
        // Idempotent
        let once = normalize_title("Error \t Handling");
        assert_eq!(normalize_title(&once), once);
    }

    #[test]
    fn test_concept_status_round_trip() {
        for s in ["not_started", "reviewing", "reviewed", "not_interested", "already_know"] {
            let status = ConceptStatus::from(s);
            assert_eq!(status.as_str(), s);
            let json = serde_json::to_string(&status).unwrap();
            let back: ConceptStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(back, status);
        }
    }

    #[test]
    fn test_concept_status_unknown_preserved() {
        let status: ConceptStatus = serde_json::from_str("\"paused\"").unwrap();
        assert_eq!(status, ConceptStatus::Other("paused".to_string()));
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"paused\"");
        // Unknown statuses still count as started and are not selectable
        assert!(status.is_started());
        assert!(!status.is_selectable());
    }

    #[test]
    fn test_progress_derivation() {
        let mut course = Course {
            id: "c1".into(),
            label: "Test".into(),
            description: "Test".into(),
            conversation_ids: vec![],
            concepts: vec![],
            source_cluster_id: "cluster_0".into(),
            stage: CourseStage::Explore,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(course.progress(), 0);

        for title in ["A", "B", "C", "D"] {
            course
                .concepts
                .push(Concept::new(title, Difficulty::Medium, ConceptType::Original));
        }
        assert_eq!(course.progress(), 0);

        course.concepts[0].status = ConceptStatus::Reviewing;
        assert_eq!(course.progress(), 25);

        course.concepts[1].status = ConceptStatus::AlreadyKnow;
        assert_eq!(course.progress(), 50);
    }

    #[test]
    fn test_course_stage_parse() {
        assert_eq!("teach_back".parse::<CourseStage>().unwrap(), CourseStage::TeachBack);
        assert!("graduate".parse::<CourseStage>().is_err());
        assert_eq!(
            serde_json::to_string(&CourseStage::TeachBack).unwrap(),
            "\"teach_back\""
        );
    }
}
