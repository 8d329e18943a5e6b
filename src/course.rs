//! Course derivation from clusters
//!
//! A course is the learnable form of a cluster: a typed, deduplicated
//! concept list with per-concept difficulty and status. All merge logic is
//! pure over typed collections; the pipeline owns persistence.

use chrono::Utc;
use std::collections::HashSet;

use crate::oracle::TopicSuggestion;
use crate::types::{
    normalize_title, Cluster, Concept, ConceptStatus, ConceptType, Course, CourseStage, Difficulty,
};

/// Builds and mutates courses derived from clusters
pub struct CourseBuilder;

impl CourseBuilder {
    /// Materialize a course from a cluster, or merge the cluster into an
    /// existing course.
    ///
    /// New course: stage explore, every key concept tagged original with a
    /// heuristic difficulty, status not_started. Merge: concepts matching an
    /// existing entry by normalized title are skipped outright, so existing
    /// statuses and progress are never overwritten; unmatched concepts are
    /// appended as not_started originals.
    pub fn build_course(cluster: &Cluster, existing: Option<Course>) -> Course {
        match existing {
            None => Course {
                id: uuid::Uuid::new_v4().to_string(),
                label: cluster.label.clone(),
                description: cluster.description.clone(),
                conversation_ids: cluster.conversation_ids.clone(),
                concepts: cluster
                    .key_concepts
                    .iter()
                    .map(|title| {
                        Concept::new(
                            title.clone(),
                            estimate_difficulty(title),
                            ConceptType::Original,
                        )
                    })
                    .collect(),
                source_cluster_id: cluster.id.clone(),
                stage: CourseStage::Explore,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            Some(mut course) => {
                let known: HashSet<String> = course
                    .concepts
                    .iter()
                    .map(|c| normalize_title(&c.title))
                    .collect();

                for title in &cluster.key_concepts {
                    if known.contains(&normalize_title(title)) {
                        continue;
                    }
                    course.concepts.push(Concept::new(
                        title.clone(),
                        estimate_difficulty(title),
                        ConceptType::Original,
                    ));
                }

                course.conversation_ids = cluster.conversation_ids.clone();
                course.updated_at = Utc::now();
                course
            }
        }
    }

    /// Append oracle-suggested related topics. A suggestion matching any
    /// existing concept by normalized title is dropped entirely; original
    /// entries always win ties and are never merged or promoted.
    pub fn add_related_topics(course: &mut Course, suggestions: &[TopicSuggestion]) {
        let mut known: HashSet<String> = course
            .concepts
            .iter()
            .map(|c| normalize_title(&c.title))
            .collect();

        for suggestion in suggestions {
            let key = normalize_title(&suggestion.title);
            if known.contains(&key) {
                continue;
            }
            known.insert(key);
            course.concepts.push(Concept::new(
                suggestion.title.clone(),
                suggestion.difficulty,
                ConceptType::Related,
            ));
        }

        course.updated_at = Utc::now();
    }

    /// Apply a selection of concept titles: selected concepts move to
    /// reviewing, unselected concepts currently reviewing move back to
    /// not_started. Concepts in legacy or unknown statuses are untouched;
    /// selection never regresses a concept out of a completed state.
    pub fn update_selection(course: &mut Course, selected_titles: &HashSet<String>) {
        let selected: HashSet<String> =
            selected_titles.iter().map(|t| normalize_title(t)).collect();

        for concept in &mut course.concepts {
            if !concept.status.is_selectable() {
                continue;
            }
            if selected.contains(&normalize_title(&concept.title)) {
                concept.status = ConceptStatus::Reviewing;
            } else if concept.status == ConceptStatus::Reviewing {
                concept.status = ConceptStatus::NotStarted;
            }
        }

        course.updated_at = Utc::now();
    }
}

/// Heuristic difficulty for a raw concept title. Word choice and title
/// length are a weak signal; the oracle overrides this when it assigns a
/// difficulty itself. Always returns one of the three enum values.
pub fn estimate_difficulty(title: &str) -> Difficulty {
    const ADVANCED_MARKERS: &[&str] = &[
        "optimization",
        "optimisation",
        "architecture",
        "distributed",
        "concurrency",
        "internals",
        "tuning",
        "scaling",
        "advanced",
        "security",
    ];
    const BEGINNER_MARKERS: &[&str] = &[
        "basics",
        "basic",
        "introduction",
        "intro",
        "fundamentals",
        "getting",
        "beginner",
        "overview",
    ];

    let lowered = title.to_lowercase();
    let words: Vec<&str> = lowered.split_whitespace().collect();

    if words.iter().any(|w| ADVANCED_MARKERS.contains(w)) {
        return Difficulty::Advanced;
    }
    if words.iter().any(|w| BEGINNER_MARKERS.contains(w)) {
        return Difficulty::Beginner;
    }
    Difficulty::Medium
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_cluster(concepts: &[&str]) -> Cluster {
        Cluster {
            id: "cluster_0".to_string(),
            label: "Database Design".to_string(),
            description: "Indexing and query planning.".to_string(),
            conversation_ids: vec!["a".into(), "b".into()],
            key_concepts: concepts.iter().map(|s| s.to_string()).collect(),
            centroid: vec![1.0, 0.0],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_build_new_course() {
        let cluster = test_cluster(&["SQL Joins", "Indexing Basics"]);
        let course = CourseBuilder::build_course(&cluster, None);

        assert_eq!(course.label, "Database Design");
        assert_eq!(course.stage, CourseStage::Explore);
        assert_eq!(course.source_cluster_id, "cluster_0");
        assert_eq!(course.progress(), 0);
        assert_eq!(course.concept_titles(), vec!["SQL Joins", "Indexing Basics"]);
        assert!(course
            .concepts
            .iter()
            .all(|c| c.concept_type == ConceptType::Original
                && c.status == ConceptStatus::NotStarted));
        assert_eq!(course.concepts[1].difficulty, Difficulty::Beginner);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let cluster = test_cluster(&["SQL Joins", "Indexing"]);
        let first = CourseBuilder::build_course(&cluster, None);
        let merged = CourseBuilder::build_course(&cluster, Some(first.clone()));

        assert_eq!(merged.concept_titles(), first.concept_titles());
    }

    #[test]
    fn test_merge_never_downgrades_status() {
        let cluster = test_cluster(&["SQL Joins"]);
        let mut course = CourseBuilder::build_course(&cluster, None);
        course.concepts[0].status = ConceptStatus::Reviewing;

        // Re-suggest the same title with different casing
        let recluster = test_cluster(&["sql joins", "New Topic"]);
        let merged = CourseBuilder::build_course(&recluster, Some(course));

        assert_eq!(merged.concepts[0].title, "SQL Joins");
        assert_eq!(merged.concepts[0].status, ConceptStatus::Reviewing);
        assert_eq!(merged.concepts[1].title, "New Topic");
        assert_eq!(merged.concepts[1].status, ConceptStatus::NotStarted);
    }

    #[test]
    fn test_related_topic_matching_original_is_dropped() {
        let cluster = test_cluster(&["SQL Joins"]);
        let mut course = CourseBuilder::build_course(&cluster, None);

        CourseBuilder::add_related_topics(
            &mut course,
            &[
                TopicSuggestion {
                    title: "sql joins".to_string(),
                    difficulty: Difficulty::Medium,
                },
                TopicSuggestion {
                    title: "Window Functions".to_string(),
                    difficulty: Difficulty::Advanced,
                },
            ],
        );

        assert_eq!(course.concepts.len(), 2);
        assert_eq!(course.concepts[0].title, "SQL Joins");
        assert_eq!(course.concepts[0].concept_type, ConceptType::Original);
        assert_eq!(course.concepts[1].title, "Window Functions");
        assert_eq!(course.concepts[1].concept_type, ConceptType::Related);
    }

    #[test]
    fn test_related_topics_dedup_within_batch() {
        let cluster = test_cluster(&[]);
        let mut course = CourseBuilder::build_course(&cluster, None);

        CourseBuilder::add_related_topics(
            &mut course,
            &[
                TopicSuggestion {
                    title: "Sharding".to_string(),
                    difficulty: Difficulty::Advanced,
                },
                TopicSuggestion {
                    title: "  sharding ".to_string(),
                    difficulty: Difficulty::Medium,
                },
            ],
        );

        assert_eq!(course.concepts.len(), 1);
        assert_eq!(course.concepts[0].title, "Sharding");
    }

    #[test]
    fn test_update_selection_toggles_two_states() {
        let cluster = test_cluster(&["A", "B", "C"]);
        let mut course = CourseBuilder::build_course(&cluster, None);

        let both: HashSet<String> = ["A".to_string(), "B".to_string()].into();
        CourseBuilder::update_selection(&mut course, &both);
        assert_eq!(course.concepts[0].status, ConceptStatus::Reviewing);
        assert_eq!(course.concepts[1].status, ConceptStatus::Reviewing);
        assert_eq!(course.concepts[2].status, ConceptStatus::NotStarted);

        let only_a: HashSet<String> = ["A".to_string()].into();
        CourseBuilder::update_selection(&mut course, &only_a);
        assert_eq!(course.concepts[0].status, ConceptStatus::Reviewing);
        assert_eq!(course.concepts[1].status, ConceptStatus::NotStarted);
    }

    #[test]
    fn test_update_selection_leaves_completed_states() {
        let cluster = test_cluster(&["A", "B"]);
        let mut course = CourseBuilder::build_course(&cluster, None);
        course.concepts[1].status = ConceptStatus::AlreadyKnow;

        // Deselecting everything must not regress the completed concept
        CourseBuilder::update_selection(&mut course, &HashSet::new());
        assert_eq!(course.concepts[0].status, ConceptStatus::NotStarted);
        assert_eq!(course.concepts[1].status, ConceptStatus::AlreadyKnow);

        // Selecting it must not pull it back into reviewing either
        let select_b: HashSet<String> = ["B".to_string()].into();
        CourseBuilder::update_selection(&mut course, &select_b);
        assert_eq!(course.concepts[1].status, ConceptStatus::AlreadyKnow);
    }

    #[test]
    fn test_progress_after_selection() {
        let cluster = test_cluster(&["A", "B", "C", "D"]);
        let mut course = CourseBuilder::build_course(&cluster, None);

        let one: HashSet<String> = ["A".to_string()].into();
        CourseBuilder::update_selection(&mut course, &one);
        assert_eq!(course.progress(), 25);
    }

    #[test]
    fn test_estimate_difficulty() {
        assert_eq!(estimate_difficulty("Query Optimization"), Difficulty::Advanced);
        assert_eq!(estimate_difficulty("Git Basics"), Difficulty::Beginner);
        assert_eq!(estimate_difficulty("REST API Design"), Difficulty::Medium);
    }
}
