//! End-to-end tests over the public crate surface
//!
//! These drive the full flow a host application sees: raw messages in,
//! analyzed and clustered, a course opened from a cluster, topics and
//! selection applied on top.
//!
//! Run with: cargo test --test pipeline_tests

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mastery::embedding::HashEmbedder;
use mastery::oracle::testing::MockOracle;
use mastery::{
    BackgroundScheduler, ClusteringPipeline, ConceptStatus, ConceptType, CourseStage,
    MasteryError, MemoryStore, MessageRecord, Store,
};

fn message(id: &str, conversation: &str, content: &str) -> MessageRecord {
    MessageRecord {
        id: id.to_string(),
        conversation_id: conversation.to_string(),
        content: content.to_string(),
        concepts: vec![],
        embedding: None,
        processed: false,
        created_at: Utc::now(),
    }
}

fn extraction(title: &str) -> String {
    format!(
        r#"{{"concepts": [{{"title": "{}", "summary": "Discussion of {}."}}]}}"#,
        title, title
    )
}

/// Four unanalyzed conversations plus the oracle script for one full run:
/// four concept extractions, one cluster label, then a related-topics array
/// for any later call.
fn scripted_setup() -> (Arc<MemoryStore>, Arc<ClusteringPipeline>) {
    let store = Arc::new(MemoryStore::new());
    store.add_message(message("m1", "a", "how do left joins work?"));
    store.add_message(message("m2", "b", "speeding up this query"));
    store.add_message(message("m3", "c", "useEffect runs twice"));
    store.add_message(message("m4", "d", "lifting state up in React"));

    let oracle = MockOracle::sequence(vec![
        extraction("SQL Joins"),
        extraction("Query Optimization"),
        extraction("React Hooks"),
        extraction("React State"),
        r#"{"title": "Full-Stack Foundations", "description": "Database and React work."}"#
            .to_string(),
        r#"[{"title": "Connection Pooling", "difficulty_level": "advanced"},
            {"title": "sql joins", "difficulty_level": "medium"}]"#
            .to_string(),
    ]);

    let pipeline = Arc::new(ClusteringPipeline::new(
        store.clone(),
        Arc::new(oracle),
        Arc::new(HashEmbedder::new(64)),
    ));
    (store, pipeline)
}

#[tokio::test]
async fn test_messages_to_course_flow() {
    let (store, pipeline) = scripted_setup();

    let summary = pipeline.run().await.unwrap();
    assert_eq!(summary.messages_analyzed, 4);
    assert_eq!(summary.total_conversations, 4);
    // Four conversations resolve to a single cluster under the k heuristic
    assert_eq!(summary.clusters_created, 1);
    assert_eq!(summary.fallback_labels, 0);
    assert_eq!(store.unprocessed_count().await.unwrap(), 0);

    let clusters = store.clusters().await.unwrap();
    assert_eq!(clusters.len(), 1);
    let cluster = &clusters[0];
    assert_eq!(cluster.label, "Full-Stack Foundations");
    let mut ids = cluster.conversation_ids.clone();
    ids.sort();
    assert_eq!(ids, vec!["a", "b", "c", "d"]);
    assert!(cluster.key_concepts.contains(&"SQL Joins".to_string()));

    // Materialize the course and enrich it
    let course = pipeline.open_course(&cluster.id).await.unwrap();
    assert_eq!(course.stage, CourseStage::Explore);
    assert_eq!(course.progress(), 0);
    let original_count = course.concepts.len();
    assert!(course
        .concepts
        .iter()
        .all(|c| c.concept_type == ConceptType::Original));

    let enriched = pipeline.generate_related_topics(&course.id).await.unwrap();
    // "sql joins" collides with an original and is dropped
    assert_eq!(enriched.concepts.len(), original_count + 1);
    let related = enriched.concepts.last().unwrap();
    assert_eq!(related.title, "Connection Pooling");
    assert_eq!(related.concept_type, ConceptType::Related);

    // Select one concept and verify progress moves
    let selected: HashSet<String> = [enriched.concepts[0].title.clone()].into();
    let updated = pipeline.update_selection(&course.id, &selected).await.unwrap();
    assert_eq!(updated.concepts[0].status, ConceptStatus::Reviewing);
    assert!(updated.progress() > 0);
}

#[tokio::test]
async fn test_reclustering_preserves_course_state() {
    let (store, pipeline) = scripted_setup();
    pipeline.run().await.unwrap();
    let course = pipeline.open_course("cluster_0").await.unwrap();

    let selected: HashSet<String> = [course.concepts[0].title.clone()].into();
    pipeline.update_selection(&course.id, &selected).await.unwrap();

    // A second run replaces the cluster generation but leaves courses alone
    pipeline.run().await.unwrap();
    let after = store.course(&course.id).await.unwrap().unwrap();
    assert_eq!(after.concepts[0].status, ConceptStatus::Reviewing);

    // Re-opening the same cluster id still resolves to the same course
    let reopened = pipeline.open_course("cluster_0").await.unwrap();
    assert_eq!(reopened.id, course.id);
}

#[tokio::test]
async fn test_run_survives_total_oracle_outage() {
    let store = Arc::new(MemoryStore::new());
    // Conversations already analyzed in an earlier, healthier run
    for (id, conv, embedding) in [
        ("m1", "a", vec![1.0f32, 0.0]),
        ("m2", "b", vec![0.9, 0.1]),
        ("m3", "c", vec![0.0, 1.0]),
    ] {
        store.add_message(message(id, conv, "older message"));
        store
            .mark_processed(id, vec!["Distributed Caching".into()], embedding)
            .await
            .unwrap();
    }
    // And one new message that analysis will fail on
    store.add_message(message("m4", "d", "new message"));

    let pipeline = ClusteringPipeline::new(
        store.clone(),
        Arc::new(MockOracle::failing("service unavailable")),
        Arc::new(HashEmbedder::new(2)),
    );

    let summary = pipeline.run().await.unwrap();
    assert_eq!(summary.messages_analyzed, 0);
    assert_eq!(summary.total_conversations, 3);
    // Every cluster got the deterministic fallback label
    assert_eq!(summary.fallback_labels, summary.clusters_created);
    for cluster in store.clusters().await.unwrap() {
        assert!(cluster.label.contains("Distributed Caching"));
    }
    // The unanalyzed message is still waiting for the next run
    assert_eq!(store.unprocessed_count().await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_scheduler_single_flight_over_public_api() {
    let store = Arc::new(MemoryStore::new());
    for (id, conv, embedding) in [
        ("m1", "a", vec![1.0f32, 0.0]),
        ("m2", "b", vec![0.0, 1.0]),
    ] {
        store.add_message(message(id, conv, "content"));
        store
            .mark_processed(id, vec!["Topic".into()], embedding)
            .await
            .unwrap();
    }

    let pipeline = Arc::new(ClusteringPipeline::new(
        store,
        Arc::new(MockOracle::delayed(
            r#"{"title": "Slow", "description": "Slow."}"#,
            Duration::from_millis(300),
        )),
        Arc::new(HashEmbedder::new(2)),
    ));
    let scheduler = Arc::new(BackgroundScheduler::new(pipeline));

    let background = Arc::clone(&scheduler);
    let first = tokio::spawn(async move { background.force_run().await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(matches!(
        scheduler.force_run().await,
        Err(MasteryError::ConcurrentRunRejected)
    ));
    first.await.unwrap().unwrap();

    let status = scheduler.status().await.unwrap();
    assert!(!status.run_in_progress);
    assert!(status.latest_run.is_some());
}
