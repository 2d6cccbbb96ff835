// ── Engram: end-to-end scenarios ───────────────────────────────────────────
//
// Drives the public `MemorySubsystem` API over an in-memory SQLite store
// wrapped in the fault-injecting simulator, with the offline hashing
// embedder. No network, no files.

use chrono::{Duration, Utc};
use std::sync::Arc;

use engram_memory::{
    ContextSnapshot, EmbeddingClient, EngineError, GraphStore, HashEmbedder, HealthStatus,
    MatchedStrategy, MemoryConfig, MemorySubsystem, MemoryType, NewMemory, RecordState,
    RetrievalFilters, RetrievalRequest, RetrievalStrategy, SimGraphStore, SqliteGraphStore,
};

struct Harness {
    subsystem: MemorySubsystem,
    sim: Arc<SimGraphStore>,
}

fn harness_with(embedder: EmbeddingClient) -> Harness {
    let inner: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::open_in_memory().unwrap());
    let sim = Arc::new(SimGraphStore::new(inner));
    let store: Arc<dyn GraphStore> = sim.clone();
    let subsystem = MemorySubsystem::new(MemoryConfig::offline(), store, embedder).unwrap();
    Harness { subsystem, sim }
}

fn harness() -> Harness {
    harness_with(EmbeddingClient::new(
        Arc::new(HashEmbedder::default()),
        std::time::Duration::from_secs(2),
    ))
}

async fn put(h: &Harness, content: &str, owner: &str) -> String {
    h.subsystem
        .store(NewMemory::new(content, MemoryType::Interaction, owner))
        .await
        .unwrap()
}

#[tokio::test]
async fn importance_always_within_unit_interval() {
    let h = harness();
    let long = "very long repeated sentence about nothing in particular ".repeat(200);
    let contents = [
        "ok",
        "URGENT!!! The production database is DOWN and customers cannot log in, fix it NOW!!!",
        "Remember: my daughter's birthday is on March 3rd, she loves dinosaurs and pancakes.",
        "lunch",
        long.as_str(),
    ];
    for c in contents {
        put(&h, c, "o1").await;
    }
    for r in h.subsystem.audit_list("o1", 0).await.unwrap() {
        assert!((0.0..=1.0).contains(&r.importance_score), "{}", r.importance_score);
        assert!((0.0..=1.0).contains(&r.significance_score), "{}", r.significance_score);
    }
}

#[tokio::test]
async fn record_without_embedding_is_found_by_keyword() {
    let h = harness_with(EmbeddingClient::disabled());
    let id = put(&h, "The spare key is under the blue flowerpot", "o1").await;

    let record = h.subsystem.audit_record(&id).await.unwrap().record.unwrap();
    assert!(!record.has_embedding());

    let results = h
        .subsystem
        .retrieve(RetrievalRequest::new("flowerpot key", "o1").strategy(RetrievalStrategy::Keyword))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].memory_id, id);
}

#[tokio::test]
async fn semantic_falls_back_to_keyword_without_vectors() {
    let h = harness();
    let id = put(&h, "quarterly budget review with finance", "o1").await;
    h.sim.set_vector_index_missing(true);

    let results = h
        .subsystem
        .retrieve(RetrievalRequest::new("budget review", "o1").strategy(RetrievalStrategy::Semantic))
        .await
        .unwrap();
    assert_eq!(results[0].memory_id, id);
    assert!(results.iter().all(|r| r.matched_strategy == MatchedStrategy::FallbackKeyword));
    assert_eq!(h.subsystem.metrics().fallback_keyword, 1);
}

#[tokio::test]
async fn build_context_is_deterministic() {
    let h = harness();
    for c in [
        "standup moved to 10am on tuesdays",
        "the standup notes live in the team wiki",
        "bring snacks to the friday standup",
    ] {
        put(&h, c, "o1").await;
    }
    let first = h.subsystem.build_context("standup", "o1", None, 60).await.unwrap();
    let second = h.subsystem.build_context("standup", "o1", None, 60).await.unwrap();
    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
    assert_eq!(first.render(), second.render());
    assert!(first.header.tokens_used <= 60);
}

#[tokio::test]
async fn decay_never_raises_unaccessed_importance() {
    let h = harness();
    let id = put(&h, "note about an old offsite", "o1").await;
    let start = h.subsystem.audit_record(&id).await.unwrap().record.unwrap().importance_score;

    let mut last = start;
    let now = Utc::now();
    for day in 8..20 {
        h.subsystem.lifecycle().run_decay_cycle_at(now + Duration::days(day)).await.unwrap();
        let current = h.subsystem.audit_record(&id).await.unwrap().record.unwrap().importance_score;
        assert!(current <= last && current >= 0.0);
        last = current;
    }
    assert!(last < start);
}

#[tokio::test]
async fn matching_context_ranks_first() {
    let h = harness();
    let curious = h
        .subsystem
        .store(
            NewMemory::new("reading about the project roadmap", MemoryType::Interaction, "o1")
                .context(ContextSnapshot::new(0.8, "curious")),
        )
        .await
        .unwrap();
    let bored = h
        .subsystem
        .store(
            NewMemory::new("skimming over the project roadmap", MemoryType::Interaction, "o1")
                .context(ContextSnapshot::new(0.2, "bored")),
        )
        .await
        .unwrap();

    let as_curious = h
        .subsystem
        .retrieve(
            RetrievalRequest::new("project roadmap", "o1")
                .strategy(RetrievalStrategy::Keyword)
                .context(ContextSnapshot::new(0.8, "curious")),
        )
        .await
        .unwrap();
    assert_eq!(as_curious[0].memory_id, curious);

    let as_bored = h
        .subsystem
        .retrieve(
            RetrievalRequest::new("project roadmap", "o1")
                .strategy(RetrievalStrategy::Keyword)
                .context(ContextSnapshot::new(0.2, "bored")),
        )
        .await
        .unwrap();
    assert_eq!(as_bored[0].memory_id, bored);
}

#[tokio::test]
async fn near_duplicates_consolidate_and_stay_auditable() {
    let h = harness();
    let mut originals = Vec::new();
    for _ in 0..3 {
        originals.push(put(&h, "Met Dana at the corner cafe to plan the launch", "o1").await);
    }
    put(&h, "Dentist appointment on the ninth", "o1").await;

    let report = h.subsystem.run_consolidation_cycle().await.unwrap();
    assert_eq!(report.consolidated, 1);
    assert_eq!(report.archived_originals, 3);

    let results = h
        .subsystem
        .retrieve(RetrievalRequest::new("cafe launch", "o1").strategy(RetrievalStrategy::Keyword))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].memory_type, MemoryType::Consolidated);
    assert!(originals.iter().all(|id| id != &results[0].memory_id));

    let merged = h.subsystem.audit_record(&results[0].memory_id).await.unwrap().record.unwrap();
    let mut from = merged.metadata.consolidated_from.clone();
    from.sort();
    let mut expected = originals.clone();
    expected.sort();
    assert_eq!(from, expected);

    for id in &originals {
        let audit = h.subsystem.audit_record(id).await.unwrap();
        let record = audit.record.unwrap();
        assert_eq!(record.state, RecordState::Archived);
        assert_eq!(record.metadata.consolidated_into.as_deref(), Some(merged.memory_id.as_str()));
        assert!(!audit.trail.is_empty());
    }

    // A second run finds nothing new to merge.
    let again = h.subsystem.run_consolidation_cycle().await.unwrap();
    assert_eq!(again.consolidated, 0);
}

#[tokio::test]
async fn keyword_min_score_and_limit() {
    let h = harness();
    put(&h, "alpha beta", "o1").await;
    put(&h, "alpha beta gamma delta", "o1").await;
    put(&h, "alpha gamma", "o1").await;
    put(&h, "unrelated words entirely", "o1").await;
    put(&h, "alpha beta", "o2").await;

    let results = h
        .subsystem
        .retrieve(
            RetrievalRequest::new("alpha beta", "o1")
                .strategy(RetrievalStrategy::Keyword)
                .limit(5)
                .min_score(0.9),
        )
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0].score >= results[1].score);
    assert!(results.iter().all(|r| r.score >= 0.9));
}

#[tokio::test]
async fn access_stats_follow_retrieval() {
    let h = harness();
    let id = put(&h, "wifi password is hunter2", "o1").await;
    for _ in 0..3 {
        h.subsystem
            .retrieve(RetrievalRequest::new("wifi password", "o1").strategy(RetrievalStrategy::Keyword))
            .await
            .unwrap();
    }
    h.subsystem.settle_access_updates().await;
    let record = h.subsystem.audit_record(&id).await.unwrap().record.unwrap();
    assert_eq!(record.access_frequency, 3);
    assert!(record.last_accessed_at.is_some());
}

#[tokio::test]
async fn store_outage_surfaces_typed_errors() {
    let h = harness();
    put(&h, "something to find later", "o1").await;
    h.sim.set_unavailable(true);

    let err = h
        .subsystem
        .retrieve(RetrievalRequest::new("something", "o1").strategy(RetrievalStrategy::Keyword))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RetrievalUnavailable(_)), "{err:?}");

    let err = h
        .subsystem
        .store(NewMemory::new("lost write", MemoryType::Interaction, "o1"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::StorageUnavailable(_)), "{err:?}");

    let health = h.subsystem.health_check().await;
    assert_eq!(health.status, HealthStatus::Down);

    h.sim.set_unavailable(false);
    assert!(h
        .subsystem
        .retrieve(RetrievalRequest::new("something", "o1").strategy(RetrievalStrategy::Keyword))
        .await
        .is_ok());
}

#[tokio::test]
async fn archival_hides_stale_records_but_keeps_audit_trail() {
    let h = harness();
    let id = put(&h, "an errand nobody ever asked about again", "o1").await;

    // Idle long enough for decay to push importance under the floor.
    let start = Utc::now();
    for week in 1..=200 {
        h.subsystem.lifecycle().run_decay_cycle_at(start + Duration::weeks(week)).await.unwrap();
    }
    let report = h
        .subsystem
        .lifecycle()
        .run_archival_cycle_at(start + Duration::weeks(201))
        .await
        .unwrap();
    assert_eq!(report.archived, 1);

    let hits = h
        .subsystem
        .retrieve(RetrievalRequest::new("errand", "o1").strategy(RetrievalStrategy::Keyword))
        .await
        .unwrap();
    assert!(hits.is_empty());
    let audit = h.subsystem.audit_record(&id).await.unwrap();
    assert_eq!(audit.record.unwrap().state, RecordState::Archived);
}

#[tokio::test]
async fn type_filter_is_not_starved_by_other_types() {
    let h = harness();
    for i in 0..60 {
        put(&h, &format!("alpha status update {i}"), "o1").await;
    }
    let reflection = h
        .subsystem
        .store(NewMemory::new("alpha looking back on the sprint", MemoryType::Reflection, "o1"))
        .await
        .unwrap();

    let results = h
        .subsystem
        .retrieve(
            RetrievalRequest::new("alpha", "o1")
                .strategy(RetrievalStrategy::Keyword)
                .filters(RetrievalFilters::default().with_types([MemoryType::Reflection])),
        )
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].memory_id, reflection);
}

#[tokio::test]
async fn busy_connection_cannot_outlast_deadlines() {
    let sqlite = Arc::new(SqliteGraphStore::open_in_memory().unwrap());
    let store: Arc<dyn GraphStore> = sqlite.clone();
    let mut config = MemoryConfig::offline();
    config.monitor.soft_timeout_ms = 20;
    config.monitor.hard_timeout_ms = 50;
    let subsystem = MemorySubsystem::new(config, store, EmbeddingClient::disabled()).unwrap();
    subsystem
        .store(NewMemory::new("notes kept behind a busy connection", MemoryType::Interaction, "o1"))
        .await
        .unwrap();

    let conn = Arc::clone(&sqlite.conn);
    let (locked_tx, locked_rx) = std::sync::mpsc::channel();
    let holder = std::thread::spawn(move || {
        let _guard = conn.lock();
        locked_tx.send(()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(800));
    });
    locked_rx.recv().unwrap();

    let started = std::time::Instant::now();
    let err = subsystem
        .retrieve(
            RetrievalRequest::new("busy connection", "o1")
                .strategy(RetrievalStrategy::Keyword)
                .timeout(std::time::Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Timeout { .. }), "{err:?}");
    assert!(started.elapsed() < std::time::Duration::from_millis(500));

    let health = subsystem.health_check().await;
    assert_eq!(health.component("graph_store").map(|c| c.status), Some(HealthStatus::Down));

    holder.join().unwrap();
    let results = subsystem
        .retrieve(RetrievalRequest::new("busy connection", "o1").strategy(RetrievalStrategy::Keyword))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
}
