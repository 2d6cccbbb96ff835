// ── Engram: Consolidation ──────────────────────────────────────────────────
//
// Merges near-duplicate memories into one `consolidated` record.
//
// Per cycle:
//   1. Repair: originals of an existing consolidated record that are still
//      active (cycle interrupted after the insert) are archived now.
//   2. Candidates: active, embedded, non-consolidated records, per owner,
//      read in created_at pages of `batch_size`.
//   3. Union-find over pairs with cosine ≥ threshold and created within
//      the window of each other; components of ≥ 2 are clusters. A
//      component is final once all its members are older than the newest
//      record read minus the window: later pages cannot reach it. Final
//      clusters merge right away, final singletons are dropped, the rest
//      carry over into the next page.
//   4. Per cluster: insert the consolidated record, link the union of
//      concepts, then archive each original (consolidated_into set,
//      access_frequency reset).
//
// The insert happens before any original is archived, so an interruption
// can leave duplicates visible for one cycle but never loses a memory.

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::atoms::constants::MIN_CONSOLIDATION_CLUSTER;
use crate::atoms::error::EngineResult;
use crate::atoms::types::{
    AuditOperation, MemoryMetadata, MemoryRecord, MemoryType, RecordScan, RecordState,
    RecordUpdate,
};
use crate::engine::store::bounded;
use crate::engine::store::vector::{centroid, cosine_similarity};

use super::{LifecycleManager, WriteOutcome};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConsolidationReport {
    pub candidates: usize,
    pub clusters: usize,
    /// New consolidated records written.
    pub consolidated: usize,
    /// Originals archived into a consolidated record this cycle.
    pub archived_originals: usize,
    /// Originals archived by the repair pass.
    pub repaired: usize,
    pub skipped: usize,
    pub duration_ms: u64,
}

pub(crate) async fn run(
    manager: &LifecycleManager,
    now: DateTime<Utc>,
) -> EngineResult<ConsolidationReport> {
    let mut report = ConsolidationReport { repaired: repair(manager, now).await?, ..Default::default() };

    let scan = RecordScan {
        memory_types: vec![MemoryType::Interaction, MemoryType::Reflection, MemoryType::System],
        with_embedding: Some(true),
        ..RecordScan::active()
    };
    let threshold = manager.config().consolidation_threshold;
    let window = Duration::seconds(manager.config().consolidation_window_secs);

    let mut open: BTreeMap<String, Vec<MemoryRecord>> = BTreeMap::new();
    let mut pages = manager.pages(scan);
    while let Some(page) = pages.next(manager).await? {
        report.candidates += page.len();
        let Some(newest) = page.last().map(|r| r.created_at) else {
            continue;
        };
        for r in page {
            open.entry(r.owner_id.clone()).or_default().push(r);
        }

        let horizon = newest - window;
        for records in open.values_mut() {
            let (ready, carry) = settle(std::mem::take(records), horizon, threshold, window);
            *records = carry;
            for cluster in ready {
                report.clusters += 1;
                merge_cluster(manager, cluster, now, &mut report).await?;
            }
        }
        open.retain(|_, records| !records.is_empty());
        tokio::task::yield_now().await;
    }

    for records in open.into_values() {
        for cluster in build_clusters(&records, threshold, window) {
            report.clusters += 1;
            merge_cluster(manager, cluster, now, &mut report).await?;
        }
        tokio::task::yield_now().await;
    }

    info!(
        "[engram:lifecycle] Consolidation: candidates={} clusters={} merged={} archived={} repaired={}",
        report.candidates, report.clusters, report.consolidated, report.archived_originals, report.repaired
    );
    Ok(report)
}

// ═══════════════════════════════════════════════════════════════════════════
// Clustering (union-find)
// ═══════════════════════════════════════════════════════════════════════════

/// Connected components of the "near duplicate" relation, singletons
/// included. Members keep input order; components are ordered by their
/// first member.
fn components(records: &[MemoryRecord], threshold: f64, window: Duration) -> Vec<Vec<usize>> {
    let n = records.len();
    let mut parent: Vec<usize> = (0..n).collect();
    let mut rank: Vec<usize> = vec![0; n];

    for i in 0..n {
        for j in (i + 1)..n {
            let (a, b) = (&records[i], &records[j]);
            let gap = if a.created_at > b.created_at {
                a.created_at - b.created_at
            } else {
                b.created_at - a.created_at
            };
            if gap > window {
                continue;
            }
            if let (Some(ea), Some(eb)) = (&a.embedding, &b.embedding) {
                if cosine_similarity(ea, eb) >= threshold {
                    union(&mut parent, &mut rank, i, j);
                }
            }
        }
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..n {
        let root = find(&mut parent, i);
        groups.entry(root).or_default().push(i);
    }
    let mut out: Vec<Vec<usize>> = groups.into_values().collect();
    out.sort_by_key(|members| members[0]);
    out
}

/// Components of at least MIN_CONSOLIDATION_CLUSTER members.
pub(crate) fn build_clusters(
    records: &[MemoryRecord],
    threshold: f64,
    window: Duration,
) -> Vec<Vec<MemoryRecord>> {
    if records.len() < MIN_CONSOLIDATION_CLUSTER {
        return vec![];
    }
    components(records, threshold, window)
        .into_iter()
        .filter(|members| members.len() >= MIN_CONSOLIDATION_CLUSTER)
        .map(|members| members.into_iter().map(|i| records[i].clone()).collect())
        .collect()
}

/// Split one owner's open records at `horizon`, the newest created_at read
/// so far minus the window. Returns the clusters that can no longer grow
/// and the records a later page may still join, in input order.
pub(crate) fn settle(
    records: Vec<MemoryRecord>,
    horizon: DateTime<Utc>,
    threshold: f64,
    window: Duration,
) -> (Vec<Vec<MemoryRecord>>, Vec<MemoryRecord>) {
    let mut ready = Vec::new();
    let mut keep = vec![false; records.len()];
    for members in components(&records, threshold, window) {
        if members.iter().any(|&i| records[i].created_at >= horizon) {
            for i in members {
                keep[i] = true;
            }
        } else if members.len() >= MIN_CONSOLIDATION_CLUSTER {
            ready.push(members.iter().map(|&i| records[i].clone()).collect());
        }
    }
    let carry = records
        .into_iter()
        .zip(keep)
        .filter_map(|(r, kept)| kept.then_some(r))
        .collect();
    (ready, carry)
}

fn find(parent: &mut [usize], i: usize) -> usize {
    if parent[i] != i {
        parent[i] = find(parent, parent[i]);
    }
    parent[i]
}

fn union(parent: &mut [usize], rank: &mut [usize], a: usize, b: usize) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra == rb {
        return;
    }
    if rank[ra] < rank[rb] {
        parent[ra] = rb;
    } else if rank[ra] > rank[rb] {
        parent[rb] = ra;
    } else {
        parent[rb] = ra;
        rank[ra] += 1;
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Merge
// ═══════════════════════════════════════════════════════════════════════════

/// The consolidated record for `cluster` (not yet persisted).
pub(crate) fn consolidated_record(cluster: &[MemoryRecord], now: DateTime<Utc>) -> Option<MemoryRecord> {
    // Most important member leads; ties go to the oldest.
    let lead = cluster.iter().max_by(|a, b| {
        a.importance_score
            .total_cmp(&b.importance_score)
            .then_with(|| b.created_at.cmp(&a.created_at))
    })?;

    let vectors: Vec<&[f32]> = cluster.iter().filter_map(|r| r.embedding.as_deref()).collect();
    let embedding = centroid(&vectors);

    let mut sources: Vec<&MemoryRecord> = cluster.iter().collect();
    sources.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.memory_id.cmp(&b.memory_id)));

    let mut tags: BTreeSet<String> = BTreeSet::new();
    for r in cluster {
        tags.extend(r.metadata.tags.iter().cloned());
    }

    Some(MemoryRecord {
        memory_id: uuid::Uuid::new_v4().to_string(),
        content: lead.content.clone(),
        memory_type: MemoryType::Consolidated,
        owner_id: lead.owner_id.clone(),
        agent_name: lead.agent_name.clone(),
        context_level: lead.context_level,
        context_tag: lead.context_tag.clone(),
        importance_score: cluster.iter().map(|r| r.importance_score).fold(0.0, f64::max),
        significance_score: cluster.iter().map(|r| r.significance_score).fold(0.0, f64::max),
        embedding_model: if embedding.is_some() { lead.embedding_model.clone() } else { None },
        embedding,
        created_at: now,
        last_importance_update: now,
        access_frequency: cluster.iter().map(|r| r.access_frequency).sum(),
        last_accessed_at: cluster.iter().filter_map(|r| r.last_accessed_at).max(),
        accesses_since_sweep: 0,
        last_decay_at: None,
        state: RecordState::Active,
        archived_at: None,
        version: 0,
        metadata: MemoryMetadata {
            session_id: lead.metadata.session_id.clone(),
            source: Some("consolidation".to_string()),
            tags: tags.into_iter().collect(),
            consolidated_from: sources.iter().map(|r| r.memory_id.clone()).collect(),
            consolidated_into: None,
            extra: Default::default(),
        },
    })
}

async fn merge_cluster(
    manager: &LifecycleManager,
    cluster: Vec<MemoryRecord>,
    now: DateTime<Utc>,
    report: &mut ConsolidationReport,
) -> EngineResult<()> {
    // Re-read so a member archived or changed since the scan is honored.
    let ids: Vec<String> = cluster.iter().map(|r| r.memory_id.clone()).collect();
    let mut fresh: HashMap<String, MemoryRecord> = manager
        .store()
        .get_records(&ids)
        .await?
        .into_iter()
        .filter(|r| r.is_active())
        .map(|r| (r.memory_id.clone(), r))
        .collect();
    let members: Vec<MemoryRecord> = ids.iter().filter_map(|id| fresh.remove(id)).collect();
    if members.len() < MIN_CONSOLIDATION_CLUSTER {
        report.skipped += 1;
        return Ok(());
    }

    let Some(merged) = consolidated_record(&members, now) else {
        return Ok(());
    };
    bounded(
        "graph_store.insert_record",
        manager.store_timeout(),
        manager.store().insert_record(&merged),
    )
    .await?;
    report.consolidated += 1;

    let lookups = members.iter().map(|m| manager.store().concepts_for(&m.memory_id));
    let mut concepts: BTreeSet<String> = BTreeSet::new();
    for (m, found) in members.iter().zip(join_all(lookups).await) {
        match found {
            Ok(c) => concepts.extend(c),
            Err(e) => warn!("[engram:lifecycle] concepts for {} unavailable: {}", m.memory_id, e),
        }
    }
    if !concepts.is_empty() {
        let concepts: Vec<String> = concepts.into_iter().collect();
        if let Err(e) = manager.store().link_concepts(&merged.memory_id, &concepts).await {
            warn!("[engram:lifecycle] concept link failed for {}: {}", merged.memory_id, e);
        }
    }
    manager
        .audit(
            AuditOperation::Consolidate,
            &merged.memory_id,
            format!("merged {}", merged.metadata.consolidated_from.join(",")),
        )
        .await;

    for member in members {
        match archive_original(manager, member, &merged.memory_id, now).await? {
            WriteOutcome::Applied(_) => report.archived_originals += 1,
            WriteOutcome::NotNeeded => {}
            WriteOutcome::Skipped => report.skipped += 1,
        }
    }
    Ok(())
}

async fn archive_original(
    manager: &LifecycleManager,
    original: MemoryRecord,
    into: &str,
    now: DateTime<Utc>,
) -> EngineResult<WriteOutcome> {
    let id = original.memory_id.clone();
    let outcome = manager
        .write_guarded(original, |r| {
            if !r.is_active() {
                return None;
            }
            let mut metadata = r.metadata.clone();
            metadata.consolidated_into = Some(into.to_string());
            Some(RecordUpdate {
                state: Some(RecordState::Archived),
                archived_at: Some(now),
                access_frequency: Some(0),
                accesses_since_sweep: Some(0),
                metadata: Some(metadata),
                ..RecordUpdate::for_record(r.memory_id.clone())
            })
        })
        .await?;
    if matches!(outcome, WriteOutcome::Applied(_)) {
        manager.audit(AuditOperation::Archive, &id, format!("consolidated into {into}")).await;
    }
    Ok(outcome)
}

/// Archive originals still active under an existing consolidated record.
async fn repair(manager: &LifecycleManager, now: DateTime<Utc>) -> EngineResult<usize> {
    let scan = RecordScan { memory_types: vec![MemoryType::Consolidated], ..RecordScan::active() };
    let mut repaired = 0usize;
    let mut pages = manager.pages(scan);
    while let Some(consolidated) = pages.next(manager).await? {
        for parent in consolidated {
            if parent.metadata.consolidated_from.is_empty() {
                continue;
            }
            let originals = manager.store().get_records(&parent.metadata.consolidated_from).await?;
            for original in originals.into_iter().filter(|r| r.is_active()) {
                if let WriteOutcome::Applied(_) =
                    archive_original(manager, original, &parent.memory_id, now).await?
                {
                    repaired += 1;
                }
            }
        }
    }
    if repaired > 0 {
        warn!("[engram:lifecycle] Repaired {} originals left active by an interrupted cycle", repaired);
    }
    Ok(repaired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::traits::GraphStore;
    use crate::engine::config::LifecycleSection;
    use crate::engine::lifecycle::tests::{aged, manager, manager_with};

    fn embedded(id: &str, owner: &str, created: DateTime<Utc>, v: Vec<f32>, importance: f64) -> MemoryRecord {
        let mut r = aged(id, owner, created, importance);
        r.embedding = Some(v);
        r.embedding_model = Some("test".into());
        r
    }

    #[test]
    fn clusters_need_similarity_and_proximity() {
        let t = Utc::now();
        let recs = vec![
            embedded("a", "o", t, vec![1.0, 0.0], 0.5),
            embedded("b", "o", t + Duration::minutes(5), vec![0.99, 0.05], 0.5),
            embedded("c", "o", t, vec![0.0, 1.0], 0.5),
            // Same direction as "a" but far outside the window.
            embedded("d", "o", t + Duration::days(2), vec![1.0, 0.0], 0.5),
        ];
        let clusters = build_clusters(&recs, 0.92, Duration::hours(1));
        assert_eq!(clusters.len(), 1);
        let ids: Vec<&str> = clusters[0].iter().map(|r| r.memory_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn transitive_links_form_one_cluster() {
        let t = Utc::now();
        let recs = vec![
            embedded("a", "o", t, vec![1.0, 0.0, 0.0], 0.5),
            embedded("b", "o", t, vec![0.96, 0.28, 0.0], 0.5),
            embedded("c", "o", t, vec![0.85, 0.53, 0.0], 0.5),
        ];
        // a~b and b~c clear 0.95; a~c does not, union-find still joins them.
        assert!(cosine_similarity(&[1.0, 0.0, 0.0], &[0.85, 0.53, 0.0]) < 0.95);
        let clusters = build_clusters(&recs, 0.95, Duration::hours(1));
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 3);
    }

    #[test]
    fn merged_record_takes_lead_content_and_aggregates() {
        let t = Utc::now();
        let mut a = embedded("a", "o", t, vec![1.0, 0.0], 0.3);
        a.access_frequency = 2;
        a.metadata.tags = vec!["x".into()];
        let mut b = embedded("b", "o", t + Duration::seconds(1), vec![1.0, 0.0], 0.8);
        b.content = "lead".into();
        b.access_frequency = 5;
        b.significance_score = 0.9;
        b.metadata.tags = vec!["y".into()];

        let m = consolidated_record(&[a, b], t).unwrap();
        assert_eq!(m.content, "lead");
        assert_eq!(m.memory_type, MemoryType::Consolidated);
        assert_eq!(m.importance_score, 0.8);
        assert_eq!(m.significance_score, 0.9);
        assert_eq!(m.access_frequency, 7);
        assert_eq!(m.metadata.consolidated_from, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(m.metadata.tags, vec!["x".to_string(), "y".to_string()]);
        assert!(m.has_embedding());
    }

    #[tokio::test]
    async fn cycle_merges_and_archives_originals() {
        let (m, sim, _) = manager();
        let t = Utc::now();
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            let r = embedded(id, "o1", t + Duration::seconds(i as i64), vec![1.0, 0.01 * i as f32], 0.5);
            sim.insert_record(&r).await.unwrap();
        }
        sim.link_concepts("a", &["coffee".into()]).await.unwrap();
        sim.link_concepts("b", &["mornings".into()]).await.unwrap();
        // Different owner, identical vector: never merged across owners.
        sim.insert_record(&embedded("z", "o2", t, vec![1.0, 0.0], 0.5)).await.unwrap();

        let report = m.run_consolidation_cycle_at(t + Duration::minutes(1)).await.unwrap();
        assert_eq!((report.clusters, report.consolidated, report.archived_originals), (1, 1, 3));

        let active = sim.scan_records(&RecordScan::active()).await.unwrap();
        let merged: Vec<&MemoryRecord> =
            active.iter().filter(|r| r.memory_type == MemoryType::Consolidated).collect();
        assert_eq!(merged.len(), 1);
        assert_eq!(active.len(), 2); // merged + "z"

        let merged_id = merged[0].memory_id.clone();
        let concepts = sim.concepts_for(&merged_id).await.unwrap();
        assert!(concepts.contains(&"coffee".to_string()) && concepts.contains(&"mornings".to_string()));

        for id in ["a", "b", "c"] {
            let r = sim.get_record(id).await.unwrap().unwrap();
            assert_eq!(r.state, RecordState::Archived);
            assert_eq!(r.access_frequency, 0);
            assert_eq!(r.metadata.consolidated_into.as_deref(), Some(merged_id.as_str()));
        }

        // Idempotent: nothing left to merge.
        let again = m.run_consolidation_cycle_at(t + Duration::minutes(2)).await.unwrap();
        assert_eq!((again.consolidated, again.repaired), (0, 0));
    }

    #[tokio::test]
    async fn repair_finishes_interrupted_merge() {
        let (m, sim, _) = manager();
        let t = Utc::now();
        let a = embedded("a", "o1", t, vec![1.0, 0.0], 0.5);
        let b = embedded("b", "o1", t, vec![1.0, 0.0], 0.5);
        sim.insert_record(&a).await.unwrap();
        sim.insert_record(&b).await.unwrap();
        // Simulate a crash right after the consolidated insert.
        let merged = consolidated_record(&[a, b], t).unwrap();
        sim.insert_record(&merged).await.unwrap();

        let report = m.run_consolidation_cycle_at(t).await.unwrap();
        assert_eq!(report.repaired, 2);
        assert_eq!(report.consolidated, 0);
        let a = sim.get_record("a").await.unwrap().unwrap();
        assert_eq!(a.metadata.consolidated_into.as_deref(), Some(merged.memory_id.as_str()));
    }

    #[test]
    fn settle_holds_back_what_later_records_can_reach() {
        let t = Utc::now();
        let window = Duration::hours(1);
        let recs = vec![
            embedded("a", "o", t, vec![1.0, 0.0], 0.5),
            embedded("b", "o", t + Duration::minutes(1), vec![1.0, 0.0], 0.5),
            embedded("lone", "o", t + Duration::minutes(2), vec![0.0, 1.0], 0.5),
            embedded("c", "o", t + Duration::hours(3), vec![1.0, 0.0], 0.5),
        ];
        let horizon = t + Duration::hours(2);
        let (ready, carry) = settle(recs, horizon, 0.92, window);
        assert_eq!(ready.len(), 1);
        let ids: Vec<&str> = ready[0].iter().map(|r| r.memory_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        let kept: Vec<&str> = carry.iter().map(|r| r.memory_id.as_str()).collect();
        assert_eq!(kept, vec!["c"]);
    }

    #[tokio::test]
    async fn paged_cycle_merges_across_page_boundaries() {
        let cfg = LifecycleSection { batch_size: 2, ..LifecycleSection::default() };
        let (m, sim, _) = manager_with(cfg);
        let t = Utc::now() - Duration::days(3);
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            let r = embedded(id, "o1", t + Duration::seconds(i as i64), vec![1.0, 0.01 * i as f32], 0.5);
            sim.insert_record(&r).await.unwrap();
        }
        sim.insert_record(&embedded("d", "o1", t + Duration::seconds(3), vec![0.0, 1.0], 0.5))
            .await
            .unwrap();
        // Same direction as the cluster, but two days later.
        sim.insert_record(&embedded("e", "o1", t + Duration::days(2), vec![1.0, 0.0], 0.5))
            .await
            .unwrap();

        let report = m.run_consolidation_cycle_at(Utc::now()).await.unwrap();
        assert_eq!(report.candidates, 5);
        assert_eq!((report.clusters, report.consolidated, report.archived_originals), (1, 1, 3));
        for id in ["a", "b", "c"] {
            assert_eq!(sim.get_record(id).await.unwrap().unwrap().state, RecordState::Archived);
        }
        for id in ["d", "e"] {
            assert!(sim.get_record(id).await.unwrap().unwrap().is_active());
        }
    }
}
