// ── Engram: Archival ───────────────────────────────────────────────────────
//
// Two stages:
//   soft delete : active, importance < floor, never accessed, older than
//                 archive_idle_days → state = archived (kept for audit,
//                 invisible to retrieval)
//   hard delete : archived longer than hard_delete_after_days → row and
//                 concept links removed; the audit trail keeps the history

use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::atoms::error::EngineResult;
use crate::atoms::types::{AuditOperation, MemoryRecord, RecordScan, RecordState, RecordUpdate};
use crate::engine::config::LifecycleSection;

use super::{LifecycleManager, WriteOutcome};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ArchivalReport {
    /// Active records old enough to be considered.
    pub examined: usize,
    pub archived: usize,
    pub hard_deleted: usize,
    pub skipped: usize,
    pub duration_ms: u64,
}

pub(crate) fn eligible(record: &MemoryRecord, now: DateTime<Utc>, cfg: &LifecycleSection) -> bool {
    record.is_active()
        && record.importance_score < cfg.archive_importance_floor
        && record.access_frequency == 0
        && now - record.created_at > Duration::days(cfg.archive_idle_days)
}

pub(crate) async fn run(manager: &LifecycleManager, now: DateTime<Utc>) -> EngineResult<ArchivalReport> {
    let cfg = manager.config().clone();
    let mut report = ArchivalReport::default();

    // ── Soft delete ──────────────────────────────────────────────────────
    let scan = RecordScan {
        created_before: Some(now - Duration::days(cfg.archive_idle_days)),
        ..RecordScan::active()
    };
    let mut pages = manager.pages(scan);
    while let Some(old) = pages.next(manager).await? {
        report.examined += old.len();
        for record in old.into_iter().filter(|r| eligible(r, now, &cfg)) {
            let id = record.memory_id.clone();
            let outcome = manager
                .write_guarded(record, |r| {
                    eligible(r, now, &cfg).then(|| RecordUpdate {
                        state: Some(RecordState::Archived),
                        archived_at: Some(now),
                        ..RecordUpdate::for_record(r.memory_id.clone())
                    })
                })
                .await?;
            match outcome {
                WriteOutcome::Applied(r) => {
                    report.archived += 1;
                    manager
                        .audit(
                            AuditOperation::Archive,
                            &id,
                            format!("importance {:.3}, never accessed", r.importance_score),
                        )
                        .await;
                }
                WriteOutcome::NotNeeded => {}
                WriteOutcome::Skipped => report.skipped += 1,
            }
        }
        tokio::task::yield_now().await;
    }

    // ── Hard delete ──────────────────────────────────────────────────────
    let scan = RecordScan {
        archived_before: Some(now - Duration::days(cfg.hard_delete_after_days)),
        ..RecordScan::archived()
    };
    let mut pages = manager.pages(scan);
    while let Some(expired) = pages.next(manager).await? {
        for record in expired {
            match manager.store().delete_record(&record.memory_id).await {
                Ok(true) => {
                    report.hard_deleted += 1;
                    let archived_at = record.archived_at.map(|t| t.to_rfc3339()).unwrap_or_default();
                    manager
                        .audit(AuditOperation::HardDelete, &record.memory_id, format!("archived at {archived_at}"))
                        .await;
                }
                Ok(false) => {}
                Err(e) => {
                    report.skipped += 1;
                    warn!("[engram:lifecycle] hard delete of {} failed: {}", record.memory_id, e);
                }
            }
        }
        tokio::task::yield_now().await;
    }

    info!(
        "[engram:lifecycle] Archival: examined={} archived={} hard_deleted={} skipped={}",
        report.examined, report.archived, report.hard_deleted, report.skipped
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::traits::GraphStore;
    use crate::engine::lifecycle::tests::{aged, manager};

    #[test]
    fn eligibility_needs_all_three_conditions() {
        let now = Utc::now();
        let cfg = LifecycleSection::default();
        let stale = aged("a", "o", now - Duration::days(120), 0.01);
        assert!(eligible(&stale, now, &cfg));

        let mut used = stale.clone();
        used.access_frequency = 1;
        assert!(!eligible(&used, now, &cfg));

        let important = aged("b", "o", now - Duration::days(120), 0.3);
        assert!(!eligible(&important, now, &cfg));

        let young = aged("c", "o", now - Duration::days(10), 0.01);
        assert!(!eligible(&young, now, &cfg));
    }

    #[tokio::test]
    async fn archives_then_hard_deletes_after_retention() {
        let (m, sim, _) = manager();
        let now = Utc::now();
        sim.insert_record(&aged("old", "o1", now - Duration::days(100), 0.01)).await.unwrap();
        sim.insert_record(&aged("keep", "o1", now - Duration::days(100), 0.5)).await.unwrap();

        let r = m.run_archival_cycle_at(now).await.unwrap();
        assert_eq!((r.examined, r.archived, r.hard_deleted), (2, 1, 0));
        let old = sim.get_record("old").await.unwrap().unwrap();
        assert_eq!(old.state, RecordState::Archived);
        assert!(old.archived_at.is_some());

        // Re-run changes nothing.
        let again = m.run_archival_cycle_at(now).await.unwrap();
        assert_eq!((again.archived, again.hard_deleted), (0, 0));

        let later = now + Duration::days(366);
        let r = m.run_archival_cycle_at(later).await.unwrap();
        assert_eq!(r.hard_deleted, 1);
        assert!(sim.get_record("old").await.unwrap().is_none());
        assert!(sim.get_record("keep").await.unwrap().is_some());

        let trail = sim.audit_entries(Some("old"), 0).await.unwrap();
        let ops: Vec<AuditOperation> = trail.iter().map(|e| e.operation).collect();
        assert_eq!(ops, vec![AuditOperation::Archive, AuditOperation::HardDelete]);
    }
}
