// ── Engram: Importance Decay ───────────────────────────────────────────────
//
// Per active record, at most once per `min_sweep_interval_secs`:
//   accessed since last sweep → importance += min(access_boost · n, cap),
//                               accesses_since_sweep reset to 0
//   otherwise, idle longer than decay_idle_days → importance *= 1 - decay_rate
// Every result is clamped to [0, 1]. `last_decay_at` is stamped on every
// evaluated record, so re-running after a crash cannot apply decay twice.

use chrono::{DateTime, Duration, Utc};
use log::info;
use serde::{Deserialize, Serialize};

use crate::atoms::error::EngineResult;
use crate::atoms::types::{clamp_unit, AuditOperation, MemoryRecord, RecordScan, RecordUpdate};
use crate::engine::config::LifecycleSection;

use super::{LifecycleManager, WriteOutcome};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DecayReport {
    /// Active records examined.
    pub scanned: usize,
    pub decayed: usize,
    pub boosted: usize,
    /// Evaluated but unchanged (recently used, not idle).
    pub unchanged: usize,
    /// Already swept inside the minimum interval.
    pub not_due: usize,
    /// Given up after a repeated version conflict.
    pub skipped: usize,
    pub duration_ms: u64,
}

/// What decay would do to `record` at `now`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum DecayStep {
    NotDue,
    Boost(f64),
    Decay(f64),
    Stamp,
}

pub(crate) fn step(record: &MemoryRecord, now: DateTime<Utc>, cfg: &LifecycleSection) -> DecayStep {
    if let Some(last) = record.last_decay_at {
        if now - last < Duration::seconds(cfg.min_sweep_interval_secs) {
            return DecayStep::NotDue;
        }
    }
    if record.accesses_since_sweep > 0 {
        let boost = (cfg.access_boost * record.accesses_since_sweep as f64).min(cfg.access_boost_cap);
        return DecayStep::Boost(clamp_unit(record.importance_score + boost));
    }
    if now - record.last_touched() > Duration::days(cfg.decay_idle_days) {
        return DecayStep::Decay(clamp_unit(record.importance_score * (1.0 - cfg.decay_rate)));
    }
    DecayStep::Stamp
}

fn plan(record: &MemoryRecord, now: DateTime<Utc>, cfg: &LifecycleSection) -> Option<RecordUpdate> {
    if !record.is_active() {
        return None;
    }
    let base = RecordUpdate { last_decay_at: Some(now), ..RecordUpdate::for_record(record.memory_id.clone()) };
    match step(record, now, cfg) {
        DecayStep::NotDue => None,
        DecayStep::Boost(importance) => Some(RecordUpdate {
            importance_score: Some(importance),
            last_importance_update: Some(now),
            accesses_since_sweep: Some(0),
            ..base
        }),
        DecayStep::Decay(importance) => Some(RecordUpdate {
            importance_score: Some(importance),
            last_importance_update: Some(now),
            ..base
        }),
        DecayStep::Stamp => Some(base),
    }
}

pub(crate) async fn run(manager: &LifecycleManager, now: DateTime<Utc>) -> EngineResult<DecayReport> {
    let cfg = manager.config().clone();
    let mut report = DecayReport::default();
    let mut pages = manager.pages(RecordScan::active());

    while let Some(batch) = pages.next(manager).await? {
        report.scanned += batch.len();
        for record in batch {
            let id = record.memory_id.clone();
            // Classified against the version actually written.
            let outcome = manager.write_guarded(record, |r| plan(r, now, &cfg)).await?;
            match outcome {
                WriteOutcome::Applied(planned) => match step(&planned, now, &cfg) {
                    DecayStep::Boost(to) => {
                        report.boosted += 1;
                        manager
                            .audit(
                                AuditOperation::Decay,
                                &id,
                                format!("boost {:.3} -> {:.3}", planned.importance_score, to),
                            )
                            .await;
                    }
                    DecayStep::Decay(to) => {
                        report.decayed += 1;
                        manager
                            .audit(
                                AuditOperation::Decay,
                                &id,
                                format!("decay {:.3} -> {:.3}", planned.importance_score, to),
                            )
                            .await;
                    }
                    DecayStep::Stamp | DecayStep::NotDue => report.unchanged += 1,
                },
                WriteOutcome::NotNeeded => report.not_due += 1,
                WriteOutcome::Skipped => report.skipped += 1,
            }
        }
        tokio::task::yield_now().await;
    }

    info!(
        "[engram:lifecycle] Decay: scanned={} decayed={} boosted={} not_due={} skipped={}",
        report.scanned, report.decayed, report.boosted, report.not_due, report.skipped
    );
    Ok(report)
}
