// ── Engram: Lifecycle Manager ──────────────────────────────────────────────
//
// Background maintenance of stored memories:
//   decay         : idle records lose importance, accessed records gain some
//   consolidation : near-duplicate clusters merge into one consolidated record
//   archival      : low-value records are soft-deleted, then hard-deleted
//
// Concurrency model:
//   - One cycle at a time: every cycle holds `cycle_lock` for its duration.
//   - Every record write is read → plan → conditional_update(expected
//     version). A version mismatch (a concurrent retrieval bumped access
//     stats, say) re-reads the record and re-plans once; a second mismatch
//     skips the record until the next sweep. Nothing is ever blind-written.
//   - Each cycle is idempotent: decay stamps `last_decay_at`, archival
//     re-checks eligibility, consolidation repairs half-finished merges.
//   - Scans are paged: `batch_size` records at a time, resumed from a
//     (created_at, memory_id) cursor, so a cycle never holds the whole
//     table in memory.
//
// Module layout:
//   decay         : importance decay + access boost
//   consolidation : union-find clustering and merge
//   archival      : soft delete + retention-window hard delete
//   (this file)   : manager, OCC write helper, scheduler

pub mod archival;
pub mod consolidation;
pub mod decay;

pub use archival::ArchivalReport;
pub use consolidation::ConsolidationReport;
pub use decay::DecayReport;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use parking_lot::Mutex as SyncMutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::atoms::constants::SYSTEM_ACTOR;
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::{GraphStore, UpdateOutcome};
use crate::atoms::types::{AuditEntry, AuditOperation, MemoryRecord, RecordScan, RecordUpdate};
use crate::engine::config::LifecycleSection;
use crate::engine::metrics::{Counter, Cycle, MetricsRegistry};
use crate::engine::store::bounded;

/// Result of one guarded record write.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum WriteOutcome {
    /// Written; carries the record as it was planned against.
    Applied(MemoryRecord),
    /// The (fresh) record no longer needs this change.
    NotNeeded,
    /// Conflicted twice, or vanished. Left for the next sweep.
    Skipped,
}

/// All three cycles, in sweep order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepReport {
    pub decay: DecayReport,
    pub consolidation: ConsolidationReport,
    pub archival: ArchivalReport,
}

pub struct LifecycleManager {
    store: Arc<dyn GraphStore>,
    metrics: Arc<MetricsRegistry>,
    config: LifecycleSection,
    store_timeout: Duration,
    cycle_lock: Mutex<()>,
    last_error: SyncMutex<Option<String>>,
}

impl LifecycleManager {
    pub fn new(
        store: Arc<dyn GraphStore>,
        metrics: Arc<MetricsRegistry>,
        config: LifecycleSection,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            metrics,
            config,
            store_timeout,
            cycle_lock: Mutex::new(()),
            last_error: SyncMutex::new(None),
        }
    }

    pub fn config(&self) -> &LifecycleSection {
        &self.config
    }

    /// Whether a cycle currently holds the lock.
    pub fn is_running(&self) -> bool {
        self.cycle_lock.try_lock().is_err()
    }

    /// Error message of the most recent failed cycle, cleared by a success.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Cycles
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn run_decay_cycle(&self) -> EngineResult<DecayReport> {
        self.run_decay_cycle_at(Utc::now()).await
    }

    /// Decay as if the sweep ran at `now`.
    pub async fn run_decay_cycle_at(&self, now: DateTime<Utc>) -> EngineResult<DecayReport> {
        let _guard = self.cycle_lock.lock().await;
        let started = Instant::now();
        let result = decay::run(self, now).await;
        self.finish(Cycle::Decay, started, result).map(|mut r| {
            r.duration_ms = started.elapsed().as_millis() as u64;
            r
        })
    }

    pub async fn run_consolidation_cycle(&self) -> EngineResult<ConsolidationReport> {
        self.run_consolidation_cycle_at(Utc::now()).await
    }

    pub async fn run_consolidation_cycle_at(
        &self,
        now: DateTime<Utc>,
    ) -> EngineResult<ConsolidationReport> {
        let _guard = self.cycle_lock.lock().await;
        let started = Instant::now();
        let result = consolidation::run(self, now).await;
        self.finish(Cycle::Consolidation, started, result).map(|mut r| {
            r.duration_ms = started.elapsed().as_millis() as u64;
            r
        })
    }

    pub async fn run_archival_cycle(&self) -> EngineResult<ArchivalReport> {
        self.run_archival_cycle_at(Utc::now()).await
    }

    pub async fn run_archival_cycle_at(&self, now: DateTime<Utc>) -> EngineResult<ArchivalReport> {
        let _guard = self.cycle_lock.lock().await;
        let started = Instant::now();
        let result = archival::run(self, now).await;
        self.finish(Cycle::Archival, started, result).map(|mut r| {
            r.duration_ms = started.elapsed().as_millis() as u64;
            r
        })
    }

    /// Decay, consolidation, archival. A failing cycle does not stop the
    /// ones after it; the first error is returned once all three ran.
    pub async fn run_sweep(&self) -> EngineResult<SweepReport> {
        let mut first_error: Option<EngineError> = None;
        let mut report = SweepReport::default();

        match self.run_decay_cycle().await {
            Ok(r) => report.decay = r,
            Err(e) => first_error = first_error.or(Some(e)),
        }
        match self.run_consolidation_cycle().await {
            Ok(r) => report.consolidation = r,
            Err(e) => first_error = first_error.or(Some(e)),
        }
        match self.run_archival_cycle().await {
            Ok(r) => report.archival = r,
            Err(e) => first_error = first_error.or(Some(e)),
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    fn finish<T>(&self, cycle: Cycle, started: Instant, result: EngineResult<T>) -> EngineResult<T> {
        let elapsed = started.elapsed();
        match &result {
            Ok(_) => {
                self.metrics.record_cycle(cycle, elapsed);
                *self.last_error.lock() = None;
            }
            Err(e) => {
                error!("[engram:lifecycle] {:?} cycle failed after {:?}: {}", cycle, elapsed, e);
                *self.last_error.lock() = Some(e.to_string());
            }
        }
        result
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Guarded writes
    // ═══════════════════════════════════════════════════════════════════════

    /// Apply `plan(record)` with an optimistic version check. On conflict
    /// the record is re-read and re-planned once before giving up.
    pub(crate) async fn write_guarded<F>(
        &self,
        record: MemoryRecord,
        plan: F,
    ) -> EngineResult<WriteOutcome>
    where
        F: Fn(&MemoryRecord) -> Option<RecordUpdate>,
    {
        let mut current = record;
        for attempt in 0..2 {
            let Some(update) = plan(&current) else {
                return Ok(WriteOutcome::NotNeeded);
            };
            let outcome = bounded(
                "graph_store.conditional_update",
                self.store_timeout,
                self.store.conditional_update(&update, current.version),
            )
            .await?;

            match outcome {
                UpdateOutcome::Applied(_) => return Ok(WriteOutcome::Applied(current)),
                UpdateOutcome::Missing => return Ok(WriteOutcome::Skipped),
                UpdateOutcome::Conflict => {
                    self.metrics.incr(Counter::LifecycleConflicts);
                    if attempt == 1 {
                        break;
                    }
                    match self.store.get_record(&current.memory_id).await? {
                        Some(fresh) => current = fresh,
                        None => return Ok(WriteOutcome::Skipped),
                    }
                }
            }
        }

        self.metrics.incr(Counter::LifecycleSkipped);
        let conflict = EngineError::LifecycleConflict { memory_id: current.memory_id.clone() };
        warn!("[engram:lifecycle] skipping until next sweep: {}", conflict);
        Ok(WriteOutcome::Skipped)
    }

    pub(crate) async fn audit(&self, op: AuditOperation, memory_id: &str, detail: String) {
        let entry = AuditEntry::new(op, memory_id, SYSTEM_ACTOR).detail(detail);
        if let Err(e) = self.store.append_audit(&entry).await {
            warn!("[engram:lifecycle] audit append failed for {}: {}", memory_id, e);
        }
    }

    pub(crate) fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Page through `scan`, `batch_size` records per store call.
    pub(crate) fn pages(&self, scan: RecordScan) -> ScanPages {
        ScanPages { scan: scan.paged(self.config.batch_size), exhausted: false }
    }

    pub(crate) fn store_timeout(&self) -> Duration {
        self.store_timeout
    }
}

/// Keyset-paged walk over a `RecordScan`, oldest first.
///
/// The cursor sits on `(created_at, memory_id)`, neither of which a cycle
/// rewrites, so records archived or deleted mid-walk never shift a page.
pub(crate) struct ScanPages {
    scan: RecordScan,
    exhausted: bool,
}

impl ScanPages {
    /// The next page, or `None` once the selection is exhausted.
    pub(crate) async fn next(
        &mut self,
        manager: &LifecycleManager,
    ) -> EngineResult<Option<Vec<MemoryRecord>>> {
        if self.exhausted {
            return Ok(None);
        }
        let page = bounded(
            "graph_store.scan_records",
            manager.store_timeout(),
            manager.store().scan_records(&self.scan),
        )
        .await?;
        let Some(last) = page.last() else {
            self.exhausted = true;
            return Ok(None);
        };
        self.scan.advance(last);
        if page.len() < self.scan.limit {
            self.exhausted = true;
        }
        Ok(Some(page))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Scheduler
// ═══════════════════════════════════════════════════════════════════════════

/// Periodic sweep on the tokio runtime. Dropping the handle without
/// `shutdown()` leaves the task running until the runtime stops.
pub struct LifecycleScheduler {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl LifecycleScheduler {
    /// Start sweeping every `period`; the first sweep runs one period from now.
    pub fn spawn(manager: Arc<LifecycleManager>, period: Duration) -> Self {
        let (stop, mut stop_rx) = watch::channel(false);
        let period = period.max(Duration::from_millis(10));
        let handle = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!("[engram:lifecycle] Scheduler started (every {:?})", period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match manager.run_sweep().await {
                            Ok(r) => info!(
                                "[engram:lifecycle] Sweep: decayed={} boosted={} consolidated={} archived={} deleted={}",
                                r.decay.decayed,
                                r.decay.boosted,
                                r.consolidation.consolidated,
                                r.archival.archived,
                                r.archival.hard_deleted
                            ),
                            Err(e) => warn!("[engram:lifecycle] Sweep incomplete: {}", e),
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("[engram:lifecycle] Scheduler stopped");
        });
        Self { stop, handle }
    }

    /// Signal the task and wait for the in-flight sweep (if any) to finish.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        let _ = self.handle.await;
    }
}
