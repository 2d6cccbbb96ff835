// ── Engram: Simulated Graph Store ──────────────────────────────────────────
//
// Wraps any GraphStore and injects faults on demand: full outage, missing
// vector index, concept-link failures, access-update failures, one-shot
// optimistic-lock conflicts and artificial latency. Faults are toggled at
// runtime through atomics so a test can flip them mid-scenario.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::{GraphStore, UpdateOutcome};
use crate::atoms::types::{
    AuditEntry, MemoryRecord, RecordScan, RecordUpdate, RetrievalFilters, StoreStats,
};

/// Fault switches. All off by default.
#[derive(Debug, Default)]
pub struct FaultPlan {
    pub unavailable: AtomicBool,
    pub vector_index_missing: AtomicBool,
    pub fail_concept_links: AtomicBool,
    pub fail_access_updates: AtomicBool,
    pub latency_ms: AtomicU64,
    /// Ids whose next conditional update reports a conflict.
    conflict_once: Mutex<HashSet<String>>,
}

pub struct SimGraphStore {
    inner: Arc<dyn GraphStore>,
    faults: FaultPlan,
}

impl SimGraphStore {
    pub fn new(inner: Arc<dyn GraphStore>) -> Self {
        Self { inner, faults: FaultPlan::default() }
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    pub fn set_unavailable(&self, down: bool) {
        self.faults.unavailable.store(down, Ordering::SeqCst);
    }

    pub fn set_vector_index_missing(&self, missing: bool) {
        self.faults.vector_index_missing.store(missing, Ordering::SeqCst);
    }

    pub fn set_fail_concept_links(&self, fail: bool) {
        self.faults.fail_concept_links.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_access_updates(&self, fail: bool) {
        self.faults.fail_access_updates.store(fail, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.faults.latency_ms.store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// The next `conditional_update` on `memory_id` reports a conflict
    /// after applying a no-op version bump, as a concurrent writer would.
    pub fn inject_conflict(&self, memory_id: &str) {
        self.faults.conflict_once.lock().insert(memory_id.to_string());
    }

    async fn gate(&self, op: &str) -> EngineResult<()> {
        let latency = self.faults.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.faults.unavailable.load(Ordering::SeqCst) {
            return Err(EngineError::Other(format!("simulated outage during {op}")));
        }
        Ok(())
    }
}

#[async_trait]
impl GraphStore for SimGraphStore {
    async fn ping(&self) -> EngineResult<()> {
        self.gate("ping").await?;
        self.inner.ping().await
    }

    async fn vector_index_available(&self) -> bool {
        if self.faults.unavailable.load(Ordering::SeqCst)
            || self.faults.vector_index_missing.load(Ordering::SeqCst)
        {
            return false;
        }
        self.inner.vector_index_available().await
    }

    async fn insert_record(&self, record: &MemoryRecord) -> EngineResult<()> {
        self.gate("insert_record").await?;
        self.inner.insert_record(record).await
    }

    async fn get_record(&self, memory_id: &str) -> EngineResult<Option<MemoryRecord>> {
        self.gate("get_record").await?;
        self.inner.get_record(memory_id).await
    }

    async fn get_records(&self, memory_ids: &[String]) -> EngineResult<Vec<MemoryRecord>> {
        self.gate("get_records").await?;
        self.inner.get_records(memory_ids).await
    }

    async fn scan_records(&self, scan: &RecordScan) -> EngineResult<Vec<MemoryRecord>> {
        self.gate("scan_records").await?;
        self.inner.scan_records(scan).await
    }

    async fn conditional_update(
        &self,
        update: &RecordUpdate,
        expected_version: u64,
    ) -> EngineResult<UpdateOutcome> {
        self.gate("conditional_update").await?;
        let injected = self.faults.conflict_once.lock().remove(&update.memory_id);
        if injected {
            // Concurrent writer wins the race: bump the version, change nothing else.
            let bump = RecordUpdate::for_record(update.memory_id.clone());
            self.inner.conditional_update(&bump, expected_version).await?;
            return Ok(UpdateOutcome::Conflict);
        }
        self.inner.conditional_update(update, expected_version).await
    }

    async fn delete_record(&self, memory_id: &str) -> EngineResult<bool> {
        self.gate("delete_record").await?;
        self.inner.delete_record(memory_id).await
    }

    async fn link_concepts(&self, memory_id: &str, concepts: &[String]) -> EngineResult<()> {
        self.gate("link_concepts").await?;
        if self.faults.fail_concept_links.load(Ordering::SeqCst) {
            return Err(EngineError::Other("simulated concept-link failure".into()));
        }
        self.inner.link_concepts(memory_id, concepts).await
    }

    async fn concepts_for(&self, memory_id: &str) -> EngineResult<Vec<String>> {
        self.gate("concepts_for").await?;
        self.inner.concepts_for(memory_id).await
    }

    async fn keyword_candidates(
        &self,
        owner_id: &str,
        terms: &[String],
        filters: &RetrievalFilters,
        limit: usize,
    ) -> EngineResult<Vec<MemoryRecord>> {
        self.gate("keyword_candidates").await?;
        self.inner.keyword_candidates(owner_id, terms, filters, limit).await
    }

    async fn vector_top_k(
        &self,
        owner_id: &str,
        query: &[f32],
        filters: &RetrievalFilters,
        k: usize,
    ) -> EngineResult<Vec<(MemoryRecord, f64)>> {
        self.gate("vector_top_k").await?;
        if self.faults.vector_index_missing.load(Ordering::SeqCst) {
            return Err(EngineError::degraded("vector_index", "simulated missing index"));
        }
        self.inner.vector_top_k(owner_id, query, filters, k).await
    }

    async fn list_in_window(
        &self,
        owner_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filters: &RetrievalFilters,
        limit: usize,
    ) -> EngineResult<Vec<MemoryRecord>> {
        self.gate("list_in_window").await?;
        self.inner.list_in_window(owner_id, start, end, filters, limit).await
    }

    async fn record_access(&self, memory_ids: &[String], at: DateTime<Utc>) -> EngineResult<()> {
        self.gate("record_access").await?;
        if self.faults.fail_access_updates.load(Ordering::SeqCst) {
            return Err(EngineError::Other("simulated access-update failure".into()));
        }
        self.inner.record_access(memory_ids, at).await
    }

    async fn append_audit(&self, entry: &AuditEntry) -> EngineResult<()> {
        self.gate("append_audit").await?;
        self.inner.append_audit(entry).await
    }

    async fn audit_entries(
        &self,
        memory_id: Option<&str>,
        limit: usize,
    ) -> EngineResult<Vec<AuditEntry>> {
        self.gate("audit_entries").await?;
        self.inner.audit_entries(memory_id, limit).await
    }

    async fn stats(&self) -> EngineResult<StoreStats> {
        self.gate("stats").await?;
        self.inner.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::store::SqliteGraphStore;

    fn sim() -> SimGraphStore {
        let inner: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::open_in_memory().unwrap());
        SimGraphStore::new(inner)
    }

    #[tokio::test]
    async fn outage_fails_every_call_and_hides_vector_index() {
        let s = sim();
        assert!(s.ping().await.is_ok());
        s.set_unavailable(true);
        assert!(s.ping().await.is_err());
        assert!(s.stats().await.is_err());
        assert!(!s.vector_index_available().await);
        s.set_unavailable(false);
        assert!(s.ping().await.is_ok());
    }

    #[tokio::test]
    async fn missing_vector_index_is_reported() {
        let s = sim();
        assert!(s.vector_index_available().await);
        s.set_vector_index_missing(true);
        assert!(!s.vector_index_available().await);
        assert!(s.vector_top_k("o", &[1.0], &RetrievalFilters::default(), 3).await.is_err());
    }

    #[tokio::test]
    async fn concept_and_access_faults_are_independent() {
        let s = sim();
        s.set_fail_concept_links(true);
        assert!(s.link_concepts("m", &["x".into()]).await.is_err());
        assert!(s.record_access(&["m".into()], Utc::now()).await.is_ok());
        s.set_fail_access_updates(true);
        assert!(s.record_access(&["m".into()], Utc::now()).await.is_err());
    }
}
