// ── Engram Atoms: Collaborator Traits ──────────────────────────────────────
//
// The seams between the memory engine and its external collaborators:
//   GraphStore           : durable records, concepts, vector + keyword lookup
//   EmbeddingProvider    : text → vector
//   ContextStateProvider : current context snapshot
//
// Every method is async and object-safe so the subsystem holds `Arc<dyn _>`
// and tests can swap in simulated implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::atoms::error::EngineResult;
use crate::atoms::types::{
    AuditEntry, ContextSnapshot, MemoryRecord, RecordScan, RecordUpdate, RetrievalFilters,
    StoreStats,
};

/// Outcome of an optimistic-concurrency write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Applied; carries the new version.
    Applied(u64),
    /// Stored version differed from the expected one. Nothing was written.
    Conflict,
    /// No record with that id.
    Missing,
}

/// Durable storage for memory records and their concept graph.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Cheap liveness probe.
    async fn ping(&self) -> EngineResult<()>;

    /// Whether vector similarity search is currently usable.
    async fn vector_index_available(&self) -> bool;

    // ── Records ────────────────────────────────────────────────────────

    /// Durably persist a new record. Atomic: either the row exists or not.
    async fn insert_record(&self, record: &MemoryRecord) -> EngineResult<()>;

    async fn get_record(&self, memory_id: &str) -> EngineResult<Option<MemoryRecord>>;

    /// Batch fetch. Missing ids are skipped; order is unspecified.
    async fn get_records(&self, memory_ids: &[String]) -> EngineResult<Vec<MemoryRecord>>;

    /// Records matching a lifecycle / audit selection, oldest first.
    async fn scan_records(&self, scan: &RecordScan) -> EngineResult<Vec<MemoryRecord>>;

    /// Apply `update` only if the stored version equals `expected_version`.
    async fn conditional_update(
        &self,
        update: &RecordUpdate,
        expected_version: u64,
    ) -> EngineResult<UpdateOutcome>;

    /// Physically remove a record and its concept links.
    async fn delete_record(&self, memory_id: &str) -> EngineResult<bool>;

    // ── Concepts ───────────────────────────────────────────────────────

    /// Link a memory to named concepts, creating concept nodes on demand.
    async fn link_concepts(&self, memory_id: &str, concepts: &[String]) -> EngineResult<()>;

    async fn concepts_for(&self, memory_id: &str) -> EngineResult<Vec<String>>;

    // ── Candidate generation ──────────────────────────────────────────
    //
    // `filters` (type, agent, window) apply before `limit` / `k`, so a narrow
    // filter still sees every matching record. Context is ignored here.

    /// Active records of `owner_id` whose content matches any of `terms`
    /// (full-text). Empty `terms` yields nothing.
    async fn keyword_candidates(
        &self,
        owner_id: &str,
        terms: &[String],
        filters: &RetrievalFilters,
        limit: usize,
    ) -> EngineResult<Vec<MemoryRecord>>;

    /// Active embedded records of `owner_id` nearest to `query`, with their
    /// raw cosine similarity, best first.
    async fn vector_top_k(
        &self,
        owner_id: &str,
        query: &[f32],
        filters: &RetrievalFilters,
        k: usize,
    ) -> EngineResult<Vec<(MemoryRecord, f64)>>;

    /// Active records of `owner_id` created inside [start, end], newest first.
    async fn list_in_window(
        &self,
        owner_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filters: &RetrievalFilters,
        limit: usize,
    ) -> EngineResult<Vec<MemoryRecord>>;

    // ── Access tracking ───────────────────────────────────────────────

    /// Atomically bump access_frequency and accesses_since_sweep, and stamp
    /// last_accessed_at / last_importance_update, for every id in the batch.
    async fn record_access(&self, memory_ids: &[String], at: DateTime<Utc>) -> EngineResult<()>;

    // ── Audit ─────────────────────────────────────────────────────────

    async fn append_audit(&self, entry: &AuditEntry) -> EngineResult<()>;

    /// Audit entries for a memory (or all when `None`), oldest first.
    async fn audit_entries(&self, memory_id: Option<&str>, limit: usize)
        -> EngineResult<Vec<AuditEntry>>;

    async fn stats(&self) -> EngineResult<StoreStats>;
}

/// Text → vector. Implementations must be deterministic for a given model.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Identifier stored alongside each vector.
    fn model_name(&self) -> &str;

    /// Dimensions, when known ahead of the first call.
    fn dimensions(&self) -> Option<usize>;

    async fn embed(&self, text: &str) -> EngineResult<Vec<f32>>;
}

/// Source of the "current" context snapshot when callers supply none.
#[async_trait]
pub trait ContextStateProvider: Send + Sync {
    async fn current_snapshot(&self) -> Option<ContextSnapshot>;
}

/// Provider that always returns the same snapshot (or none).
#[derive(Debug, Clone, Default)]
pub struct StaticContextProvider {
    snapshot: Option<ContextSnapshot>,
}

impl StaticContextProvider {
    pub fn new(snapshot: Option<ContextSnapshot>) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl ContextStateProvider for StaticContextProvider {
    async fn current_snapshot(&self) -> Option<ContextSnapshot> {
        self.snapshot.clone()
    }
}
