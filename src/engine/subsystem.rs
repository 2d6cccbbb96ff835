// ── Engram: Memory Subsystem ───────────────────────────────────────────────
//
// The consumer-facing facade. Wires one graph store and one embedding
// client into the storage, retrieval, context, lifecycle and monitor
// components, and resolves the context snapshot for each call:
//   caller snapshot (fresh)        → used as given
//   caller snapshot (stale)        → neutral defaults
//   none, provider snapshot fresh  → provider's snapshot
//   none, provider stale           → neutral defaults
//   none, no provider / no signal  → storage writes defaults, retrieval
//                                    skips context re-ranking

use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::{ContextStateProvider, GraphStore};
use crate::atoms::types::{
    AuditEntry, ContextPayload, ContextSnapshot, MemoryRecord, NewMemory, RecordScan,
    RetrievalRequest, SearchResult, StoreStats,
};
use crate::engine::config::MemoryConfig;
use crate::engine::context_builder::ContextBuilder;
use crate::engine::embedding::EmbeddingClient;
use crate::engine::lifecycle::{
    ArchivalReport, ConsolidationReport, DecayReport, LifecycleManager, LifecycleScheduler,
    SweepReport,
};
use crate::engine::metrics::{MetricsRegistry, MetricsSnapshot};
use crate::engine::monitor::{HealthReport, SystemMonitor};
use crate::engine::retrieval::RetrievalEngine;
use crate::engine::storage::StorageEngine;
use crate::engine::store::SqliteGraphStore;
use crate::engine::tokenizer::Tokenizer;

/// A record with its full audit trail. `record` is `None` once hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub memory_id: String,
    pub record: Option<MemoryRecord>,
    pub concepts: Vec<String>,
    pub trail: Vec<AuditEntry>,
}

pub struct MemorySubsystem {
    config: MemoryConfig,
    store: Arc<dyn GraphStore>,
    context_provider: Option<Arc<dyn ContextStateProvider>>,
    storage: StorageEngine,
    retrieval: Arc<RetrievalEngine>,
    context: ContextBuilder,
    lifecycle: Arc<LifecycleManager>,
    monitor: SystemMonitor,
}

impl MemorySubsystem {
    /// Assemble the subsystem over an existing store and embedding client.
    pub fn new(
        config: MemoryConfig,
        store: Arc<dyn GraphStore>,
        embedder: EmbeddingClient,
    ) -> EngineResult<Self> {
        config.validate()?;
        let metrics = Arc::new(MetricsRegistry::new(config.monitor.latency_window));
        let store_timeout = config.store_timeout();

        let storage = StorageEngine::new(store.clone(), embedder.clone(), metrics.clone(), store_timeout);
        let retrieval = Arc::new(RetrievalEngine::new(
            store.clone(),
            embedder.clone(),
            metrics.clone(),
            config.retrieval.clone(),
            store_timeout,
        ));
        let context = ContextBuilder::new(
            retrieval.clone(),
            config.context.retrieval_limit,
            Tokenizer::heuristic(),
        );
        let lifecycle = Arc::new(LifecycleManager::new(
            store.clone(),
            metrics.clone(),
            config.lifecycle.clone(),
            store_timeout,
        ));
        let monitor = SystemMonitor::new(
            store.clone(),
            embedder.clone(),
            lifecycle.clone(),
            metrics.clone(),
            &config.monitor,
        );

        info!(
            "[engram] Memory subsystem ready (embeddings={}, model={})",
            embedder.is_enabled(),
            embedder.model_name().unwrap_or("none")
        );
        Ok(Self {
            config,
            store,
            context_provider: None,
            storage,
            retrieval,
            context,
            lifecycle,
            monitor,
        })
    }

    /// SQLite store and embedding provider as configured.
    pub fn from_config(config: MemoryConfig) -> EngineResult<Self> {
        let store = SqliteGraphStore::from_config(&config.store)?;
        let embedder = EmbeddingClient::from_config(&config.embedding);
        Self::new(config, Arc::new(store), embedder)
    }

    pub fn with_context_provider(mut self, provider: Arc<dyn ContextStateProvider>) -> Self {
        self.context_provider = Some(provider);
        self
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Consumer API
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn store(&self, mut input: NewMemory) -> EngineResult<String> {
        input.context = self.resolve_snapshot(input.context.take()).await;
        self.storage.store(input).await
    }

    pub async fn retrieve(&self, mut request: RetrievalRequest) -> EngineResult<Vec<SearchResult>> {
        request.filters.context = self.resolve_snapshot(request.filters.context.take()).await;
        self.retrieval.retrieve(&request).await
    }

    pub async fn build_context(
        &self,
        query: &str,
        owner_id: &str,
        snapshot: Option<ContextSnapshot>,
        token_budget: usize,
    ) -> EngineResult<ContextPayload> {
        let snapshot = self.resolve_snapshot(snapshot).await;
        self.context.build(query, owner_id, snapshot, token_budget).await
    }

    pub async fn health_check(&self) -> HealthReport {
        self.monitor.health_check().await
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.monitor.metrics()
    }

    /// Wait for background access-stat writes from earlier retrievals.
    pub async fn settle_access_updates(&self) {
        self.retrieval.settle_access_updates().await;
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Audit & stats
    // ═══════════════════════════════════════════════════════════════════════

    /// One record in any state, with concepts and its audit trail.
    pub async fn audit_record(&self, memory_id: &str) -> EngineResult<AuditRecord> {
        if memory_id.trim().is_empty() {
            return Err(EngineError::invalid("memory_id must not be empty"));
        }
        let record = self.store.get_record(memory_id).await?;
        let concepts = match &record {
            Some(_) => self.store.concepts_for(memory_id).await?,
            None => Vec::new(),
        };
        let trail = self.store.audit_entries(Some(memory_id), 0).await?;
        Ok(AuditRecord { memory_id: memory_id.to_string(), record, concepts, trail })
    }

    /// Every record of `owner_id`, archived ones included, oldest first.
    pub async fn audit_list(&self, owner_id: &str, limit: usize) -> EngineResult<Vec<MemoryRecord>> {
        if owner_id.trim().is_empty() {
            return Err(EngineError::invalid("owner_id must not be empty"));
        }
        let scan = RecordScan { owner_id: Some(owner_id.to_string()), limit, ..Default::default() };
        self.store.scan_records(&scan).await
    }

    /// Audit entries across all records, oldest first (0 = no limit).
    pub async fn audit_log(&self, limit: usize) -> EngineResult<Vec<AuditEntry>> {
        self.store.audit_entries(None, limit).await
    }

    pub async fn stats(&self) -> EngineResult<StoreStats> {
        self.store.stats().await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn run_decay_cycle(&self) -> EngineResult<DecayReport> {
        self.lifecycle.run_decay_cycle().await
    }

    pub async fn run_consolidation_cycle(&self) -> EngineResult<ConsolidationReport> {
        self.lifecycle.run_consolidation_cycle().await
    }

    pub async fn run_archival_cycle(&self) -> EngineResult<ArchivalReport> {
        self.lifecycle.run_archival_cycle().await
    }

    pub async fn run_sweep(&self) -> EngineResult<SweepReport> {
        self.lifecycle.run_sweep().await
    }

    pub async fn backfill_embeddings(&self, limit: usize) -> EngineResult<usize> {
        self.storage.backfill_embeddings(limit).await
    }

    /// Periodic sweeps every `lifecycle.sweep_interval_secs`.
    pub fn start_scheduler(&self) -> LifecycleScheduler {
        let period = std::time::Duration::from_secs(self.config.lifecycle.sweep_interval_secs);
        LifecycleScheduler::spawn(self.lifecycle.clone(), period)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Context snapshot resolution
    // ═══════════════════════════════════════════════════════════════════════

    async fn resolve_snapshot(&self, explicit: Option<ContextSnapshot>) -> Option<ContextSnapshot> {
        let candidate = match explicit {
            Some(s) => Some(s),
            None => match &self.context_provider {
                Some(p) => p.current_snapshot().await,
                None => None,
            },
        }?;
        if candidate.is_stale(Utc::now(), self.config.max_snapshot_age()) {
            debug!(
                "[engram] context snapshot from {} is stale, using defaults",
                candidate.timestamp
            );
            return Some(ContextSnapshot::default());
        }
        Some(candidate.normalized())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::traits::StaticContextProvider;
    use crate::atoms::types::{MemoryType, RetrievalStrategy};

    fn offline() -> MemorySubsystem {
        MemorySubsystem::from_config(MemoryConfig::offline()).unwrap()
    }

    #[tokio::test]
    async fn store_then_retrieve_end_to_end() {
        let s = offline();
        let id = s
            .store(NewMemory::new("The launch code phrase is bluebird", MemoryType::Interaction, "o1"))
            .await
            .unwrap();
        let results = s.retrieve(RetrievalRequest::new("bluebird", "o1")).await.unwrap();
        assert_eq!(results[0].memory_id, id);
        assert_eq!(s.metrics().stores, 1);
    }

    #[tokio::test]
    async fn provider_snapshot_applies_when_caller_passes_none() {
        let provider = StaticContextProvider::new(Some(ContextSnapshot::new(0.9, "focused")));
        let s = offline().with_context_provider(Arc::new(provider));
        let id = s.store(NewMemory::new("deep work block", MemoryType::Interaction, "o1")).await.unwrap();
        let r = s.audit_record(&id).await.unwrap().record.unwrap();
        assert_eq!(r.context_tag, "focused");
        assert_eq!(r.context_level, 0.9);
    }

    #[tokio::test]
    async fn stale_snapshot_falls_back_to_defaults() {
        let s = offline();
        let mut stale = ContextSnapshot::new(0.9, "focused");
        stale.timestamp = Utc::now() - chrono::Duration::hours(2);
        let id = s
            .store(NewMemory::new("old signal", MemoryType::Interaction, "o1").context(stale))
            .await
            .unwrap();
        let r = s.audit_record(&id).await.unwrap().record.unwrap();
        assert_eq!((r.context_level, r.context_tag.as_str()), (0.5, "neutral"));
    }

    #[tokio::test]
    async fn audit_list_includes_archived() {
        let s = offline();
        let a = s.store(NewMemory::new("x one", MemoryType::Interaction, "o1")).await.unwrap();
        s.store(NewMemory::new("x two", MemoryType::Interaction, "o1")).await.unwrap();
        let update = crate::atoms::types::RecordUpdate {
            state: Some(crate::atoms::types::RecordState::Archived),
            archived_at: Some(Utc::now()),
            ..crate::atoms::types::RecordUpdate::for_record(a.clone())
        };
        s.store.conditional_update(&update, 0).await.unwrap();

        assert_eq!(s.audit_list("o1", 0).await.unwrap().len(), 2);
        let visible = s
            .retrieve(RetrievalRequest::new("x", "o1").strategy(RetrievalStrategy::Keyword))
            .await
            .unwrap();
        assert!(visible.iter().all(|r| r.memory_id != a));
        assert_eq!(s.stats().await.unwrap().archived_records, 1);
    }
}
