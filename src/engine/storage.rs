// ── Engram: Storage Engine ─────────────────────────────────────────────────
//
// Validates and persists new memories.
//
// Pipeline per `store()`:
//   1. Validate input (empty content / owner → InvalidInput)
//   2. Significance score; initial importance = significance
//   3. Embedding (optional; failure or timeout → degraded, stored without)
//   4. Durable record write (failure → StorageUnavailable)
//   5. Concept extraction + linking (failure → degraded, record kept)
//   6. Audit entry (best effort)
//
// Only step 4 can fail the call. Everything after it is enrichment.

use chrono::Utc;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::atoms::constants::SYSTEM_ACTOR;
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::{GraphStore, UpdateOutcome};
use crate::atoms::types::{
    AuditEntry, AuditOperation, ContextSnapshot, MemoryRecord, NewMemory, RecordScan,
    RecordState, RecordUpdate,
};
use crate::engine::concepts::extract_concepts;
use crate::engine::embedding::EmbeddingClient;
use crate::engine::metrics::{Counter, MetricsRegistry};
use crate::engine::significance;
use crate::engine::store::bounded;

pub struct StorageEngine {
    store: Arc<dyn GraphStore>,
    embedder: EmbeddingClient,
    metrics: Arc<MetricsRegistry>,
    store_timeout: Duration,
}

impl StorageEngine {
    pub fn new(
        store: Arc<dyn GraphStore>,
        embedder: EmbeddingClient,
        metrics: Arc<MetricsRegistry>,
        store_timeout: Duration,
    ) -> Self {
        Self { store, embedder, metrics, store_timeout }
    }

    /// Persist a new memory and return its id.
    ///
    /// `input.context` must already be resolved by the caller; `None` stores
    /// the neutral defaults.
    pub async fn store(&self, input: NewMemory) -> EngineResult<String> {
        if input.content.trim().is_empty() {
            return Err(EngineError::invalid("content must not be empty"));
        }
        if input.owner_id.trim().is_empty() {
            return Err(EngineError::invalid("owner_id must not be empty"));
        }

        let snapshot = effective_snapshot(input.context.as_ref());
        let significance = significance::score(input.memory_type, &input.content);
        let now = Utc::now();
        let memory_id = uuid::Uuid::new_v4().to_string();

        let (embedding, embedding_model) = self.embed_or_degrade(&memory_id, &input.content).await;

        let record = MemoryRecord {
            memory_id: memory_id.clone(),
            content: input.content,
            memory_type: input.memory_type,
            owner_id: input.owner_id,
            agent_name: input.agent_name,
            context_level: snapshot.level,
            context_tag: snapshot.tag,
            importance_score: significance,
            significance_score: significance,
            embedding,
            embedding_model,
            created_at: now,
            last_importance_update: now,
            access_frequency: 0,
            last_accessed_at: None,
            accesses_since_sweep: 0,
            last_decay_at: None,
            state: RecordState::Active,
            archived_at: None,
            version: 0,
            metadata: input.metadata,
        };

        self.persist(&record).await?;
        self.link_concepts(&record).await;

        let audit = AuditEntry::new(AuditOperation::Store, &memory_id, &actor(&record))
            .detail(format!("type={} significance={:.2}", record.memory_type, significance));
        if let Err(e) = self.store.append_audit(&audit).await {
            warn!("[engram:storage] audit append failed for {}: {}", memory_id, e);
        }

        self.metrics.incr(Counter::Stores);
        info!(
            "[engram:storage] Stored {} ({}, owner={}, embedded={})",
            memory_id,
            record.memory_type,
            record.owner_id,
            record.embedding.is_some()
        );
        Ok(memory_id)
    }

    /// Durable write. The only failure `store()` surfaces after validation.
    async fn persist(&self, record: &MemoryRecord) -> EngineResult<()> {
        let result = bounded(
            "graph_store.insert_record",
            self.store_timeout,
            self.store.insert_record(record),
        )
        .await;
        if let Err(e) = result {
            self.metrics.incr(Counter::StorageFailures);
            warn!("[engram:storage] record write failed for {}: {}", record.memory_id, e);
            return Err(EngineError::StorageUnavailable(e.to_string()));
        }
        Ok(())
    }

    async fn embed_or_degrade(&self, memory_id: &str, content: &str) -> (Option<Vec<f32>>, Option<String>) {
        if !self.embedder.is_enabled() {
            return (None, None);
        }
        match self.embedder.embed(content).await {
            Ok(vec) => (Some(vec), self.embedder.model_name().map(str::to_string)),
            Err(e) => {
                self.metrics.incr(Counter::DegradedEmbeddings);
                warn!("[engram:storage] storing {} without embedding: {}", memory_id, e);
                (None, None)
            }
        }
    }

    async fn link_concepts(&self, record: &MemoryRecord) {
        let concepts = extract_concepts(&record.content);
        if concepts.is_empty() {
            return;
        }
        if let Err(e) = self.store.link_concepts(&record.memory_id, &concepts).await {
            self.metrics.incr(Counter::ConceptLinkFailures);
            warn!(
                "[engram:storage] concept link failed for {} ({} concepts): {}",
                record.memory_id,
                concepts.len(),
                e
            );
        }
    }

    /// Embed up to `limit` active records stored while embeddings were
    /// unavailable. Returns how many were updated.
    pub async fn backfill_embeddings(&self, limit: usize) -> EngineResult<usize> {
        if !self.embedder.is_enabled() {
            return Ok(0);
        }
        let scan = RecordScan { with_embedding: Some(false), limit, ..RecordScan::active() };
        let pending = self.store.scan_records(&scan).await?;
        let model = self.embedder.model_name().unwrap_or_default().to_string();

        let mut updated = 0usize;
        for record in pending {
            let vector = match self.embedder.embed(&record.content).await {
                Ok(v) => v,
                Err(e) => {
                    warn!("[engram:storage] backfill stopped at {}: {}", record.memory_id, e);
                    break;
                }
            };
            let update = RecordUpdate {
                embedding: Some((vector, model.clone())),
                ..RecordUpdate::for_record(record.memory_id.clone())
            };
            match self.store.conditional_update(&update, record.version).await? {
                UpdateOutcome::Applied(_) => {
                    updated += 1;
                    let entry = AuditEntry::new(
                        AuditOperation::EmbeddingBackfill,
                        &record.memory_id,
                        SYSTEM_ACTOR,
                    )
                    .detail(model.clone());
                    if let Err(e) = self.store.append_audit(&entry).await {
                        warn!("[engram:storage] audit append failed for {}: {}", record.memory_id, e);
                    }
                }
                UpdateOutcome::Conflict | UpdateOutcome::Missing => {
                    self.metrics.incr(Counter::LifecycleSkipped);
                }
            }
        }
        if updated > 0 {
            info!("[engram:storage] Backfilled embeddings for {} records", updated);
        }
        Ok(updated)
    }
}

fn actor(record: &MemoryRecord) -> String {
    if record.agent_name.is_empty() {
        record.owner_id.clone()
    } else {
        record.agent_name.clone()
    }
}

/// Snapshot that will be written for a caller-supplied (or missing) context.
fn effective_snapshot(snapshot: Option<&ContextSnapshot>) -> ContextSnapshot {
    snapshot.map(|s| s.normalized()).unwrap_or_default()
}
