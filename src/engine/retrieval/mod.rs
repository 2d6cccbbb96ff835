// ── Engram: Retrieval Engine ───────────────────────────────────────────────
//
// Strategy dispatch, filtering, context re-ranking and the final cut.
//
// Pipeline per `retrieve()`:
//   1. Validate (empty owner, empty query for non-temporal, limit 0,
//      negative / non-finite min_score → InvalidInput)
//   2. Candidate generation per strategy (semantic / keyword / temporal /
//      hybrid). Type, agent and window filters go down to the store so the
//      candidate pool holds only admissible records. Semantic plans explicitly: a missing provider, a failed
//      embedding or an unusable vector index all become a keyword
//      fallback tagged `fallback_keyword`.
//   3. Filters re-checked (type, agent, window)
//   4. Context re-rank when a snapshot is in effect
//   5. min_score, deterministic sort, limit
//   6. Access statistics for the returned ids, applied in the background
//
// A graph store that cannot be reached surfaces as RetrievalUnavailable.
//
// Module layout:
//   keyword  : query terms + coverage/density scoring
//   temporal : recency decay
//   hybrid   : semantic ∪ keyword merge with overlap bonus
//   rerank   : context tag boost / level penalty

pub mod hybrid;
pub mod keyword;
pub mod rerank;
pub mod temporal;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::GraphStore;
use crate::atoms::types::{
    MatchedStrategy, MemoryRecord, RetrievalRequest, RetrievalStrategy, SearchResult, TimeWindow,
};
use crate::engine::config::RetrievalSection;
use crate::engine::embedding::EmbeddingClient;
use crate::engine::metrics::{Counter, MetricsRegistry};
use crate::engine::store::bounded;

pub use keyword::{keyword_score, query_terms};
pub use rerank::RerankWeights;

/// A candidate with its working score.
#[derive(Debug, Clone)]
pub struct Scored {
    pub record: MemoryRecord,
    pub score: f64,
    pub matched: MatchedStrategy,
}

/// How the semantic arm will run for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum SemanticPlan {
    /// Query embedded; search the vector index.
    Vector(Vec<f32>),
    /// Vector search not possible; the reason is logged and the keyword
    /// path stands in.
    Fallback(String),
}

/// Background access-stat writes, kept so callers can wait for them.
#[derive(Default)]
struct AccessTracker {
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl AccessTracker {
    fn track(&self, handle: JoinHandle<()>) {
        let mut pending = self.pending.lock();
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    async fn settle(&self) {
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.pending.lock());
        for h in handles {
            let _ = h.await;
        }
    }
}

pub struct RetrievalEngine {
    store: Arc<dyn GraphStore>,
    embedder: EmbeddingClient,
    metrics: Arc<MetricsRegistry>,
    config: RetrievalSection,
    store_timeout: Duration,
    access: AccessTracker,
}

impl RetrievalEngine {
    pub fn new(
        store: Arc<dyn GraphStore>,
        embedder: EmbeddingClient,
        metrics: Arc<MetricsRegistry>,
        config: RetrievalSection,
        store_timeout: Duration,
    ) -> Self {
        Self { store, embedder, metrics, config, store_timeout, access: AccessTracker::default() }
    }

    pub fn config(&self) -> &RetrievalSection {
        &self.config
    }

    /// Ranked results for `request`, best first.
    pub async fn retrieve(&self, request: &RetrievalRequest) -> EngineResult<Vec<SearchResult>> {
        validate(request)?;
        let started = Instant::now();

        let result = match request.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.run(request)).await {
                Ok(r) => r,
                Err(_) => Err(EngineError::timeout("retrieve", limit)),
            },
            None => self.run(request).await,
        };

        self.metrics.record_latency(started.elapsed());
        match &result {
            Ok(results) => {
                self.metrics.incr(Counter::Retrievals);
                debug!(
                    "[engram:retrieval] {} results for owner={} strategy={} in {:?}",
                    results.len(),
                    request.owner_id,
                    request.strategy,
                    started.elapsed()
                );
            }
            Err(e) => {
                self.metrics.incr(Counter::RetrievalFailures);
                warn!("[engram:retrieval] retrieve failed for owner={}: {}", request.owner_id, e);
            }
        }
        result
    }

    /// Wait for every background access-stat write issued so far.
    pub async fn settle_access_updates(&self) {
        self.access.settle().await;
    }

    async fn run(&self, request: &RetrievalRequest) -> EngineResult<Vec<SearchResult>> {
        let now = Utc::now();
        let candidates = match request.strategy {
            RetrievalStrategy::Semantic => self.semantic(request).await?,
            RetrievalStrategy::Keyword => tag(self.keyword(request).await?, MatchedStrategy::Keyword),
            RetrievalStrategy::Temporal => self.temporal(request, now).await?,
            RetrievalStrategy::Hybrid => self.hybrid(request).await?,
        };

        let ranked = self.rank(request, candidates);
        let results: Vec<SearchResult> = ranked
            .iter()
            .map(|s| SearchResult::from_record(&s.record, s.score, s.matched))
            .collect();

        if !results.is_empty() {
            self.spawn_access_update(results.iter().map(|r| r.memory_id.clone()).collect(), now);
        }
        Ok(results)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Strategies
    // ═══════════════════════════════════════════════════════════════════════

    /// Decide whether the semantic arm can run for `query`.
    pub async fn plan_semantic(&self, query: &str) -> SemanticPlan {
        if !self.embedder.is_enabled() {
            return SemanticPlan::Fallback("embeddings disabled".into());
        }
        if !self.store.vector_index_available().await {
            return SemanticPlan::Fallback("vector index unavailable".into());
        }
        match self.embedder.embed(query).await {
            Ok(v) => SemanticPlan::Vector(v),
            Err(e) => SemanticPlan::Fallback(e.to_string()),
        }
    }

    /// Vector candidates, or the reason vector search could not run.
    async fn semantic_candidates(
        &self,
        request: &RetrievalRequest,
    ) -> Result<Vec<(MemoryRecord, f64)>, String> {
        let query = match self.plan_semantic(&request.query).await {
            SemanticPlan::Vector(v) => v,
            SemanticPlan::Fallback(reason) => return Err(reason),
        };
        let hits = bounded(
            "graph_store.vector_top_k",
            self.store_timeout,
            self.store.vector_top_k(&request.owner_id, &query, &request.filters, self.pool(request)),
        )
        .await
        .map_err(|e| format!("vector search failed: {e}"))?;

        Ok(hits
            .into_iter()
            .map(|(r, sim)| (r, sim.clamp(0.0, 1.0)))
            .filter(|(_, s)| *s > 0.0)
            .collect())
    }

    async fn semantic(&self, request: &RetrievalRequest) -> EngineResult<Vec<Scored>> {
        match self.semantic_candidates(request).await {
            Ok(hits) => Ok(tag(hits, MatchedStrategy::Semantic)),
            Err(reason) => self.fallback(request, &reason).await,
        }
    }

    async fn fallback(&self, request: &RetrievalRequest, reason: &str) -> EngineResult<Vec<Scored>> {
        self.metrics.incr(Counter::FallbackKeyword);
        warn!(
            "[engram:retrieval] semantic unavailable for owner={} ({}), using keyword",
            request.owner_id, reason
        );
        Ok(tag(self.keyword(request).await?, MatchedStrategy::FallbackKeyword))
    }

    async fn keyword(&self, request: &RetrievalRequest) -> EngineResult<Vec<(MemoryRecord, f64)>> {
        let terms = query_terms(&request.query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let candidates = bounded(
            "graph_store.keyword_candidates",
            self.store_timeout,
            self.store.keyword_candidates(
                &request.owner_id,
                &terms,
                &request.filters,
                self.pool(request),
            ),
        )
        .await
        .map_err(unavailable)?;

        Ok(candidates
            .into_iter()
            .filter_map(|r| {
                let s = keyword_score(&r.content, &terms);
                (s > 0.0).then_some((r, s))
            })
            .collect())
    }

    async fn temporal(&self, request: &RetrievalRequest, now: DateTime<Utc>) -> EngineResult<Vec<Scored>> {
        let window = request.filters.time_window.unwrap_or_else(|| {
            TimeWindow::new(now - chrono::Duration::days(self.config.default_temporal_window_days), now)
        });
        let records = bounded(
            "graph_store.list_in_window",
            self.store_timeout,
            self.store.list_in_window(
                &request.owner_id,
                window.start,
                window.end,
                &request.filters,
                self.pool(request),
            ),
        )
        .await
        .map_err(unavailable)?;

        let half_life = self.config.temporal_half_life_hours;
        Ok(records
            .into_iter()
            .map(|r| {
                let score = temporal::recency_score(r.created_at, now, half_life);
                Scored { record: r, score, matched: MatchedStrategy::Temporal }
            })
            .collect())
    }

    /// Semantic and keyword arms run concurrently, then merge.
    async fn hybrid(&self, request: &RetrievalRequest) -> EngineResult<Vec<Scored>> {
        let (semantic, keyword) =
            tokio::join!(self.semantic_candidates(request), self.keyword(request));
        let keyword = keyword?;
        match semantic {
            Ok(semantic) => Ok(hybrid::merge(semantic, keyword, self.config.overlap_bonus)),
            Err(reason) => {
                self.metrics.incr(Counter::FallbackKeyword);
                warn!(
                    "[engram:retrieval] hybrid without vectors for owner={} ({})",
                    request.owner_id, reason
                );
                Ok(tag(keyword, MatchedStrategy::FallbackKeyword))
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Ranking
    // ═══════════════════════════════════════════════════════════════════════

    fn rank(&self, request: &RetrievalRequest, candidates: Vec<Scored>) -> Vec<Scored> {
        let weights = RerankWeights {
            tag_boost: self.config.context_tag_boost,
            level_penalty: self.config.context_level_penalty,
        };
        let snapshot = request.filters.context.as_ref().map(|s| s.normalized());

        let mut ranked: Vec<Scored> = candidates
            .into_iter()
            .filter(|s| s.record.is_active() && s.record.owner_id == request.owner_id)
            .filter(|s| request.filters.admits(&s.record))
            .map(|mut s| {
                if let Some(snap) = &snapshot {
                    s.score = weights.apply(s.score, &s.record, snap);
                }
                s
            })
            .filter(|s| s.score >= request.min_score)
            .collect();

        ranked.sort_by(rank_order);
        ranked.truncate(request.limit);
        ranked
    }

    fn pool(&self, request: &RetrievalRequest) -> usize {
        self.config.candidate_pool.max(request.limit)
    }

    fn spawn_access_update(&self, ids: Vec<String>, at: DateTime<Utc>) {
        let store = self.store.clone();
        let metrics = self.metrics.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = store.record_access(&ids, at).await {
                metrics.incr(Counter::AccessUpdateFailures);
                warn!("[engram:retrieval] access update for {} records failed: {}", ids.len(), e);
            }
        });
        self.access.track(handle);
    }
}

fn validate(request: &RetrievalRequest) -> EngineResult<()> {
    if request.owner_id.trim().is_empty() {
        return Err(EngineError::invalid("owner_id must not be empty"));
    }
    if request.strategy != RetrievalStrategy::Temporal && request.query.trim().is_empty() {
        return Err(EngineError::invalid("query must not be empty"));
    }
    if request.limit == 0 {
        return Err(EngineError::invalid("limit must be at least 1"));
    }
    if !request.min_score.is_finite() || request.min_score < 0.0 {
        return Err(EngineError::invalid(format!(
            "min_score must be a non-negative number, got {}",
            request.min_score
        )));
    }
    if let Some(w) = &request.filters.time_window {
        if w.start > w.end {
            return Err(EngineError::invalid("time window start is after its end"));
        }
    }
    Ok(())
}

fn unavailable(e: EngineError) -> EngineError {
    EngineError::RetrievalUnavailable(e.to_string())
}

fn tag(hits: Vec<(MemoryRecord, f64)>, matched: MatchedStrategy) -> Vec<Scored> {
    hits.into_iter().map(|(record, score)| Scored { record, score, matched }).collect()
}

/// Score desc, importance desc, newest first, then id for a total order.
pub fn rank_order(a: &Scored, b: &Scored) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.record.importance_score.total_cmp(&a.record.importance_score))
        .then_with(|| b.record.created_at.cmp(&a.record.created_at))
        .then_with(|| a.record.memory_id.cmp(&b.record.memory_id))
}
