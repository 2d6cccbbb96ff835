// ── Engram: System Monitor ─────────────────────────────────────────────────
//
// Read-only health probes and metric snapshots. Never mutates memory state.
//
// Components:
//   graph_store        : ping
//   vector_index       : availability of vector search
//   embedding_provider : one probe embedding
//   lifecycle          : outcome of the last cycle
//
// Every probe runs concurrently under the hard timeout. Slower than the
// soft timeout is `degraded`; past the hard timeout or failing is `down`,
// except for optional capabilities (vector index, embeddings) whose loss
// only degrades retrieval. Switched-off features report `disabled` and do
// not count toward the aggregate.

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::atoms::traits::GraphStore;
use crate::engine::config::MonitorSection;
use crate::engine::embedding::EmbeddingClient;
use crate::engine::lifecycle::LifecycleManager;
use crate::engine::metrics::{MetricsRegistry, MetricsSnapshot};

pub const GRAPH_STORE: &str = "graph_store";
pub const VECTOR_INDEX: &str = "vector_index";
pub const EMBEDDING_PROVIDER: &str = "embedding_provider";
pub const LIFECYCLE: &str = "lifecycle";

const PROBE_TEXT: &str = "engram health probe";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Down,
    Disabled,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Down => "down",
            HealthStatus::Disabled => "disabled",
        }
    }

    /// Ordering used for the aggregate. Disabled never wins.
    fn severity(&self) -> u8 {
        match self {
            HealthStatus::Disabled => 0,
            HealthStatus::Healthy => 1,
            HealthStatus::Degraded => 2,
            HealthStatus::Down => 3,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ComponentHealth {
    fn new(status: HealthStatus, latency: Duration, detail: Option<String>) -> Self {
        Self { status, latency_ms: latency.as_millis() as u64, detail }
    }

    fn disabled(detail: &str) -> Self {
        Self { status: HealthStatus::Disabled, latency_ms: 0, detail: Some(detail.to_string()) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: BTreeMap<String, ComponentHealth>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn component(&self, name: &str) -> Option<&ComponentHealth> {
        self.components.get(name)
    }
}

/// Worst non-disabled status; all disabled (or none) is healthy.
pub fn aggregate<'a>(statuses: impl IntoIterator<Item = &'a HealthStatus>) -> HealthStatus {
    statuses
        .into_iter()
        .filter(|s| **s != HealthStatus::Disabled)
        .copied()
        .max_by_key(|s| s.severity())
        .unwrap_or(HealthStatus::Healthy)
}

pub struct SystemMonitor {
    store: Arc<dyn GraphStore>,
    embedder: EmbeddingClient,
    lifecycle: Arc<LifecycleManager>,
    metrics: Arc<MetricsRegistry>,
    soft_timeout: Duration,
    hard_timeout: Duration,
}

/// Outcome of a timed probe.
enum Probe<T> {
    Done(T, Duration),
    TimedOut,
}

impl SystemMonitor {
    pub fn new(
        store: Arc<dyn GraphStore>,
        embedder: EmbeddingClient,
        lifecycle: Arc<LifecycleManager>,
        metrics: Arc<MetricsRegistry>,
        config: &MonitorSection,
    ) -> Self {
        Self {
            store,
            embedder,
            lifecycle,
            metrics,
            soft_timeout: Duration::from_millis(config.soft_timeout_ms),
            hard_timeout: Duration::from_millis(config.hard_timeout_ms),
        }
    }

    pub async fn health_check(&self) -> HealthReport {
        let (store, vector, embedding) =
            tokio::join!(self.probe_store(), self.probe_vector_index(), self.probe_embedding());
        let lifecycle = self.probe_lifecycle();

        let mut components = BTreeMap::new();
        components.insert(GRAPH_STORE.to_string(), store);
        components.insert(VECTOR_INDEX.to_string(), vector);
        components.insert(EMBEDDING_PROVIDER.to_string(), embedding);
        components.insert(LIFECYCLE.to_string(), lifecycle);

        let status = aggregate(components.values().map(|c| &c.status));
        if status != HealthStatus::Healthy {
            for (name, c) in &components {
                if matches!(c.status, HealthStatus::Degraded | HealthStatus::Down) {
                    warn!(
                        "[engram:monitor] {} is {} ({})",
                        name,
                        c.status,
                        c.detail.as_deref().unwrap_or("no detail")
                    );
                }
            }
        }
        HealthReport { status, components, checked_at: Utc::now() }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    async fn timed<T, F: Future<Output = T>>(&self, fut: F) -> Probe<T> {
        let started = Instant::now();
        match tokio::time::timeout(self.hard_timeout, fut).await {
            Ok(v) => Probe::Done(v, started.elapsed()),
            Err(_) => Probe::TimedOut,
        }
    }

    /// Healthy, or degraded when slower than the soft timeout.
    fn by_latency(&self, latency: Duration) -> (HealthStatus, Option<String>) {
        if latency > self.soft_timeout {
            (HealthStatus::Degraded, Some(format!("slow: {} ms", latency.as_millis())))
        } else {
            (HealthStatus::Healthy, None)
        }
    }

    fn timed_out(&self) -> ComponentHealth {
        ComponentHealth::new(
            HealthStatus::Down,
            self.hard_timeout,
            Some(format!("no response within {} ms", self.hard_timeout.as_millis())),
        )
    }

    async fn probe_store(&self) -> ComponentHealth {
        match self.timed(self.store.ping()).await {
            Probe::Done(Ok(()), latency) => {
                let (status, detail) = self.by_latency(latency);
                ComponentHealth::new(status, latency, detail)
            }
            Probe::Done(Err(e), latency) => {
                ComponentHealth::new(HealthStatus::Down, latency, Some(e.to_string()))
            }
            Probe::TimedOut => self.timed_out(),
        }
    }

    async fn probe_vector_index(&self) -> ComponentHealth {
        if !self.embedder.is_enabled() {
            return ComponentHealth::disabled("embeddings disabled");
        }
        match self.timed(self.store.vector_index_available()).await {
            Probe::Done(true, latency) => {
                let (status, detail) = self.by_latency(latency);
                ComponentHealth::new(status, latency, detail)
            }
            Probe::Done(false, latency) => ComponentHealth::new(
                HealthStatus::Degraded,
                latency,
                Some("vector search unavailable, keyword fallback active".into()),
            ),
            Probe::TimedOut => self.timed_out(),
        }
    }

    async fn probe_embedding(&self) -> ComponentHealth {
        if !self.embedder.is_enabled() {
            return ComponentHealth::disabled("embeddings disabled");
        }
        match self.timed(self.embedder.embed(PROBE_TEXT)).await {
            Probe::Done(Ok(_), latency) => {
                let (status, detail) = self.by_latency(latency);
                let detail = detail.or_else(|| self.embedder.model_name().map(str::to_string));
                ComponentHealth::new(status, latency, detail)
            }
            Probe::Done(Err(e), latency) => {
                ComponentHealth::new(HealthStatus::Degraded, latency, Some(e.to_string()))
            }
            Probe::TimedOut => self.timed_out(),
        }
    }

    fn probe_lifecycle(&self) -> ComponentHealth {
        match self.lifecycle.last_error() {
            Some(e) => ComponentHealth::new(
                HealthStatus::Degraded,
                Duration::ZERO,
                Some(format!("last cycle failed: {e}")),
            ),
            None => ComponentHealth::new(
                HealthStatus::Healthy,
                Duration::ZERO,
                self.lifecycle.is_running().then(|| "cycle in progress".to_string()),
            ),
        }
    }
}
