// ── Engram Memory ──────────────────────────────────────────────────────────
//
// Durable experiential memory for AI agents: hybrid retrieval, budgeted
// context assembly, and background lifecycle management over a graph store.
//
// Layers:
//   atoms  : pure types, constants, errors, collaborator traits (no I/O)
//   engine : everything with side effects
//
// Most consumers only need `MemorySubsystem` and the request/response types
// re-exported below. The library logs through `log` and never installs a
// logger.

pub mod atoms;
pub mod engine;

pub use atoms::error::{EngineError, EngineResult};
pub use atoms::traits::{
    ContextStateProvider, EmbeddingProvider, GraphStore, StaticContextProvider, UpdateOutcome,
};
pub use atoms::types::{
    AuditEntry, AuditOperation, ContextPayload, ContextSnapshot, MatchedStrategy, MemoryMetadata,
    MemoryRecord, MemoryType, NewMemory, RecordState, RetrievalFilters, RetrievalRequest,
    RetrievalStrategy, SearchResult, StoreStats, TimeWindow,
};
pub use engine::config::MemoryConfig;
pub use engine::embedding::{EmbeddingClient, HashEmbedder, HttpEmbedder};
pub use engine::lifecycle::{
    ArchivalReport, ConsolidationReport, DecayReport, LifecycleScheduler, SweepReport,
};
pub use engine::metrics::MetricsSnapshot;
pub use engine::monitor::{ComponentHealth, HealthReport, HealthStatus};
pub use engine::store::{SimGraphStore, SqliteGraphStore};
pub use engine::subsystem::{AuditRecord, MemorySubsystem};
