// ── Engram Engine Layer ────────────────────────────────────────────────────
// Everything with side effects: graph-store backends, embedding providers,
// the storage / retrieval / context / lifecycle / monitor components, and
// the MemorySubsystem facade that wires them together.

pub mod concepts;
pub mod config;
pub mod context_builder;
pub mod embedding;
pub mod lifecycle;
pub mod metrics;
pub mod monitor;
pub mod retrieval;
pub mod significance;
pub mod storage;
pub mod store;
pub mod subsystem;
pub mod tokenizer;
