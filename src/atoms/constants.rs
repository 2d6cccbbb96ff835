// ── Engram Atoms: Constants ────────────────────────────────────────────────
// All named constants for the crate live here.
// Every value below is a default; the live value comes from `MemoryConfig`.
// The decay/boost percentages and the consolidation threshold are empirically
// chosen starting points, expected to be tuned per deployment.

// ── Context snapshot defaults ──────────────────────────────────────────────
// Applied whenever a caller (or the context-state provider) supplies nothing.
pub const DEFAULT_CONTEXT_LEVEL: f64 = 0.5;
pub const DEFAULT_CONTEXT_TAG: &str = "neutral";
/// Snapshots older than this are treated as missing.
pub const DEFAULT_MAX_SNAPSHOT_AGE_SECS: i64 = 15 * 60;

// ── External I/O timeouts ──────────────────────────────────────────────────
pub const DEFAULT_EMBEDDING_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;

// ── Retrieval ranking ──────────────────────────────────────────────────────
pub const DEFAULT_CONTEXT_TAG_BOOST: f64 = 1.2;
pub const DEFAULT_CONTEXT_LEVEL_PENALTY: f64 = 0.3;
pub const DEFAULT_OVERLAP_BONUS: f64 = 0.2;
pub const DEFAULT_RETRIEVAL_LIMIT: usize = 10;
/// Candidates pulled from each strategy before merge / re-rank / cut.
pub const DEFAULT_CANDIDATE_POOL: usize = 50;
pub const DEFAULT_TEMPORAL_HALF_LIFE_HOURS: f64 = 72.0;
pub const DEFAULT_TEMPORAL_WINDOW_DAYS: i64 = 7;

/// Keyword score = coverage * KEYWORD_COVERAGE_WEIGHT + density * (1 - weight).
pub const KEYWORD_COVERAGE_WEIGHT: f64 = 0.85;

// ── Context builder ───────────────────────────────────────────────────────
pub const DEFAULT_CONTEXT_RETRIEVAL_LIMIT: usize = 20;

// ── Lifecycle: decay ──────────────────────────────────────────────────────
pub const DEFAULT_DECAY_RATE: f64 = 0.02;
pub const DEFAULT_DECAY_IDLE_DAYS: i64 = 7;
pub const DEFAULT_ACCESS_BOOST: f64 = 0.01;
pub const DEFAULT_ACCESS_BOOST_CAP: f64 = 0.10;
pub const DEFAULT_MIN_SWEEP_INTERVAL_SECS: i64 = 3_600;

// ── Lifecycle: consolidation ──────────────────────────────────────────────
pub const DEFAULT_CONSOLIDATION_THRESHOLD: f64 = 0.92;
pub const DEFAULT_CONSOLIDATION_WINDOW_SECS: i64 = 3_600;
pub const MIN_CONSOLIDATION_CLUSTER: usize = 2;

// ── Lifecycle: archival ───────────────────────────────────────────────────
pub const DEFAULT_ARCHIVE_IMPORTANCE_FLOOR: f64 = 0.05;
pub const DEFAULT_ARCHIVE_IDLE_DAYS: i64 = 90;
pub const DEFAULT_HARD_DELETE_AFTER_DAYS: i64 = 365;

// ── Lifecycle: scheduling ─────────────────────────────────────────────────
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3_600;
pub const DEFAULT_LIFECYCLE_BATCH_SIZE: usize = 500;

// ── Monitor ───────────────────────────────────────────────────────────────
pub const DEFAULT_MONITOR_SOFT_TIMEOUT_MS: u64 = 1_000;
pub const DEFAULT_MONITOR_HARD_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_LATENCY_WINDOW: usize = 1_024;

// ── Storage ───────────────────────────────────────────────────────────────
/// Upper bound on concepts linked per memory.
pub const MAX_CONCEPTS_PER_MEMORY: usize = 8;
/// Dimensions of the built-in hashing embedder.
pub const HASH_EMBEDDING_DIMS: usize = 256;

/// Actor recorded in the audit trail for lifecycle mutations.
pub const SYSTEM_ACTOR: &str = "system";
