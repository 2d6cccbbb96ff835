// ── Engram Atoms: Memory Subsystem Types ───────────────────────────────────
//
// Pure data types for the memory subsystem (no logic beyond validation and
// small conversions, no DB access, no I/O).
//
// Follows the project pattern: structs in atoms/, impls in engine/.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::atoms::constants::{DEFAULT_CONTEXT_LEVEL, DEFAULT_CONTEXT_TAG};
use crate::atoms::error::EngineError;

// ═══════════════════════════════════════════════════════════════════════════
// SECTION 1: Memory Records
// ═══════════════════════════════════════════════════════════════════════════

/// What produced a memory record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// A routine exchange with a user or another agent.
    Interaction,
    /// An agent's own reflection on past events.
    Reflection,
    /// Produced by the lifecycle manager from near-duplicate records.
    Consolidated,
    /// Emitted by the platform itself.
    System,
}

impl MemoryType {
    pub const ALL: [MemoryType; 4] = [
        MemoryType::Interaction,
        MemoryType::Reflection,
        MemoryType::Consolidated,
        MemoryType::System,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Interaction => "interaction",
            MemoryType::Reflection => "reflection",
            MemoryType::Consolidated => "consolidated",
            MemoryType::System => "system",
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "interaction" => Ok(MemoryType::Interaction),
            "reflection" => Ok(MemoryType::Reflection),
            "consolidated" => Ok(MemoryType::Consolidated),
            "system" => Ok(MemoryType::System),
            other => Err(EngineError::invalid(format!("unknown memory_type '{other}'"))),
        }
    }
}

/// Soft-delete state. Archived records are excluded from retrieval but kept
/// for audit until the hard-delete retention window passes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    #[default]
    Active,
    Archived,
}

impl RecordState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordState::Active => "active",
            RecordState::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "archived" => RecordState::Archived,
            _ => RecordState::Active,
        }
    }
}

/// Auxiliary attributes of a memory.
///
/// Known keys are typed fields; `extra` is reserved for genuinely open-ended
/// attributes. A `BTreeMap` keeps serialization order stable.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MemoryMetadata {
    /// Conversation / request session that produced the memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Free-form origin label (channel, tool name, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Caller-supplied tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// On a consolidated record: the originals it replaced.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consolidated_from: Vec<String>,
    /// On an archived original: the consolidated record that replaced it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consolidated_into: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A persisted unit of experiential content with scoring metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryRecord {
    pub memory_id: String,
    pub content: String,
    pub memory_type: MemoryType,
    pub owner_id: String,
    pub agent_name: String,
    /// Context level at creation time (0.0-1.0). Immutable.
    pub context_level: f64,
    /// Context label at creation time. Immutable.
    pub context_tag: String,
    /// Mutable, decays over time. Always within [0, 1].
    pub importance_score: f64,
    /// Inherent importance assigned at creation. Immutable.
    pub significance_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_importance_update: DateTime<Utc>,
    pub access_frequency: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed_at: Option<DateTime<Utc>>,
    /// Retrieval hits since the last decay sweep looked at this record.
    #[serde(default)]
    pub accesses_since_sweep: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_decay_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub state: RecordState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    /// Optimistic-concurrency counter, bumped by the store on every mutation.
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub metadata: MemoryMetadata,
}

impl MemoryRecord {
    pub fn is_active(&self) -> bool {
        self.state == RecordState::Active
    }

    pub fn has_embedding(&self) -> bool {
        self.embedding.as_ref().is_some_and(|e| !e.is_empty())
    }

    /// Most recent moment this record was touched by a reader, or its
    /// creation time if it has never been read.
    pub fn last_touched(&self) -> DateTime<Utc> {
        self.last_accessed_at.unwrap_or(self.created_at)
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            level: self.context_level,
            tag: self.context_tag.clone(),
            timestamp: self.created_at,
        }
    }
}

/// Clamp a score into [0, 1]; NaN collapses to 0.
pub fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// Input to `store()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMemory {
    pub content: String,
    pub memory_type: MemoryType,
    pub owner_id: String,
    pub agent_name: String,
    /// Producing context. `None` applies the neutral defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextSnapshot>,
    #[serde(default)]
    pub metadata: MemoryMetadata,
}

impl NewMemory {
    pub fn new(
        content: impl Into<String>,
        memory_type: MemoryType,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            memory_type,
            owner_id: owner_id.into(),
            agent_name: String::new(),
            context: None,
            metadata: MemoryMetadata::default(),
        }
    }

    pub fn agent(mut self, agent_name: impl Into<String>) -> Self {
        self.agent_name = agent_name.into();
        self
    }

    pub fn context(mut self, snapshot: ContextSnapshot) -> Self {
        self.context = Some(snapshot);
        self
    }

    pub fn metadata(mut self, metadata: MemoryMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SECTION 2: Concepts & Context Snapshots
// ═══════════════════════════════════════════════════════════════════════════

/// Edge between a memory and a shared, named concept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConceptLink {
    pub memory_id: String,
    pub concept: String,
}

/// Point-in-time context signal supplied by the context-state provider.
/// Read-only here; never mutated by the subsystem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextSnapshot {
    /// 0.0-1.0 activation level.
    pub level: f64,
    /// Free-form label such as an emotional or operational state.
    pub tag: String,
    pub timestamp: DateTime<Utc>,
}

impl ContextSnapshot {
    /// Build a snapshot stamped now. Level is clamped, tag normalized.
    pub fn new(level: f64, tag: impl Into<String>) -> Self {
        Self {
            level: clamp_unit(level),
            tag: normalize_tag(&tag.into()),
            timestamp: Utc::now(),
        }
    }

    /// The same snapshot with level clamped and tag normalized.
    pub fn normalized(&self) -> Self {
        let tag = normalize_tag(&self.tag);
        Self {
            level: clamp_unit(self.level),
            tag: if tag.is_empty() { DEFAULT_CONTEXT_TAG.to_string() } else { tag },
            timestamp: self.timestamp,
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now - self.timestamp > max_age
    }
}

impl Default for ContextSnapshot {
    fn default() -> Self {
        Self {
            level: DEFAULT_CONTEXT_LEVEL,
            tag: DEFAULT_CONTEXT_TAG.to_string(),
            timestamp: Utc::now(),
        }
    }
}

fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}

// ═══════════════════════════════════════════════════════════════════════════
// SECTION 3: Retrieval
// ═══════════════════════════════════════════════════════════════════════════

/// Ranking strategy requested by a caller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    Semantic,
    Keyword,
    Temporal,
    #[default]
    Hybrid,
}

impl RetrievalStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalStrategy::Semantic => "semantic",
            RetrievalStrategy::Keyword => "keyword",
            RetrievalStrategy::Temporal => "temporal",
            RetrievalStrategy::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for RetrievalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetrievalStrategy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "semantic" => Ok(RetrievalStrategy::Semantic),
            "keyword" => Ok(RetrievalStrategy::Keyword),
            "temporal" => Ok(RetrievalStrategy::Temporal),
            "hybrid" => Ok(RetrievalStrategy::Hybrid),
            other => Err(EngineError::invalid(format!("unknown retrieval strategy '{other}'"))),
        }
    }
}

/// Which path actually produced a result. `FallbackKeyword` marks results a
/// semantic (or hybrid) request obtained via keyword search because vector
/// search was unavailable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MatchedStrategy {
    Semantic,
    Keyword,
    Temporal,
    Hybrid,
    FallbackKeyword,
}

impl MatchedStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchedStrategy::Semantic => "semantic",
            MatchedStrategy::Keyword => "keyword",
            MatchedStrategy::Temporal => "temporal",
            MatchedStrategy::Hybrid => "hybrid",
            MatchedStrategy::FallbackKeyword => "fallback_keyword",
        }
    }
}

impl fmt::Display for MatchedStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive time range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The window ending now and reaching `span` into the past.
    pub fn last(span: Duration) -> Self {
        let end = Utc::now();
        Self { start: end - span, end }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t <= self.end
    }
}

/// Optional narrowing of a retrieval.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalFilters {
    /// Empty = all types.
    #[serde(default)]
    pub memory_types: Vec<MemoryType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    /// Applies to every strategy; the temporal strategy also uses it as its window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window: Option<TimeWindow>,
    /// Current context, used for context-aware re-ranking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextSnapshot>,
}

impl RetrievalFilters {
    pub fn with_context(mut self, snapshot: ContextSnapshot) -> Self {
        self.context = Some(snapshot);
        self
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.time_window = Some(window);
        self
    }

    pub fn with_types(mut self, types: impl IntoIterator<Item = MemoryType>) -> Self {
        self.memory_types = types.into_iter().collect();
        self
    }

    /// Whether a record passes the non-ranking filters.
    pub fn admits(&self, record: &MemoryRecord) -> bool {
        if !self.memory_types.is_empty() && !self.memory_types.contains(&record.memory_type) {
            return false;
        }
        if let Some(agent) = &self.agent_name {
            if &record.agent_name != agent {
                return false;
            }
        }
        if let Some(window) = &self.time_window {
            if !window.contains(record.created_at) {
                return false;
            }
        }
        true
    }
}

/// A full retrieval call.
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub query: String,
    pub owner_id: String,
    pub filters: RetrievalFilters,
    pub strategy: RetrievalStrategy,
    pub limit: usize,
    pub min_score: f64,
    /// Caller deadline for the whole call.
    pub timeout: Option<std::time::Duration>,
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            owner_id: owner_id.into(),
            filters: RetrievalFilters::default(),
            strategy: RetrievalStrategy::default(),
            limit: crate::atoms::constants::DEFAULT_RETRIEVAL_LIMIT,
            min_score: 0.0,
            timeout: None,
        }
    }

    pub fn strategy(mut self, strategy: RetrievalStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn filters(mut self, filters: RetrievalFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn context(mut self, snapshot: ContextSnapshot) -> Self {
        self.filters.context = Some(snapshot);
        self
    }

    pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// One ranked hit. Ephemeral: produced per query, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub memory_id: String,
    pub content: String,
    pub score: f64,
    pub matched_strategy: MatchedStrategy,
    pub memory_type: MemoryType,
    pub importance_score: f64,
    pub created_at: DateTime<Utc>,
    pub context_tag: String,
    pub context_level: f64,
    pub agent_name: String,
    pub metadata: MemoryMetadata,
}

impl SearchResult {
    pub fn from_record(record: &MemoryRecord, score: f64, matched: MatchedStrategy) -> Self {
        Self {
            memory_id: record.memory_id.clone(),
            content: record.content.clone(),
            score,
            matched_strategy: matched,
            memory_type: record.memory_type,
            importance_score: record.importance_score,
            created_at: record.created_at,
            context_tag: record.context_tag.clone(),
            context_level: record.context_level,
            agent_name: record.agent_name.clone(),
            metadata: record.metadata.clone(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SECTION 4: Context Payload
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextItem {
    pub memory_id: String,
    pub content: String,
    pub memory_type: MemoryType,
    pub score: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContextHeader {
    /// Items that made it into the payload.
    pub included: usize,
    /// Items retrieval offered.
    pub available: usize,
    /// True when the budget cut at least one available item.
    pub truncated: bool,
    pub token_budget: usize,
    pub tokens_used: usize,
}

/// Size-bounded, ordered context for a consumer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContextPayload {
    pub header: ContextHeader,
    pub items: Vec<ContextItem>,
}

impl ContextPayload {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SECTION 5: Store-level queries, updates, audit
// ═══════════════════════════════════════════════════════════════════════════

/// Selection used by lifecycle sweeps and audit listing.
#[derive(Debug, Clone, Default)]
pub struct RecordScan {
    pub state: Option<RecordState>,
    pub owner_id: Option<String>,
    /// Empty = all types.
    pub memory_types: Vec<MemoryType>,
    pub created_before: Option<DateTime<Utc>>,
    pub archived_before: Option<DateTime<Utc>>,
    /// `Some(true)` = only embedded, `Some(false)` = only un-embedded.
    pub with_embedding: Option<bool>,
    /// Keyset cursor: only records strictly after this `(created_at, memory_id)`.
    pub after: Option<(DateTime<Utc>, String)>,
    /// 0 = unbounded.
    pub limit: usize,
}

impl RecordScan {
    pub fn active() -> Self {
        Self { state: Some(RecordState::Active), ..Default::default() }
    }

    pub fn archived() -> Self {
        Self { state: Some(RecordState::Archived), ..Default::default() }
    }

    /// The same selection, `limit` rows per page.
    pub fn paged(mut self, page_size: usize) -> Self {
        self.limit = page_size.max(1);
        self.after = None;
        self
    }

    /// Move the cursor past the last record of a page.
    pub fn advance(&mut self, last: &MemoryRecord) {
        self.after = Some((last.created_at, last.memory_id.clone()));
    }

    pub fn matches(&self, r: &MemoryRecord) -> bool {
        if let Some(state) = self.state {
            if r.state != state {
                return false;
            }
        }
        if let Some(owner) = &self.owner_id {
            if &r.owner_id != owner {
                return false;
            }
        }
        if !self.memory_types.is_empty() && !self.memory_types.contains(&r.memory_type) {
            return false;
        }
        if let Some(before) = self.created_before {
            if r.created_at >= before {
                return false;
            }
        }
        if let Some(before) = self.archived_before {
            match r.archived_at {
                Some(at) if at < before => {}
                _ => return false,
            }
        }
        if let Some(want) = self.with_embedding {
            if r.has_embedding() != want {
                return false;
            }
        }
        if let Some((at, id)) = &self.after {
            if (r.created_at, &r.memory_id) <= (*at, id) {
                return false;
            }
        }
        true
    }
}

/// Partial mutation applied by `conditional_update`. `None` leaves a field as-is.
#[derive(Debug, Clone, Default)]
pub struct RecordUpdate {
    pub memory_id: String,
    pub importance_score: Option<f64>,
    pub last_importance_update: Option<DateTime<Utc>>,
    pub access_frequency: Option<u64>,
    pub accesses_since_sweep: Option<u32>,
    pub last_decay_at: Option<DateTime<Utc>>,
    pub state: Option<RecordState>,
    pub archived_at: Option<DateTime<Utc>>,
    pub metadata: Option<MemoryMetadata>,
    pub embedding: Option<(Vec<f32>, String)>,
}

impl RecordUpdate {
    pub fn for_record(memory_id: impl Into<String>) -> Self {
        Self { memory_id: memory_id.into(), ..Default::default() }
    }
}

/// Kinds of auditable memory operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    Store,
    Decay,
    Consolidate,
    Archive,
    HardDelete,
    EmbeddingBackfill,
}

impl AuditOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOperation::Store => "store",
            AuditOperation::Decay => "decay",
            AuditOperation::Consolidate => "consolidate",
            AuditOperation::Archive => "archive",
            AuditOperation::HardDelete => "hard_delete",
            AuditOperation::EmbeddingBackfill => "embedding_backfill",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "store" => AuditOperation::Store,
            "decay" => AuditOperation::Decay,
            "consolidate" => AuditOperation::Consolidate,
            "archive" => AuditOperation::Archive,
            "hard_delete" => AuditOperation::HardDelete,
            "embedding_backfill" => AuditOperation::EmbeddingBackfill,
            _ => return None,
        })
    }
}

/// An entry in the append-only audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub operation: AuditOperation,
    pub memory_id: String,
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(operation: AuditOperation, memory_id: &str, actor: &str) -> Self {
        Self {
            operation,
            memory_id: memory_id.to_string(),
            actor: actor.to_string(),
            detail: None,
            timestamp: Utc::now(),
        }
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Quick counts across the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreStats {
    pub active_records: usize,
    pub archived_records: usize,
    pub without_embedding: usize,
    pub concepts: usize,
    pub concept_links: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_parses_case_insensitively() {
        assert_eq!("HYBRID".parse::<RetrievalStrategy>().unwrap(), RetrievalStrategy::Hybrid);
        assert_eq!(" semantic ".parse::<RetrievalStrategy>().unwrap(), RetrievalStrategy::Semantic);
        assert!(matches!(
            "fuzzy".parse::<RetrievalStrategy>(),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn matched_strategy_serializes_fallback_tag() {
        let json = serde_json::to_string(&MatchedStrategy::FallbackKeyword).unwrap();
        assert_eq!(json, "\"fallback_keyword\"");
    }

    #[test]
    fn snapshot_normalizes_level_and_tag() {
        let s = ContextSnapshot::new(1.7, "  Curious ");
        assert_eq!(s.level, 1.0);
        assert_eq!(s.tag, "curious");
        let blank = ContextSnapshot { level: -2.0, tag: "  ".into(), timestamp: Utc::now() };
        let n = blank.normalized();
        assert_eq!(n.level, 0.0);
        assert_eq!(n.tag, DEFAULT_CONTEXT_TAG);
    }

    #[test]
    fn snapshot_staleness() {
        let mut s = ContextSnapshot::default();
        s.timestamp = Utc::now() - Duration::minutes(30);
        assert!(s.is_stale(Utc::now(), Duration::minutes(15)));
        assert!(!s.is_stale(Utc::now(), Duration::hours(1)));
    }

    #[test]
    fn clamp_unit_handles_nan() {
        assert_eq!(clamp_unit(f64::NAN), 0.0);
        assert_eq!(clamp_unit(1.5), 1.0);
        assert_eq!(clamp_unit(-0.1), 0.0);
    }

    #[test]
    fn metadata_omits_empty_fields() {
        let json = serde_json::to_string(&MemoryMetadata::default()).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn time_window_is_inclusive() {
        let now = Utc::now();
        let w = TimeWindow::new(now - Duration::hours(1), now);
        assert!(w.contains(now));
        assert!(w.contains(now - Duration::hours(1)));
        assert!(!w.contains(now + Duration::seconds(1)));
    }
}
