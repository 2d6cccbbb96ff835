// ── Engram: Configuration ──────────────────────────────────────────────────
//
// MemoryConfig is loaded from TOML. Every field has a default, so an empty
// file (or no file) yields an in-memory store talking to a local Ollama.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::atoms::constants::*;
use crate::atoms::error::{EngineError, EngineResult};

/// Which embedding backend to talk to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    #[default]
    Ollama,
    OpenAi,
    /// Local deterministic feature hashing. No network.
    Hash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSection {
    pub enabled: bool,
    pub provider: EmbeddingProviderKind,
    /// Base URL (Ollama: http://localhost:11434)
    pub base_url: String,
    pub model: String,
    pub dimensions: Option<usize>,
    /// Bearer token for OpenAI-compatible endpoints. Never logged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        EmbeddingSection {
            enabled: true,
            provider: EmbeddingProviderKind::Ollama,
            base_url: "http://localhost:11434".into(),
            model: "nomic-embed-text".into(),
            dimensions: None,
            api_key: None,
            timeout_ms: DEFAULT_EMBEDDING_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// SQLite file. `None` = in-memory database.
    pub path: Option<PathBuf>,
    pub timeout_ms: u64,
    pub vector_index: bool,
}

impl Default for StoreSection {
    fn default() -> Self {
        StoreSection {
            path: None,
            timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
            vector_index: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSection {
    pub context_tag_boost: f64,
    pub context_level_penalty: f64,
    pub overlap_bonus: f64,
    pub default_limit: usize,
    pub candidate_pool: usize,
    pub temporal_half_life_hours: f64,
    pub default_temporal_window_days: i64,
    pub max_snapshot_age_secs: i64,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        RetrievalSection {
            context_tag_boost: DEFAULT_CONTEXT_TAG_BOOST,
            context_level_penalty: DEFAULT_CONTEXT_LEVEL_PENALTY,
            overlap_bonus: DEFAULT_OVERLAP_BONUS,
            default_limit: DEFAULT_RETRIEVAL_LIMIT,
            candidate_pool: DEFAULT_CANDIDATE_POOL,
            temporal_half_life_hours: DEFAULT_TEMPORAL_HALF_LIFE_HOURS,
            default_temporal_window_days: DEFAULT_TEMPORAL_WINDOW_DAYS,
            max_snapshot_age_secs: DEFAULT_MAX_SNAPSHOT_AGE_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSection {
    pub retrieval_limit: usize,
}

impl Default for ContextSection {
    fn default() -> Self {
        ContextSection { retrieval_limit: DEFAULT_CONTEXT_RETRIEVAL_LIMIT }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleSection {
    pub decay_rate: f64,
    pub decay_idle_days: i64,
    pub access_boost: f64,
    pub access_boost_cap: f64,
    pub min_sweep_interval_secs: i64,
    pub consolidation_threshold: f64,
    pub consolidation_window_secs: i64,
    pub archive_importance_floor: f64,
    pub archive_idle_days: i64,
    pub hard_delete_after_days: i64,
    pub sweep_interval_secs: u64,
    pub batch_size: usize,
}

impl Default for LifecycleSection {
    fn default() -> Self {
        LifecycleSection {
            decay_rate: DEFAULT_DECAY_RATE,
            decay_idle_days: DEFAULT_DECAY_IDLE_DAYS,
            access_boost: DEFAULT_ACCESS_BOOST,
            access_boost_cap: DEFAULT_ACCESS_BOOST_CAP,
            min_sweep_interval_secs: DEFAULT_MIN_SWEEP_INTERVAL_SECS,
            consolidation_threshold: DEFAULT_CONSOLIDATION_THRESHOLD,
            consolidation_window_secs: DEFAULT_CONSOLIDATION_WINDOW_SECS,
            archive_importance_floor: DEFAULT_ARCHIVE_IMPORTANCE_FLOOR,
            archive_idle_days: DEFAULT_ARCHIVE_IDLE_DAYS,
            hard_delete_after_days: DEFAULT_HARD_DELETE_AFTER_DAYS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            batch_size: DEFAULT_LIFECYCLE_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    pub soft_timeout_ms: u64,
    pub hard_timeout_ms: u64,
    pub latency_window: usize,
}

impl Default for MonitorSection {
    fn default() -> Self {
        MonitorSection {
            soft_timeout_ms: DEFAULT_MONITOR_SOFT_TIMEOUT_MS,
            hard_timeout_ms: DEFAULT_MONITOR_HARD_TIMEOUT_MS,
            latency_window: DEFAULT_LATENCY_WINDOW,
        }
    }
}

/// Complete subsystem configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub embedding: EmbeddingSection,
    pub store: StoreSection,
    pub retrieval: RetrievalSection,
    pub context: ContextSection,
    pub lifecycle: LifecycleSection,
    pub monitor: MonitorSection,
}

impl MemoryConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> EngineResult<Self> {
        let config: MemoryConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("cannot read {}: {e}", path.display())))?;
        let config = Self::from_toml_str(&raw)?;
        log::info!("[engram:config] Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Fully offline configuration: in-memory store and hashing embedder.
    pub fn offline() -> Self {
        let mut config = MemoryConfig::default();
        config.embedding.provider = EmbeddingProviderKind::Hash;
        config.embedding.model = "hash-256".into();
        config.embedding.dimensions = Some(HASH_EMBEDDING_DIMS);
        config
    }

    pub fn validate(&self) -> EngineResult<()> {
        let r = &self.retrieval;
        let l = &self.lifecycle;
        let m = &self.monitor;

        let unit = |name: &str, v: f64| -> EngineResult<()> {
            if !(0.0..=1.0).contains(&v) {
                return Err(EngineError::Config(format!("{name} must be within [0, 1], got {v}")));
            }
            Ok(())
        };
        let positive = |name: &str, ok: bool| -> EngineResult<()> {
            if !ok {
                return Err(EngineError::Config(format!("{name} must be positive")));
            }
            Ok(())
        };

        if r.context_tag_boost < 1.0 {
            return Err(EngineError::Config(format!(
                "retrieval.context_tag_boost must be >= 1.0, got {}",
                r.context_tag_boost
            )));
        }
        unit("retrieval.context_level_penalty", r.context_level_penalty)?;
        positive("retrieval.overlap_bonus", r.overlap_bonus >= 0.0)?;
        positive("retrieval.default_limit", r.default_limit > 0)?;
        positive("retrieval.candidate_pool", r.candidate_pool > 0)?;
        positive("retrieval.temporal_half_life_hours", r.temporal_half_life_hours > 0.0)?;
        positive("retrieval.default_temporal_window_days", r.default_temporal_window_days > 0)?;
        positive("context.retrieval_limit", self.context.retrieval_limit > 0)?;

        unit("lifecycle.decay_rate", l.decay_rate)?;
        unit("lifecycle.access_boost", l.access_boost)?;
        unit("lifecycle.access_boost_cap", l.access_boost_cap)?;
        unit("lifecycle.consolidation_threshold", l.consolidation_threshold)?;
        unit("lifecycle.archive_importance_floor", l.archive_importance_floor)?;
        positive("lifecycle.batch_size", l.batch_size > 0)?;
        positive("lifecycle.sweep_interval_secs", l.sweep_interval_secs > 0)?;
        positive("lifecycle.decay_idle_days", l.decay_idle_days >= 0)?;
        positive("lifecycle.consolidation_window_secs", l.consolidation_window_secs >= 0)?;

        positive("embedding.timeout_ms", self.embedding.timeout_ms > 0)?;
        positive("store.timeout_ms", self.store.timeout_ms > 0)?;
        if m.soft_timeout_ms == 0 || m.soft_timeout_ms > m.hard_timeout_ms {
            return Err(EngineError::Config(
                "monitor.soft_timeout_ms must be positive and <= hard_timeout_ms".into(),
            ));
        }
        positive("monitor.latency_window", m.latency_window > 0)?;
        Ok(())
    }

    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_millis(self.embedding.timeout_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store.timeout_ms)
    }

    pub fn max_snapshot_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.retrieval.max_snapshot_age_secs)
    }
}
