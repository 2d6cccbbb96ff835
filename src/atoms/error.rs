// ── Engram Atoms: Error Types ──────────────────────────────────────────────
// Single canonical error enum for the memory subsystem, built with `thiserror`.
//
// Design rules:
//   • Variants follow the failure taxonomy: caller errors, outages, degraded
//     operation, lifecycle conflicts. Transport errors wrap via `#[from]`.
//   • Only caller-visible variants ever leave the public API; `Degraded` and
//     `LifecycleConflict` are recovered inside the component that raised them.
//   • No variant carries secret material (API keys) in its message.

use thiserror::Error;

// ── Primary error enum ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EngineError {
    /// Caller error (empty content, unknown strategy, bad limit). Never retried.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The backing store cannot serve reads and there is nothing left to fall
    /// back to. Retryable by the caller with backoff.
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// The backing store refused or failed the durable record write.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// An optional capability failed; execution continued with reduced quality.
    #[error("Degraded operation: {component}: {message}")]
    Degraded { component: String, message: String },

    /// Optimistic-lock mismatch on a lifecycle write.
    #[error("Lifecycle conflict on memory {memory_id}")]
    LifecycleConflict { memory_id: String },

    /// A bounded operation ran past its deadline.
    #[error("Timeout: {operation} exceeded {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    /// SQLite / rusqlite database failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON serialization / deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP / network failure (reqwest layer).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Configuration is invalid or unreadable.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Embedding provider HTTP or API-level failure (non-secret detail only).
    #[error("Provider error: {provider}: {message}")]
    Provider { provider: String, message: String },

    /// Catch-all for errors that do not yet have a dedicated variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenience constructors ───────────────────────────────────────────────

impl EngineError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn degraded(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Degraded { component: component.into(), message: message.into() }
    }

    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider { provider: provider.into(), message: message.into() }
    }

    pub fn timeout(operation: impl Into<String>, after: std::time::Duration) -> Self {
        Self::Timeout { operation: operation.into(), after_ms: after.as_millis() as u64 }
    }

    /// Whether this error belongs to the set surfaced to consumers of the
    /// public API. Everything else has a local recovery path.
    pub fn is_caller_visible(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_)
                | Self::RetrievalUnavailable(_)
                | Self::StorageUnavailable(_)
                | Self::Timeout { .. }
        )
    }

    /// Whether a caller may reasonably retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RetrievalUnavailable(_) | Self::StorageUnavailable(_) | Self::Timeout { .. }
        )
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(e: toml::de::Error) -> Self {
        EngineError::Config(e.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Other(format!("I/O error: {e}"))
    }
}

impl From<String> for EngineError {
    fn from(s: String) -> Self {
        EngineError::Other(s)
    }
}

impl From<&str> for EngineError {
    fn from(s: &str) -> Self {
        EngineError::Other(s.to_string())
    }
}

// ── Convenience alias ──────────────────────────────────────────────────────

/// All subsystem operations return this type.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_visible_taxonomy() {
        assert!(EngineError::invalid("empty").is_caller_visible());
        assert!(EngineError::RetrievalUnavailable("down".into()).is_caller_visible());
        assert!(!EngineError::degraded("embedding", "timeout").is_caller_visible());
        assert!(!EngineError::LifecycleConflict { memory_id: "m".into() }.is_caller_visible());
    }

    #[test]
    fn invalid_input_is_not_retryable() {
        assert!(!EngineError::invalid("bad strategy").is_retryable());
        assert!(EngineError::RetrievalUnavailable("down".into()).is_retryable());
    }

    #[test]
    fn timeout_reports_millis() {
        let e = EngineError::timeout("graph_store.ping", std::time::Duration::from_millis(1500));
        assert_eq!(e.to_string(), "Timeout: graph_store.ping exceeded 1500ms");
    }
}
