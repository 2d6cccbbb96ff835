// ── Engram: Embedding Client ───────────────────────────────────────────────
//
// Wraps an optional EmbeddingProvider with the per-call timeout. A client
// without a provider is a first-class state (embeddings switched off), not
// an error: callers check `is_enabled()` and skip the vector path.
//
// Module layout:
//   http  : Ollama / OpenAI-compatible provider over reqwest
//   hash  : deterministic offline feature-hashing provider

pub mod hash;
pub mod http;

pub use hash::HashEmbedder;
pub use http::HttpEmbedder;

use log::warn;
use std::sync::Arc;
use std::time::Duration;

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::EmbeddingProvider;
use crate::engine::config::{EmbeddingProviderKind, EmbeddingSection};

const COMPONENT: &str = "embedding_provider";

#[derive(Clone)]
pub struct EmbeddingClient {
    provider: Option<Arc<dyn EmbeddingProvider>>,
    timeout: Duration,
}

impl EmbeddingClient {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, timeout: Duration) -> Self {
        Self { provider: Some(provider), timeout }
    }

    pub fn disabled() -> Self {
        Self { provider: None, timeout: Duration::ZERO }
    }

    /// Build the provider named by the `[embedding]` section.
    pub fn from_config(section: &EmbeddingSection) -> Self {
        if !section.enabled {
            return Self::disabled();
        }
        let timeout = Duration::from_millis(section.timeout_ms);
        let provider: Arc<dyn EmbeddingProvider> = match section.provider {
            EmbeddingProviderKind::Hash => Arc::new(HashEmbedder::new(
                section.dimensions.unwrap_or(crate::atoms::constants::HASH_EMBEDDING_DIMS),
            )),
            EmbeddingProviderKind::Ollama | EmbeddingProviderKind::OpenAi => {
                Arc::new(HttpEmbedder::new(section))
            }
        };
        Self::new(provider, timeout)
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    pub fn model_name(&self) -> Option<&str> {
        self.provider.as_deref().map(|p| p.model_name())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Embed `text` within the configured timeout.
    ///
    /// Every failure (disabled, timeout, provider error, empty vector) comes
    /// back as `EngineError::Degraded`; the caller decides how to continue.
    pub async fn embed(&self, text: &str) -> EngineResult<Vec<f32>> {
        let Some(provider) = &self.provider else {
            return Err(EngineError::degraded(COMPONENT, "embeddings disabled"));
        };
        match tokio::time::timeout(self.timeout, provider.embed(text)).await {
            Ok(Ok(vec)) if !vec.is_empty() => Ok(vec),
            Ok(Ok(_)) => Err(EngineError::degraded(COMPONENT, "provider returned an empty vector")),
            Ok(Err(e)) => {
                warn!("[engram:embedding] {} failed: {}", provider.model_name(), e);
                Err(EngineError::degraded(COMPONENT, e.to_string()))
            }
            Err(_) => {
                warn!(
                    "[engram:embedding] {} timed out after {}ms",
                    provider.model_name(),
                    self.timeout.as_millis()
                );
                Err(EngineError::degraded(
                    COMPONENT,
                    format!("timed out after {}ms", self.timeout.as_millis()),
                ))
            }
        }
    }
}

impl std::fmt::Debug for EmbeddingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingClient")
            .field("model", &self.model_name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Slow;

    #[async_trait]
    impl EmbeddingProvider for Slow {
        fn model_name(&self) -> &str {
            "slow"
        }
        fn dimensions(&self) -> Option<usize> {
            None
        }
        async fn embed(&self, _text: &str) -> EngineResult<Vec<f32>> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(vec![1.0])
        }
    }

    #[tokio::test]
    async fn disabled_client_degrades() {
        let c = EmbeddingClient::disabled();
        assert!(!c.is_enabled());
        assert!(matches!(c.embed("x").await, Err(EngineError::Degraded { .. })));
    }

    #[tokio::test]
    async fn timeout_is_degraded_not_fatal() {
        let c = EmbeddingClient::new(Arc::new(Slow), Duration::from_millis(20));
        let err = c.embed("x").await.unwrap_err();
        assert!(matches!(err, EngineError::Degraded { .. }));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn hash_provider_from_config() {
        let section = EmbeddingSection {
            provider: EmbeddingProviderKind::Hash,
            dimensions: Some(64),
            ..Default::default()
        };
        let c = EmbeddingClient::from_config(&section);
        assert_eq!(c.model_name(), Some("hash-64"));
        assert_eq!(c.embed("hello world").await.unwrap().len(), 64);
    }
}
