// ── Engram: HTTP Embedding Provider ─────────────────────────────────────────
//
// Calls Ollama or OpenAI-compatible embedding APIs to produce vector
// representations of text. Ollama tries the current /api/embed endpoint and
// falls back to the legacy /api/embeddings one.

use async_trait::async_trait;
use log::info;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::EmbeddingProvider;
use crate::engine::config::{EmbeddingProviderKind, EmbeddingSection};

/// Embedding client for Ollama or an OpenAI-compatible endpoint.
pub struct HttpEmbedder {
    client: Client,
    kind: EmbeddingProviderKind,
    base_url: String,
    model: String,
    dims: Option<usize>,
    api_key: Option<String>,
    request_timeout: Duration,
}

impl HttpEmbedder {
    pub fn new(section: &EmbeddingSection) -> Self {
        HttpEmbedder {
            client: Client::new(),
            kind: section.provider,
            base_url: section.base_url.trim_end_matches('/').to_string(),
            model: section.model.clone(),
            dims: section.dimensions,
            api_key: section.api_key.clone(),
            request_timeout: Duration::from_millis(section.timeout_ms),
        }
    }

    fn provider_label(&self) -> &'static str {
        match self.kind {
            EmbeddingProviderKind::OpenAi => "openai",
            _ => "ollama",
        }
    }

    /// Ollama current API: POST /api/embed { model, input } → { embeddings: [[f32...]] }
    /// Falls back to legacy: POST /api/embeddings { model, prompt } → { embedding: [f32...] }
    async fn embed_ollama(&self, text: &str) -> EngineResult<Vec<f32>> {
        let url = format!("{}/api/embed", self.base_url);
        let body = json!({ "model": self.model, "input": text });
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .timeout(self.request_timeout)
            .send()
            .await?;

        if resp.status().is_success() {
            let v: Value = resp.json().await?;
            if let Some(vec) = parse_ollama_response(&v) {
                return Ok(vec);
            }
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            if body.contains("not found") || body.contains("does not exist") {
                return Err(EngineError::provider(
                    "ollama",
                    format!("model '{}' not found ({status})", self.model),
                ));
            }
            info!("[engram:embedding] /api/embed returned {}, trying legacy endpoint", status);
        }

        let legacy_url = format!("{}/api/embeddings", self.base_url);
        let legacy_body = json!({ "model": self.model, "prompt": text });
        let resp = self
            .client
            .post(&legacy_url)
            .json(&legacy_body)
            .timeout(self.request_timeout)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(EngineError::provider("ollama", format!("legacy embed returned {status}")));
        }
        let v: Value = resp.json().await?;
        parse_ollama_response(&v)
            .ok_or_else(|| EngineError::provider("ollama", "no embedding in response"))
    }

    /// OpenAI-compatible format: POST /v1/embeddings { model, input }
    async fn embed_openai(&self, text: &str) -> EngineResult<Vec<f32>> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = json!({ "model": self.model, "input": text });
        let mut req = self.client.post(&url).json(&body).timeout(self.request_timeout);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(EngineError::provider("openai", format!("embed returned {status}")));
        }
        let v: Value = resp.json().await?;
        parse_openai_response(&v)
            .ok_or_else(|| EngineError::provider("openai", "no data[0].embedding in response"))
    }
}

fn floats(arr: &[Value]) -> Vec<f32> {
    arr.iter().filter_map(|v| v.as_f64().map(|f| f as f32)).collect()
}

/// `{ embeddings: [[..]] }` (current) or `{ embedding: [..] }` (legacy).
pub(crate) fn parse_ollama_response(v: &Value) -> Option<Vec<f32>> {
    if let Some(first) = v["embeddings"].as_array().and_then(|e| e.first()).and_then(|e| e.as_array()) {
        let vec = floats(first);
        if !vec.is_empty() {
            return Some(vec);
        }
    }
    // Some Ollama versions return singular "embedding" even on /api/embed
    let vec = floats(v["embedding"].as_array()?);
    (!vec.is_empty()).then_some(vec)
}

/// `{ data: [{ embedding: [..] }] }`
pub(crate) fn parse_openai_response(v: &Value) -> Option<Vec<f32>> {
    let vec = floats(v["data"][0]["embedding"].as_array()?);
    (!vec.is_empty()).then_some(vec)
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> Option<usize> {
        self.dims
    }

    async fn embed(&self, text: &str) -> EngineResult<Vec<f32>> {
        let vec = match self.kind {
            EmbeddingProviderKind::OpenAi => self.embed_openai(text).await?,
            _ => self.embed_ollama(text).await?,
        };
        if let Some(expected) = self.dims {
            if vec.len() != expected {
                return Err(EngineError::provider(
                    self.provider_label(),
                    format!("expected {expected} dimensions, got {}", vec.len()),
                ));
            }
        }
        Ok(vec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_current_ollama_format() {
        let v = json!({ "embeddings": [[0.1, 0.2, 0.3]] });
        assert_eq!(parse_ollama_response(&v).unwrap().len(), 3);
    }

    #[test]
    fn parses_legacy_ollama_format() {
        let v = json!({ "embedding": [0.5, -0.5] });
        assert_eq!(parse_ollama_response(&v), Some(vec![0.5, -0.5]));
    }

    #[test]
    fn rejects_empty_or_missing_vectors() {
        assert!(parse_ollama_response(&json!({ "embeddings": [[]] })).is_none());
        assert!(parse_ollama_response(&json!({ "error": "boom" })).is_none());
        assert!(parse_openai_response(&json!({ "data": [] })).is_none());
    }

    #[test]
    fn parses_openai_format() {
        let v = json!({ "data": [{ "embedding": [1.0, 2.0], "index": 0 }] });
        assert_eq!(parse_openai_response(&v), Some(vec![1.0, 2.0]));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let section = EmbeddingSection {
            base_url: "http://localhost:11434/".into(),
            ..Default::default()
        };
        let e = HttpEmbedder::new(&section);
        assert_eq!(e.base_url, "http://localhost:11434");
        assert_eq!(e.model_name(), "nomic-embed-text");
    }
}
