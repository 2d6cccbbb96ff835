// ── Engram: Hashing Embedder ───────────────────────────────────────────────
//
// Deterministic, offline embedding via signed feature hashing over word
// unigrams and bigrams. Same text, same vector, on every machine: the hash
// is FNV-1a, not the std hasher, so persisted vectors stay comparable across
// builds. Texts sharing most of their words land close together, which is
// all near-duplicate detection and the offline profile need.

use async_trait::async_trait;

use crate::atoms::constants::HASH_EMBEDDING_DIMS;
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::EmbeddingProvider;

#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dims: usize,
    model: String,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        let dims = dims.max(8);
        Self { dims, model: format!("hash-{dims}") }
    }

    /// Synchronous core, shared with benches.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect();

        let mut v = vec![0.0f32; self.dims];
        for w in &words {
            self.add_feature(&mut v, w.as_bytes(), 1.0);
        }
        for pair in words.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.add_feature(&mut v, bigram.as_bytes(), 0.5);
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        v
    }

    fn add_feature(&self, v: &mut [f32], feature: &[u8], weight: f32) {
        let h = fnv1a(feature);
        let idx = (h % self.dims as u64) as usize;
        let sign = if (h >> 63) & 1 == 1 { -1.0 } else { 1.0 };
        v[idx] += sign * weight;
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(HASH_EMBEDDING_DIMS)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        h ^= *b as u64;
        h = h.wrapping_mul(0x0100_0000_01b3);
    }
    h
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> Option<usize> {
        Some(self.dims)
    }

    async fn embed(&self, text: &str) -> EngineResult<Vec<f32>> {
        let v = self.embed_sync(text);
        if v.iter().all(|x| *x == 0.0) {
            return Err(EngineError::provider("hash", "text has no embeddable tokens"));
        }
        Ok(v)
    }
}
