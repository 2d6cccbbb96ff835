// ── Engram: Context Builder ────────────────────────────────────────────────
//
// Budget-aware context assembly for a downstream consumer (usually an LLM
// prompt). Retrieves hybrid results with a generous limit, then greedily
// takes them in rank order while the running token count stays within the
// budget. Selection stops at the first item that does not fit, so the
// payload is always a score-ordered prefix and a memory is never split.
//
// Identical inputs over identical data give an identical payload: ranking
// is a total order and token counting is pure.

use log::{debug, info};
use std::sync::Arc;

use crate::atoms::error::EngineResult;
use crate::atoms::types::{
    ContextHeader, ContextItem, ContextPayload, ContextSnapshot, RetrievalRequest,
    RetrievalStrategy, SearchResult,
};
use crate::engine::retrieval::RetrievalEngine;
use crate::engine::tokenizer::Tokenizer;

pub struct ContextBuilder {
    retrieval: Arc<RetrievalEngine>,
    retrieval_limit: usize,
    tokenizer: Tokenizer,
}

impl ContextBuilder {
    pub fn new(retrieval: Arc<RetrievalEngine>, retrieval_limit: usize, tokenizer: Tokenizer) -> Self {
        Self { retrieval, retrieval_limit: retrieval_limit.max(1), tokenizer }
    }

    /// Assemble the context payload for `query`.
    ///
    /// No matching memories is an empty payload, not an error. A graph store
    /// outage surfaces as `RetrievalUnavailable`.
    pub async fn build(
        &self,
        query: &str,
        owner_id: &str,
        snapshot: Option<ContextSnapshot>,
        token_budget: usize,
    ) -> EngineResult<ContextPayload> {
        let mut request = RetrievalRequest::new(query, owner_id)
            .strategy(RetrievalStrategy::Hybrid)
            .limit(self.retrieval_limit);
        if let Some(s) = snapshot {
            request = request.context(s);
        }

        let results = self.retrieval.retrieve(&request).await?;
        let payload = select(&results, token_budget, &self.tokenizer);

        if payload.header.truncated {
            info!(
                "[engram:context] owner={} kept {}/{} memories ({} of {} tokens)",
                owner_id,
                payload.header.included,
                payload.header.available,
                payload.header.tokens_used,
                token_budget
            );
        } else {
            debug!(
                "[engram:context] owner={} kept all {} memories ({} tokens)",
                owner_id, payload.header.included, payload.header.tokens_used
            );
        }
        Ok(payload)
    }
}

/// Greedy prefix selection of ranked `results` under `token_budget`.
pub fn select(results: &[SearchResult], token_budget: usize, tokenizer: &Tokenizer) -> ContextPayload {
    let mut items = Vec::new();
    let mut used = 0usize;
    for r in results {
        let cost = tokenizer.count_item(&r.content);
        if used + cost > token_budget {
            break;
        }
        used += cost;
        items.push(ContextItem {
            memory_id: r.memory_id.clone(),
            content: r.content.clone(),
            memory_type: r.memory_type,
            score: r.score,
        });
    }

    ContextPayload {
        header: ContextHeader {
            included: items.len(),
            available: results.len(),
            truncated: items.len() < results.len(),
            token_budget,
            tokens_used: used,
        },
        items,
    }
}

impl ContextPayload {
    /// Compact JSON. Field order is fixed by the struct layout.
    pub fn to_json(&self) -> EngineResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Prompt-ready text block. Empty payloads render as an empty string.
    pub fn render(&self) -> String {
        if self.items.is_empty() {
            return String::new();
        }
        let mut lines = vec![if self.header.truncated {
            format!(
                "## Relevant Memories ({} of {})",
                self.header.included, self.header.available
            )
        } else {
            "## Relevant Memories".to_string()
        }];
        for item in &self.items {
            lines.push(format!("- [{}] {} (score: {:.2})", item.memory_type, item.content, item.score));
        }
        lines.join("\n")
    }
}
