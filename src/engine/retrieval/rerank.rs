// ── Engram: Context-Aware Re-ranking ───────────────────────────────────────
//
// Applied after candidate scoring when a context snapshot is in effect:
//   tag match      → score *= tag_boost
//   level distance → score *= max(0, 1 - level_penalty * |Δlevel|)
// The result is never negative.

use crate::atoms::types::{ContextSnapshot, MemoryRecord};

#[derive(Debug, Clone, Copy)]
pub struct RerankWeights {
    pub tag_boost: f64,
    pub level_penalty: f64,
}

impl RerankWeights {
    pub fn apply(&self, score: f64, record: &MemoryRecord, snapshot: &ContextSnapshot) -> f64 {
        let mut adjusted = score;
        if !snapshot.tag.is_empty() && record.context_tag == snapshot.tag {
            adjusted *= self.tag_boost;
        }
        let distance = (record.context_level - snapshot.level).abs();
        adjusted *= (1.0 - self.level_penalty * distance).max(0.0);
        adjusted.max(0.0)
    }
}
