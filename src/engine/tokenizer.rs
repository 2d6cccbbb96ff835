// ── Engram: Token Estimator ─────────────────────────────────────────────────
//
// Single source of truth for token estimation in context assembly.
// The subsystem operates on text, not raw tokens, so counts come from a
// chars-per-token ratio (default 3.5, slightly pessimistic for English).
// Counting uses chars, not bytes, so CJK / emoji text is not overcounted.

use crate::atoms::error::{EngineError, EngineResult};

/// Default characters per token for unknown models.
pub const DEFAULT_CHARS_PER_TOKEN: f32 = 3.5;
/// Framing cost of one context item (separator, type label, score).
pub const ITEM_OVERHEAD_TOKENS: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct Tokenizer {
    chars_per_token: f32,
}

impl Tokenizer {
    pub fn with_ratio(chars_per_token: f32) -> EngineResult<Self> {
        if !chars_per_token.is_finite() || chars_per_token <= 0.0 {
            return Err(EngineError::Config(format!(
                "chars_per_token must be positive, got {chars_per_token}"
            )));
        }
        Ok(Self { chars_per_token })
    }

    pub fn heuristic() -> Self {
        Self { chars_per_token: DEFAULT_CHARS_PER_TOKEN }
    }

    /// Estimated tokens in `text`; at least 1 for non-empty text.
    pub fn count_tokens(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let chars = text.chars().count();
        ((chars as f32 / self.chars_per_token).ceil() as usize).max(1)
    }

    /// Cost of one context item: its content plus framing overhead.
    pub fn count_item(&self, content: &str) -> usize {
        self.count_tokens(content) + ITEM_OVERHEAD_TOKENS
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::heuristic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_minimum() {
        let t = Tokenizer::heuristic();
        assert_eq!(t.count_tokens(""), 0);
        assert_eq!(t.count_tokens("a"), 1);
    }

    #[test]
    fn ratio_rounds_up() {
        let t = Tokenizer::heuristic();
        // 7 chars / 3.5 = 2
        assert_eq!(t.count_tokens("abcdefg"), 2);
        // 8 chars / 3.5 = 2.28 → 3
        assert_eq!(t.count_tokens("abcdefgh"), 3);
        assert_eq!(t.count_item("abcdefg"), 2 + ITEM_OVERHEAD_TOKENS);
    }

    #[test]
    fn counts_chars_not_bytes() {
        let t = Tokenizer::heuristic();
        assert_eq!(t.count_tokens("日本語日本語日"), 2);
    }

    #[test]
    fn invalid_ratio_rejected() {
        assert!(Tokenizer::with_ratio(0.0).is_err());
        assert!(Tokenizer::with_ratio(f32::NAN).is_err());
        assert!(Tokenizer::with_ratio(4.0).is_ok());
    }
}
