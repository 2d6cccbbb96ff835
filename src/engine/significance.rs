// ── Engram: Significance Scoring ───────────────────────────────────────────
//
// Inherent importance assigned once at creation. Baseline by memory type,
// nudged by deterministic content cues, clamped to [0, 1]. The initial
// importance_score starts equal to the significance score.

use crate::atoms::types::{clamp_unit, MemoryType};

const URGENCY_BONUS: f64 = 0.10;
const LONG_CONTENT_BONUS: f64 = 0.05;
const LONG_CONTENT_WORDS: usize = 40;

const URGENCY_MARKERS: &[&str] = &[
    "important",
    "remember",
    "critical",
    "urgent",
    "never forget",
    "must",
    "always",
    "deadline",
    "allergic",
    "password",
];

pub fn baseline(memory_type: MemoryType) -> f64 {
    match memory_type {
        MemoryType::Reflection => 0.75,
        MemoryType::System => 0.70,
        MemoryType::Consolidated => 0.60,
        MemoryType::Interaction => 0.40,
    }
}

/// Significance for new content of the given type.
pub fn score(memory_type: MemoryType, content: &str) -> f64 {
    let lower = content.to_lowercase();
    let mut s = baseline(memory_type);
    if URGENCY_MARKERS.iter().any(|m| lower.contains(m)) {
        s += URGENCY_BONUS;
    }
    if content.split_whitespace().count() >= LONG_CONTENT_WORDS {
        s += LONG_CONTENT_BONUS;
    }
    clamp_unit(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baselines_by_type() {
        assert_eq!(score(MemoryType::Interaction, "hello there"), 0.40);
        assert_eq!(score(MemoryType::Reflection, "hello there"), 0.75);
    }

    #[test]
    fn urgency_and_length_add_up() {
        let long = "word ".repeat(45);
        let s = score(MemoryType::Interaction, &format!("Remember this: {long}"));
        assert!((s - 0.55).abs() < 1e-9);
    }

    #[test]
    fn always_within_unit_interval() {
        for t in MemoryType::ALL {
            let s = score(t, &"critical ".repeat(100));
            assert!((0.0..=1.0).contains(&s));
        }
    }
}
