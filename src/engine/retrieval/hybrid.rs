// ── Engram: Hybrid Merge ───────────────────────────────────────────────────
//
// Merges semantic and keyword candidate lists by memory id:
//   score = max(semantic, keyword) * (1 + overlap_bonus * overlap)
// where overlap is 1 when both arms returned the record, else 0.

use std::collections::BTreeMap;

use crate::atoms::types::{MatchedStrategy, MemoryRecord};

use super::Scored;

pub fn merge(
    semantic: Vec<(MemoryRecord, f64)>,
    keyword: Vec<(MemoryRecord, f64)>,
    overlap_bonus: f64,
) -> Vec<Scored> {
    let mut by_id: BTreeMap<String, (MemoryRecord, Option<f64>, Option<f64>)> = BTreeMap::new();
    for (record, s) in semantic {
        let id = record.memory_id.clone();
        by_id
            .entry(id)
            .and_modify(|e| e.1 = Some(e.1.map_or(s, |prev| prev.max(s))))
            .or_insert((record, Some(s), None));
    }
    for (record, k) in keyword {
        let id = record.memory_id.clone();
        by_id
            .entry(id)
            .and_modify(|e| e.2 = Some(e.2.map_or(k, |prev| prev.max(k))))
            .or_insert((record, None, Some(k)));
    }

    by_id
        .into_values()
        .map(|(record, s, k)| {
            let overlap = if s.is_some() && k.is_some() { 1.0 } else { 0.0 };
            let base = s.unwrap_or(0.0).max(k.unwrap_or(0.0));
            Scored {
                record,
                score: base * (1.0 + overlap_bonus * overlap),
                matched: MatchedStrategy::Hybrid,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::retrieval::tests::record;

    #[test]
    fn overlap_earns_bonus() {
        let a = record("a", "alpha");
        let b = record("b", "beta");
        let c = record("c", "gamma");
        let merged = merge(
            vec![(a.clone(), 0.8), (b.clone(), 0.6)],
            vec![(a, 0.5), (c, 0.7)],
            0.2,
        );
        let score = |id: &str| merged.iter().find(|s| s.record.memory_id == id).map(|s| s.score);
        assert!((score("a").unwrap_or_default() - 0.96).abs() < 1e-9);
        assert!((score("b").unwrap_or_default() - 0.6).abs() < 1e-9);
        assert!((score("c").unwrap_or_default() - 0.7).abs() < 1e-9);
        assert!(merged.iter().all(|s| s.matched == MatchedStrategy::Hybrid));
    }

    #[test]
    fn single_arm_passes_through() {
        let merged = merge(vec![], vec![(record("k", "kiwi"), 0.4)], 0.2);
        assert_eq!(merged.len(), 1);
        assert!((merged[0].score - 0.4).abs() < 1e-9);
    }
}
