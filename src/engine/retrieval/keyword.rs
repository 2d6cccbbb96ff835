// ── Engram: Keyword Scoring ────────────────────────────────────────────────
//
// Query terms are the lowercased, deduplicated content words of the query.
// A candidate's score blends term coverage (fraction of query terms present
// as case-insensitive substrings) with term density (share of content words
// that hit a term). Coverage dominates so a record mentioning every term
// beats one repeating a single term.

use crate::atoms::constants::KEYWORD_COVERAGE_WEIGHT;
use crate::engine::concepts::{is_stop_word, words};

/// Lowercased distinct query terms with stopwords removed.
/// A query made only of stopwords keeps them, so "who are you" still matches.
pub fn query_terms(query: &str) -> Vec<String> {
    let all: Vec<String> = words(query).into_iter().map(str::to_lowercase).collect();
    let mut terms: Vec<String> = Vec::new();
    for w in all.iter().filter(|w| !is_stop_word(w)) {
        if !terms.contains(w) {
            terms.push(w.clone());
        }
    }
    if terms.is_empty() {
        for w in all {
            if !terms.contains(&w) {
                terms.push(w);
            }
        }
    }
    terms
}

/// Keyword relevance of `content` for `terms`, in [0, 1].
pub fn keyword_score(content: &str, terms: &[String]) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let lower = content.to_lowercase();
    let matched = terms.iter().filter(|t| lower.contains(t.as_str())).count();
    if matched == 0 {
        return 0.0;
    }
    let coverage = matched as f64 / terms.len() as f64;

    let tokens = words(&lower);
    let density = if tokens.is_empty() {
        0.0
    } else {
        let hits = tokens
            .iter()
            .filter(|w| terms.iter().any(|t| w.contains(t.as_str())))
            .count();
        (hits as f64 / tokens.len() as f64).min(1.0)
    };

    coverage * KEYWORD_COVERAGE_WEIGHT + density * (1.0 - KEYWORD_COVERAGE_WEIGHT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(q: &str) -> Vec<String> {
        query_terms(q)
    }

    #[test]
    fn terms_drop_stopwords_and_duplicates() {
        assert_eq!(terms("What did Alice say about the hiking hiking trip?"), vec![
            "alice", "say", "hiking", "trip"
        ]);
        assert_eq!(terms("who are you"), vec!["who", "are", "you"]);
        assert!(terms("  ").is_empty());
    }

    #[test]
    fn full_coverage_scores_highest() {
        let t = terms("alpha beta");
        assert!((keyword_score("alpha beta", &t) - 1.0).abs() < 1e-9);
        assert!((keyword_score("alpha beta gamma delta", &t) - 0.925).abs() < 1e-9);
        assert!((keyword_score("alpha gamma", &t) - 0.5).abs() < 1e-9);
        assert_eq!(keyword_score("gamma delta", &t), 0.0);
    }

    #[test]
    fn matching_is_case_insensitive_substring() {
        let t = terms("hike");
        assert!(keyword_score("We went HIKEing yesterday", &t) > 0.85);
    }

    #[test]
    fn coverage_beats_repetition() {
        let t = terms("coffee brand");
        let both = keyword_score("my favourite coffee brand is local", &t);
        let repeated = keyword_score("coffee coffee coffee coffee", &t);
        assert!(both > repeated);
    }
}
