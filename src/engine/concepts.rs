// ── Engram: Concept Extraction ─────────────────────────────────────────────
//
// Heuristic concept extraction for the memory graph:
//   - Capitalized runs (people, places, projects), e.g. "Mount Rainier"
//   - Content words (≥ 4 chars, not stopwords) ranked by frequency
//
// Concepts are lowercased, deduplicated and capped at MAX_CONCEPTS_PER_MEMORY.
// The word tokenizer and stopword list are shared with keyword retrieval.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::atoms::constants::MAX_CONCEPTS_PER_MEMORY;

static WORD: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}][\p{L}\p{N}'_-]*").ok());

/// Stopwords that never become concepts or query terms.
pub(crate) const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "was", "are", "were", "be", "been", "being",
    "have", "has", "had", "do", "does", "did", "will", "would", "could",
    "should", "may", "might", "shall", "can", "it", "its", "this", "that",
    "these", "those", "i", "we", "you", "he", "she", "they", "my", "our",
    "your", "his", "her", "their", "what", "which", "who", "whom", "how",
    "when", "where", "why", "if", "for", "but", "and", "or", "not", "no",
    "so", "than", "too", "very", "just", "about", "with", "from", "into",
    "to", "of", "in", "on", "at", "by", "up", "out", "off", "also", "like",
    "more", "then", "some", "other", "each", "every", "there", "while",
    "user", "said", "says",
];

/// Split text into word tokens (letters/digits, inner apostrophes and dashes kept).
pub(crate) fn words(text: &str) -> Vec<&str> {
    match WORD.as_ref() {
        Some(re) => re.find_iter(text).map(|m| m.as_str()).collect(),
        None => text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect(),
    }
}

pub(crate) fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word.to_lowercase().as_str())
}

fn is_title_case(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.is_uppercase() && chars.all(|c| !c.is_uppercase()),
        None => false,
    }
}

/// Extract up to MAX_CONCEPTS_PER_MEMORY lowercase concepts from `text`.
/// Deterministic: same text, same concepts, same order.
pub fn extract_concepts(text: &str) -> Vec<String> {
    let tokens = words(text);
    let mut out: Vec<String> = Vec::new();
    fn push(c: String, out: &mut Vec<String>) {
        if !c.is_empty() && !out.contains(&c) && out.len() < MAX_CONCEPTS_PER_MEMORY {
            out.push(c);
        }
    }

    // Pass 1: capitalized runs of 1-3 words.
    let mut i = 0;
    while i < tokens.len() {
        let w = tokens[i];
        if is_title_case(w) && !is_stop_word(w) {
            let mut j = i + 1;
            while j < tokens.len() && j - i < 3 && is_title_case(tokens[j]) && !is_stop_word(tokens[j]) {
                j += 1;
            }
            let run = tokens[i..j].join(" ").to_lowercase();
            // Lone short capitalized words are usually sentence starts.
            if j - i > 1 || run.chars().count() >= 4 {
                push(run, &mut out);
            }
            i = j;
        } else {
            i += 1;
        }
    }

    // Pass 2: frequent content words.
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (pos, w) in tokens.iter().enumerate() {
        let lw = w.to_lowercase();
        if lw.chars().count() < 4 || is_stop_word(&lw) || lw.chars().all(|c| c.is_numeric()) {
            continue;
        }
        counts.entry(lw).or_insert((0, pos)).0 += 1;
    }
    let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    // Count desc, then first occurrence asc.
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
    for (word, _) in ranked {
        if out.iter().any(|c| c.split(' ').any(|part| part == word)) {
            continue;
        }
        push(word, &mut out);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capitalized_runs_become_phrases() {
        let c = extract_concepts("We climbed Mount Rainier with Alice last June");
        assert!(c.contains(&"mount rainier".to_string()));
        assert!(c.contains(&"alice".to_string()));
        assert!(c.contains(&"june".to_string()));
        assert!(!c.contains(&"rainier".to_string()));
    }

    #[test]
    fn frequent_words_rank_first_and_stopwords_are_dropped() {
        let c = extract_concepts("hiking trails and more hiking, then hiking boots");
        assert_eq!(c.first().map(String::as_str), Some("hiking"));
        assert!(!c.iter().any(|w| w == "then" || w == "more"));
    }

    #[test]
    fn capped_and_deterministic() {
        let text = "alpha bravo charlie delta echoes foxtrot golfing hotels india juliet kilos";
        let a = extract_concepts(text);
        assert_eq!(a.len(), MAX_CONCEPTS_PER_MEMORY);
        assert_eq!(a, extract_concepts(text));
    }

    #[test]
    fn words_keep_inner_apostrophes() {
        assert_eq!(words("user's dog-walker, ok?"), vec!["user's", "dog-walker", "ok"]);
    }
}
