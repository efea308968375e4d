//! Local text features: tokenization, word count and key phrases.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

const MAX_KEY_PHRASES: usize = 5;
const MIN_PHRASE_LEN: usize = 4;

lazy_static! {
    static ref PUNCTUATION: Regex = Regex::new(r"[^\p{L}\p{N}\s]").expect("valid punctuation regex");
}

const STOP_WORDS: &[&str] = &[
    "about", "above", "after", "again", "against", "also", "because", "been", "before", "being",
    "below", "between", "both", "could", "does", "doing", "down", "during", "each", "even",
    "from", "further", "have", "having", "here", "into", "just", "like", "more", "most", "much",
    "only", "other", "ours", "over", "really", "same", "should", "some", "such", "than", "that",
    "their", "theirs", "them", "then", "there", "these", "they", "this", "those", "through",
    "under", "until", "very", "were", "what", "when", "where", "which", "while", "will", "with",
    "would", "your", "yours",
];

/// Lowercased tokens with punctuation removed.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    PUNCTUATION
        .replace_all(&lowered, "")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

pub fn word_count(text: &str) -> usize {
    tokenize(text).len()
}

/// Most frequent non-stop-word tokens, ties broken by first occurrence.
pub fn key_phrases(text: &str) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (position, token) in tokenize(text).into_iter().enumerate() {
        if token.chars().count() < MIN_PHRASE_LEN || STOP_WORDS.contains(&token.as_str()) {
            continue;
        }
        counts.entry(token).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(token, (count, first))| (token, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    ranked
        .into_iter()
        .take(MAX_KEY_PHRASES)
        .map(|(token, _, _)| token)
        .collect()
}
