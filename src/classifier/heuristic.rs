//! Keyword classifier used when the hosted sentiment model is unavailable.

use super::models::SentimentClassification;
use super::text::tokenize;
use crate::feedback_store::Sentiment;

const HEURISTIC_CONFIDENCE: f64 = 0.5;

const POSITIVE_WORDS: &[&str] = &[
    "amazing", "awesome", "best", "love", "loved", "excellent", "fantastic", "fast", "friendly",
    "good", "great", "happy", "helpful", "easy", "perfect", "pleased", "recommend", "smooth",
    "satisfied", "thanks", "wonderful",
];

const NEGATIVE_WORDS: &[&str] = &[
    "angry", "annoying", "awful", "bad", "broken", "bug", "cancel", "crash", "crashed",
    "disappointed", "frustrating", "hate", "horrible", "poor", "problem", "refund", "rude",
    "slow", "terrible", "useless", "worst",
];

pub fn classify(text: &str) -> SentimentClassification {
    let mut positives = 0i64;
    let mut negatives = 0i64;
    for token in tokenize(text) {
        if POSITIVE_WORDS.contains(&token.as_str()) {
            positives += 1;
        } else if NEGATIVE_WORDS.contains(&token.as_str()) {
            negatives += 1;
        }
    }

    let total = (positives + negatives) as f64;
    let diff = (positives - negatives) as f64;

    let (sentiment, score) = if positives > negatives + 1 {
        (Sentiment::Positive, 0.75 * diff / total)
    } else if negatives > positives + 1 {
        (Sentiment::Negative, 0.75 * diff / total)
    } else {
        (Sentiment::Neutral, 0.5 * diff / total.max(1.0))
    };

    SentimentClassification {
        sentiment,
        score,
        confidence: HEURISTIC_CONFIDENCE,
    }
}
