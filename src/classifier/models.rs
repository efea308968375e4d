use std::collections::BTreeMap;

use serde::Serialize;

use crate::feedback_store::{AnalysisResult, Emotion, Sentiment};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentimentClassification {
    pub sentiment: Sentiment,
    /// Signed score in [-1, 1].
    pub score: f64,
    pub confidence: f64,
}

impl SentimentClassification {
    pub fn neutral() -> Self {
        Self {
            sentiment: Sentiment::Neutral,
            score: 0.0,
            confidence: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct EmotionClassification {
    pub primary_emotion: Option<Emotion>,
    pub emotions: BTreeMap<Emotion, f64>,
    pub confidence: f64,
}

impl EmotionClassification {
    pub fn none() -> Self {
        Self::default()
    }
}

/// Everything the sentiment worker persists for one text.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub sentiment: SentimentClassification,
    pub emotion: EmotionClassification,
    pub key_phrases: Vec<String>,
    pub word_count: usize,
}

impl AnalysisOutcome {
    pub fn empty() -> Self {
        Self {
            sentiment: SentimentClassification::neutral(),
            emotion: EmotionClassification::none(),
            key_phrases: Vec::new(),
            word_count: 0,
        }
    }

    pub fn into_result(self, feedback_id: &str, created_at: i64) -> AnalysisResult {
        AnalysisResult {
            feedback_id: feedback_id.to_string(),
            sentiment: self.sentiment.sentiment,
            score: self.sentiment.score,
            confidence: self.sentiment.confidence,
            primary_emotion: self.emotion.primary_emotion,
            emotions: self.emotion.emotions,
            key_phrases: self.key_phrases,
            word_count: self.word_count,
            created_at,
        }
    }
}
