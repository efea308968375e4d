//! Translation from provider labels into the internal taxonomy.

use std::collections::BTreeMap;

use super::models::{EmotionClassification, SentimentClassification};
use super::provider::LabelScore;
use crate::feedback_store::{Emotion, Sentiment};

/// Score bands applied to the signed provider score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentimentBands {
    pub extreme_threshold: f64,
    pub moderate_threshold: f64,
    pub moderate_scale: f64,
    pub neutral_scale: f64,
}

impl Default for SentimentBands {
    fn default() -> Self {
        Self {
            extreme_threshold: 0.8,
            moderate_threshold: 0.6,
            moderate_scale: 0.75,
            neutral_scale: 0.5,
        }
    }
}

fn is_negative_label(label: &str) -> bool {
    matches!(
        label.to_ascii_uppercase().as_str(),
        "NEGATIVE" | "NEG" | "LABEL_0"
    )
}

/// Band the top-scoring label. Returns `None` when there is nothing to map.
pub fn map_sentiment(labels: &[LabelScore], bands: &SentimentBands) -> Option<SentimentClassification> {
    let top = labels
        .iter()
        .filter(|l| l.score.is_finite())
        .max_by(|a, b| a.score.total_cmp(&b.score))?;

    let raw = top.score.clamp(0.0, 1.0);
    let signed = if is_negative_label(&top.label) { -raw } else { raw };

    let (sentiment, score) = if raw >= bands.extreme_threshold {
        let sentiment = if signed < 0.0 {
            Sentiment::VeryNegative
        } else {
            Sentiment::VeryPositive
        };
        (sentiment, signed)
    } else if raw >= bands.moderate_threshold {
        let sentiment = if signed < 0.0 {
            Sentiment::Negative
        } else {
            Sentiment::Positive
        };
        (sentiment, signed * bands.moderate_scale)
    } else {
        (Sentiment::Neutral, signed * bands.neutral_scale)
    };

    Some(SentimentClassification {
        sentiment,
        score,
        confidence: raw,
    })
}

fn emotion_for_label(label: &str) -> Option<Emotion> {
    let emotion = match label.to_ascii_lowercase().as_str() {
        "joy" | "happiness" => Emotion::Joy,
        "anger" | "annoyance" => Emotion::Anger,
        "sadness" | "disappointment" => Emotion::Sadness,
        "fear" | "nervousness" => Emotion::Fear,
        "surprise" => Emotion::Surprise,
        "disgust" => Emotion::Disgust,
        "love" | "admiration" | "gratitude" => Emotion::Trust,
        "optimism" | "excitement" => Emotion::Anticipation,
        _ => return None,
    };
    Some(emotion)
}

/// Unmapped labels are ignored; duplicates keep their highest score.
pub fn map_emotion(labels: &[LabelScore]) -> EmotionClassification {
    let mut emotions: BTreeMap<Emotion, f64> = BTreeMap::new();
    for label in labels {
        if !label.score.is_finite() {
            continue;
        }
        if let Some(emotion) = emotion_for_label(&label.label) {
            let entry = emotions.entry(emotion).or_insert(label.score);
            if label.score > *entry {
                *entry = label.score;
            }
        }
    }

    let primary = emotions
        .iter()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(emotion, score)| (*emotion, *score));

    match primary {
        Some((emotion, score)) => EmotionClassification {
            primary_emotion: Some(emotion),
            emotions,
            confidence: score,
        },
        None => EmotionClassification::none(),
    }
}
