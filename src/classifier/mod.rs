//! Sentiment and emotion classification.

mod client;
mod heuristic;
mod huggingface;
mod mapping;
mod models;
mod provider;
mod text;

pub use client::ClassifierClient;
pub use huggingface::HuggingFaceClient;
pub use mapping::{map_emotion, map_sentiment, SentimentBands};
pub use models::{AnalysisOutcome, EmotionClassification, SentimentClassification};
pub use provider::{ClassifierBackend, ClassifierError, LabelScore};
pub use text::{key_phrases, word_count};

#[cfg(test)]
pub use provider::MockClassifierBackend;
