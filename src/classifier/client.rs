use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::heuristic;
use super::mapping::{map_emotion, map_sentiment, SentimentBands};
use super::models::{AnalysisOutcome, EmotionClassification, SentimentClassification};
use super::provider::{ClassifierBackend, ClassifierError, LabelScore};
use super::text;
use crate::config::ClassifierSettings;
use crate::server::metrics;

const WARM_UP_TEXT: &str = "warm up";

/// Sentiment and emotion classification with inline retry and local fallback.
///
/// Calls never fail: a provider that stays unavailable after one retry is
/// replaced by the keyword heuristic (sentiment) or "no emotion".
pub struct ClassifierClient {
    backend: Arc<dyn ClassifierBackend>,
    sentiment_model: String,
    emotion_model: String,
    bands: SentimentBands,
    model_warmup_delay: Duration,
    rate_limit_delay: Duration,
    models_warmed: AtomicBool,
}

impl ClassifierClient {
    pub fn new(backend: Arc<dyn ClassifierBackend>, settings: &ClassifierSettings) -> Self {
        Self {
            backend,
            sentiment_model: settings.sentiment_model.clone(),
            emotion_model: settings.emotion_model.clone(),
            bands: settings.bands,
            model_warmup_delay: settings.model_warmup_delay,
            rate_limit_delay: settings.rate_limit_delay,
            models_warmed: AtomicBool::new(false),
        }
    }

    pub fn models_warmed(&self) -> bool {
        self.models_warmed.load(Ordering::SeqCst)
    }

    /// Probe both models once so the provider starts loading them.
    pub async fn warm_up(&self) {
        let (sentiment, emotion) = tokio::join!(
            self.call_with_retry(&self.sentiment_model, WARM_UP_TEXT),
            self.call_with_retry(&self.emotion_model, WARM_UP_TEXT)
        );
        match (sentiment, emotion) {
            (Ok(_), Ok(_)) => {
                self.models_warmed.store(true, Ordering::SeqCst);
                info!("Classifier models warmed up");
            }
            (sentiment, emotion) => {
                if let Err(e) = sentiment {
                    warn!("Sentiment model warm-up failed: {}", e);
                }
                if let Err(e) = emotion {
                    warn!("Emotion model warm-up failed: {}", e);
                }
            }
        }
    }

    pub async fn classify_sentiment(&self, text: &str) -> SentimentClassification {
        if text.trim().is_empty() {
            return SentimentClassification::neutral();
        }

        let mapped = match self.call_with_retry(&self.sentiment_model, text).await {
            Ok(labels) => map_sentiment(&labels, &self.bands),
            Err(e) => {
                warn!("Sentiment classification failed, using heuristic: {}", e);
                None
            }
        };

        mapped.unwrap_or_else(|| {
            metrics::record_classifier_fallback("sentiment");
            heuristic::classify(text)
        })
    }

    pub async fn classify_emotion(&self, text: &str) -> EmotionClassification {
        if text.trim().is_empty() {
            return EmotionClassification::none();
        }

        match self.call_with_retry(&self.emotion_model, text).await {
            Ok(labels) => map_emotion(&labels),
            Err(e) => {
                warn!("Emotion classification failed, reporting no emotion: {}", e);
                metrics::record_classifier_fallback("emotion");
                EmotionClassification::none()
            }
        }
    }

    pub async fn analyze(&self, text: &str) -> AnalysisOutcome {
        if text.trim().is_empty() {
            return AnalysisOutcome::empty();
        }

        let (sentiment, emotion) =
            tokio::join!(self.classify_sentiment(text), self.classify_emotion(text));

        AnalysisOutcome {
            sentiment,
            emotion,
            key_phrases: text::key_phrases(text),
            word_count: text::word_count(text),
        }
    }

    async fn call_with_retry(
        &self,
        model: &str,
        text: &str,
    ) -> Result<Vec<LabelScore>, ClassifierError> {
        let delay = match self.call(model, text).await {
            Ok(labels) => return Ok(labels),
            Err(ClassifierError::ModelLoading(_)) => self.model_warmup_delay,
            Err(ClassifierError::RateLimited) => self.rate_limit_delay,
            Err(e) => return Err(e),
        };

        debug!("Retrying {} in {:?}", model, delay);
        tokio::time::sleep(delay).await;
        self.call(model, text).await
    }

    async fn call(&self, model: &str, text: &str) -> Result<Vec<LabelScore>, ClassifierError> {
        let result = self.backend.classify(model, text).await;
        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.outcome(),
        };
        metrics::record_classifier_request(model, outcome);
        result
    }
}
