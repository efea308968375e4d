//! Handler for `sentiment` jobs.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, error, info};

use super::locks::FeedbackLocks;
use crate::alerts::AlertEngine;
use crate::classifier::ClassifierClient;
use crate::events::{EventBroadcaster, Topic};
use crate::feedback_store::FeedbackStore;
use crate::job_queue::{JobContext, JobError, JobHandler, SentimentJobPayload};

pub struct SentimentHandler {
    classifier: Arc<ClassifierClient>,
    feedback_store: Arc<dyn FeedbackStore>,
    alert_engine: Arc<AlertEngine>,
    broadcaster: Arc<dyn EventBroadcaster>,
    locks: Arc<FeedbackLocks>,
}

impl SentimentHandler {
    pub fn new(
        classifier: Arc<ClassifierClient>,
        feedback_store: Arc<dyn FeedbackStore>,
        alert_engine: Arc<AlertEngine>,
        broadcaster: Arc<dyn EventBroadcaster>,
        locks: Arc<FeedbackLocks>,
    ) -> Self {
        Self {
            classifier,
            feedback_store,
            alert_engine,
            broadcaster,
            locks,
        }
    }
}

#[async_trait]
impl JobHandler for SentimentHandler {
    async fn handle(&self, ctx: &JobContext) -> Result<(), JobError> {
        let payload: SentimentJobPayload = ctx
            .job()
            .payload_as()
            .map_err(|e| JobError::Permanent(format!("invalid sentiment payload: {}", e)))?;

        let item = self
            .feedback_store
            .get_feedback(&payload.feedback_id)?
            .ok_or_else(|| {
                JobError::Permanent(format!("feedback {} not found", payload.feedback_id))
            })?;

        let outcome = self.classifier.analyze(&payload.text).await;
        let result = outcome.into_result(&item.id, chrono::Utc::now().timestamp());

        {
            let _guard = self.locks.lock(&item.id).await;
            self.feedback_store.replace_analysis(&result)?;
            self.feedback_store.set_processed(&item.id, true)?;
        }
        debug!(
            feedback_id = %item.id,
            attempt = ctx.attempt(),
            "Stored {} analysis",
            result.sentiment
        );

        match self.alert_engine.evaluate(item.channel, result.sentiment) {
            Ok(alerts) if !alerts.is_empty() => {
                info!("{} alert(s) raised for {}", alerts.len(), item.channel)
            }
            Ok(_) => {}
            Err(e) => error!("Alert evaluation failed for {}: {:#}", item.id, e),
        }

        self.broadcaster.publish(
            Topic::SentimentAnalyzed,
            json!({
                "feedbackId": item.id,
                "channel": item.channel,
                "sentiment": result.sentiment,
                "score": result.score,
                "confidence": result.confidence,
                "primaryEmotion": result.primary_emotion,
                "keyPhrases": result.key_phrases,
            }),
        );
        Ok(())
    }
}
