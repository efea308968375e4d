//! Handler for `transcription` jobs.
//!
//! Submits the audio once, persists the provider's transcript id into the
//! job payload, then polls. A retried attempt with a persisted id resumes
//! polling instead of submitting again. On success the transcript replaces
//! the placeholder comment, any stale analysis is dropped and a sentiment
//! job is enqueued at elevated priority.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::locks::FeedbackLocks;
use crate::config::TranscriptionSettings;
use crate::feedback_store::{metadata_keys, FeedbackStore, Metadata};
use crate::job_queue::{
    JobContext, JobDefaults, JobError, JobHandler, JobType, QueuedJob, SentimentJobPayload,
    TranscriptionJobPayload, PRIORITY_ELEVATED,
};
use crate::transcription::{SpeechToText, Transcript, TranscriptStatus};

pub struct TranscriptionHandler {
    stt: Arc<dyn SpeechToText>,
    feedback_store: Arc<dyn FeedbackStore>,
    locks: Arc<FeedbackLocks>,
    sentiment_defaults: JobDefaults,
    polling_attempts: u32,
    polling_interval: Duration,
}

impl TranscriptionHandler {
    pub fn new(
        stt: Arc<dyn SpeechToText>,
        feedback_store: Arc<dyn FeedbackStore>,
        locks: Arc<FeedbackLocks>,
        settings: &TranscriptionSettings,
        sentiment_defaults: JobDefaults,
    ) -> Self {
        Self {
            stt,
            feedback_store,
            locks,
            sentiment_defaults,
            polling_attempts: settings.polling_attempts.max(1),
            polling_interval: settings.polling_interval,
        }
    }

    async fn poll(&self, ctx: &JobContext, transcript_id: &str) -> Result<Transcript, JobError> {
        for poll in 1..=self.polling_attempts {
            let transcript = self.stt.get_transcript(transcript_id).await?;
            match transcript.status {
                TranscriptStatus::Completed => return Ok(transcript),
                TranscriptStatus::Error => {
                    let message = transcript
                        .error
                        .unwrap_or_else(|| "transcription failed".to_string());
                    return Err(JobError::Permanent(message));
                }
                TranscriptStatus::Queued | TranscriptStatus::Processing => {
                    debug!(transcript_id, poll, "Transcript not ready");
                }
            }

            if poll < self.polling_attempts {
                tokio::select! {
                    _ = tokio::time::sleep(self.polling_interval) => {}
                    _ = ctx.cancelled() => {
                        return Err(JobError::Retryable("cancelled while polling".to_string()));
                    }
                }
            }
        }

        Err(JobError::Permanent(format!(
            "transcript {} not ready after {} polls",
            transcript_id, self.polling_attempts
        )))
    }

    async fn hand_off(
        &self,
        ctx: &JobContext,
        feedback_id: &str,
        transcript_id: &str,
        text: &str,
        confidence: Option<f64>,
    ) -> Result<(), JobError> {
        let item = self
            .feedback_store
            .get_feedback(feedback_id)?
            .ok_or_else(|| JobError::Permanent(format!("feedback {} not found", feedback_id)))?;

        let mut patch = Metadata::new();
        patch.insert(
            metadata_keys::TRANSCRIPTION_STATUS.to_string(),
            json!("completed"),
        );
        patch.insert(metadata_keys::TRANSCRIPT_ID.to_string(), json!(transcript_id));
        if let Some(confidence) = confidence {
            patch.insert(
                metadata_keys::TRANSCRIPTION_CONFIDENCE.to_string(),
                json!(confidence),
            );
        }

        {
            let _guard = self.locks.lock(feedback_id).await;
            if !self.feedback_store.update_comment(feedback_id, text, &patch)? {
                return Err(JobError::Permanent(format!(
                    "feedback {} not found",
                    feedback_id
                )));
            }
            if self.feedback_store.delete_analysis(feedback_id)? {
                debug!(feedback_id, "Dropped analysis of the placeholder text");
            }
            self.feedback_store.set_processed(feedback_id, false)?;
        }

        let payload = SentimentJobPayload {
            feedback_id: feedback_id.to_string(),
            text: text.to_string(),
            priority: PRIORITY_ELEVATED,
            channel_id: item.channel,
        };
        ctx.queue().enqueue(
            JobType::Sentiment,
            &payload,
            self.sentiment_defaults.options(PRIORITY_ELEVATED),
        )?;
        Ok(())
    }
}

#[async_trait]
impl JobHandler for TranscriptionHandler {
    async fn handle(&self, ctx: &JobContext) -> Result<(), JobError> {
        let mut payload: TranscriptionJobPayload = ctx
            .job()
            .payload_as()
            .map_err(|e| JobError::Permanent(format!("invalid transcription payload: {}", e)))?;

        let transcript_id = match &payload.transcript_id {
            Some(id) => {
                info!(
                    feedback_id = %payload.feedback_id,
                    attempt = ctx.attempt(),
                    "Resuming transcript {}",
                    id
                );
                id.clone()
            }
            None => {
                let id = self.stt.submit_transcription(&payload.audio_url).await?;
                payload.transcript_id = Some(id.clone());
                ctx.update_payload(&payload)?;
                info!(feedback_id = %payload.feedback_id, "Submitted transcript {}", id);
                id
            }
        };

        let transcript = self.poll(ctx, &transcript_id).await?;
        let text = transcript.text.as_deref().map(str::trim).unwrap_or_default();
        if text.is_empty() {
            return Err(JobError::Retryable("empty transcript".to_string()));
        }

        self.hand_off(
            ctx,
            &payload.feedback_id,
            &transcript_id,
            text,
            transcript.confidence,
        )
        .await
    }

    async fn on_failed(&self, job: &QueuedJob, error: &JobError) {
        let payload: TranscriptionJobPayload = match job.payload_as() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Dead transcription job {} has invalid payload: {}", job.id, e);
                return;
            }
        };

        let mut patch = Metadata::new();
        patch.insert(
            metadata_keys::TRANSCRIPTION_STATUS.to_string(),
            json!("failed"),
        );
        patch.insert(
            metadata_keys::TRANSCRIPTION_ERROR.to_string(),
            json!(error.message()),
        );

        match self.feedback_store.merge_metadata(&payload.feedback_id, &patch) {
            Ok(true) => warn!(
                feedback_id = %payload.feedback_id,
                "Transcription failed: {}",
                error.message()
            ),
            Ok(false) => warn!("Feedback {} vanished before failure could be recorded", payload.feedback_id),
            Err(e) => error!(
                "Failed to record transcription failure for {}: {:#}",
                payload.feedback_id, e
            ),
        }
    }
}
