//! Entry point for new feedback.
//!
//! Stores the item, announces it on `feedback:new` and enqueues the job that
//! enriches it: a sentiment job for text, a transcription job for audio.
//!
//! The binary feeds it from `--import` files at startup. Embedders call it
//! directly.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::events::{EventBroadcaster, Topic};
use crate::feedback_store::{
    metadata_keys, Channel, CustomerSegment, FeedbackItem, FeedbackStore, Metadata, NewFeedback,
    TRANSCRIPTION_PLACEHOLDER,
};
use crate::job_queue::{
    JobDefaults, JobQueue, JobType, SentimentJobPayload, TranscriptionJobPayload,
    PRIORITY_ELEVATED, PRIORITY_NORMAL,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackSource {
    Direct,
    BulkImport,
}

pub struct FeedbackIntake {
    feedback_store: Arc<dyn FeedbackStore>,
    queue: Arc<JobQueue>,
    broadcaster: Arc<dyn EventBroadcaster>,
    sentiment_defaults: JobDefaults,
    transcription_defaults: JobDefaults,
}

fn sentiment_priority(segment: Option<CustomerSegment>, source: FeedbackSource) -> i32 {
    match (source, segment) {
        (FeedbackSource::BulkImport, _) => PRIORITY_NORMAL,
        (FeedbackSource::Direct, Some(CustomerSegment::Vip)) => PRIORITY_ELEVATED,
        (FeedbackSource::Direct, _) => PRIORITY_NORMAL,
    }
}

impl FeedbackIntake {
    pub fn new(
        feedback_store: Arc<dyn FeedbackStore>,
        queue: Arc<JobQueue>,
        broadcaster: Arc<dyn EventBroadcaster>,
        sentiment_defaults: JobDefaults,
        transcription_defaults: JobDefaults,
    ) -> Self {
        Self {
            feedback_store,
            queue,
            broadcaster,
            sentiment_defaults,
            transcription_defaults,
        }
    }

    fn store_new(&self, channel: Channel, comment: Option<String>, metadata: Metadata) -> Result<FeedbackItem> {
        let item = FeedbackItem {
            id: uuid::Uuid::new_v4().to_string(),
            channel,
            comment,
            metadata,
            processed: false,
            created_at: chrono::Utc::now().timestamp(),
        };
        self.feedback_store
            .insert_feedback(&item)
            .with_context(|| format!("Failed to store feedback {}", item.id))?;
        self.broadcaster.publish(
            Topic::FeedbackNew,
            json!({
                "id": item.id,
                "channel": item.channel,
                "comment": item.comment,
                "createdAt": item.created_at,
            }),
        );
        Ok(item)
    }

    /// Store a text item and queue it for analysis. Returns the new id.
    pub fn submit_text(&self, feedback: NewFeedback, source: FeedbackSource) -> Result<String> {
        let priority = sentiment_priority(feedback.customer_segment, source);
        let text = feedback
            .comment
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string);

        let item = self.store_new(feedback.channel, feedback.comment, feedback.metadata)?;

        match text {
            Some(text) => {
                let payload = SentimentJobPayload {
                    feedback_id: item.id.clone(),
                    text,
                    priority,
                    channel_id: item.channel,
                };
                self.queue.enqueue(
                    JobType::Sentiment,
                    &payload,
                    self.sentiment_defaults.options(priority),
                )?;
            }
            None => debug!("Feedback {} has no text, not queued for analysis", item.id),
        }
        Ok(item.id)
    }

    /// Submit every item as a bulk import. Failed items are logged and skipped.
    pub fn submit_bulk(&self, items: Vec<NewFeedback>) -> Vec<String> {
        let total = items.len();
        let ids: Vec<String> = items
            .into_iter()
            .enumerate()
            .filter_map(
                |(index, feedback)| match self.submit_text(feedback, FeedbackSource::BulkImport) {
                    Ok(id) => Some(id),
                    Err(e) => {
                        warn!("Bulk item {} rejected: {:#}", index, e);
                        None
                    }
                },
            )
            .collect();
        info!("Bulk import stored {}/{} items", ids.len(), total);
        ids
    }

    /// Store a voice item with the placeholder comment and queue transcription.
    pub fn submit_voice(&self, channel: Channel, audio_url: &str, metadata: Metadata) -> Result<String> {
        let mut metadata = metadata;
        metadata.insert(metadata_keys::AUDIO_URL.to_string(), json!(audio_url));
        metadata.insert(
            metadata_keys::TRANSCRIPTION_STATUS.to_string(),
            json!("pending"),
        );

        let item = self.store_new(
            channel,
            Some(TRANSCRIPTION_PLACEHOLDER.to_string()),
            metadata,
        )?;

        let payload = TranscriptionJobPayload {
            feedback_id: item.id.clone(),
            audio_url: audio_url.to_string(),
            transcript_id: None,
        };
        self.queue.enqueue(
            JobType::Transcription,
            &payload,
            self.transcription_defaults.options(PRIORITY_NORMAL),
        )?;
        Ok(item.id)
    }
}

/// Read a JSON array of text feedback items for `submit_bulk`.
pub fn load_import_file(path: &Path) -> Result<Vec<NewFeedback>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read import file: {:?}", path))?;
    let items: Vec<NewFeedback> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse import file: {:?}", path))?;
    Ok(items)
}
