use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job_queue::JobError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptStatus {
    Queued,
    Processing,
    Completed,
    Error,
}

impl TranscriptStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TranscriptStatus::Completed | TranscriptStatus::Error)
    }
}

/// Provider view of one transcription request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub id: String,
    pub status: TranscriptStatus,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub words: Vec<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Error)]
pub enum TranscriptionError {
    #[error("transcription request failed: {0}")]
    Http(String),

    #[error("transcription provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid transcription response: {0}")]
    InvalidResponse(String),
}

impl TranscriptionError {
    /// Client errors other than 429 will not improve by retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            TranscriptionError::Http(_) | TranscriptionError::InvalidResponse(_) => true,
            TranscriptionError::Api { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

impl From<TranscriptionError> for JobError {
    fn from(e: TranscriptionError) -> Self {
        if e.is_retryable() {
            JobError::Retryable(e.to_string())
        } else {
            JobError::Permanent(e.to_string())
        }
    }
}

/// A hosted speech-to-text provider with asynchronous transcription.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Submit an audio URL and return the provider's transcript id.
    async fn submit_transcription(&self, audio_url: &str) -> Result<String, TranscriptionError>;

    async fn get_transcript(&self, transcript_id: &str) -> Result<Transcript, TranscriptionError>;
}
