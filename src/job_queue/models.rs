//! Data types for the job queue.

use crate::feedback_store::Channel;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub type JobId = i64;

/// Priority for VIP submissions and re-transcribed text.
pub const PRIORITY_ELEVATED: i32 = 1;
/// Priority for normal submissions and bulk imports.
pub const PRIORITY_NORMAL: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Sentiment,
    Transcription,
}

impl JobType {
    pub const ALL: [JobType; 2] = [JobType::Sentiment, JobType::Transcription];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Sentiment => "sentiment",
            JobType::Transcription => "transcription",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "sentiment" => Some(JobType::Sentiment),
            "transcription" => Some(JobType::Transcription),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a queued job.
///
/// `WAITING` and `DELAYED` rows are both claimable once `available_at` has
/// passed; `DELAYED` marks a job that already failed at least once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Waiting,
    Delayed,
    Active,
    Completed,
}

impl JobStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            JobStatus::Waiting => "WAITING",
            JobStatus::Delayed => "DELAYED",
            JobStatus::Active => "ACTIVE",
            JobStatus::Completed => "COMPLETED",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "WAITING" => Some(JobStatus::Waiting),
            "DELAYED" => Some(JobStatus::Delayed),
            "ACTIVE" => Some(JobStatus::Active),
            "COMPLETED" => Some(JobStatus::Completed),
            _ => None,
        }
    }
}

/// A job row. All timestamps are unix milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueuedJob {
    pub id: JobId,
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub priority: i32,
    pub status: JobStatus,
    /// Number of attempts that ended in failure.
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub available_at: i64,
    pub enqueued_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub last_error: Option<String>,
}

impl QueuedJob {
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

/// A job that exhausted its attempts, or failed permanently.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeadJob {
    pub id: i64,
    pub original_job_id: JobId,
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub priority: i32,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub error: String,
    pub enqueued_at: i64,
    pub failed_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnqueueOptions {
    pub priority: i32,
    pub max_attempts: u32,
    pub backoff: Duration,
}

/// Per-type attempt budget and backoff base used when enqueueing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobDefaults {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl JobDefaults {
    pub fn options(&self, priority: i32) -> EnqueueOptions {
        EnqueueOptions {
            priority,
            max_attempts: self.max_attempts,
            backoff: self.backoff,
        }
    }
}

impl Default for JobDefaults {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub waiting: u64,
    pub delayed: u64,
    pub active: u64,
    pub completed: u64,
    pub dead: u64,
}

/// Payload of a `sentiment` job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentJobPayload {
    pub feedback_id: String,
    pub text: String,
    pub priority: i32,
    pub channel_id: Channel,
}

/// Payload of a `transcription` job. `transcript_id` is written back after
/// the audio has been submitted once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionJobPayload {
    pub feedback_id: String,
    pub audio_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_id: Option<String>,
}
