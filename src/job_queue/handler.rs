//! The seam between the queue and the code that processes jobs.

use super::models::{JobId, QueuedJob};
use super::queue::JobQueue;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Handler failure. `Permanent` skips the remaining attempts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("{0}")]
    Retryable(String),
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl JobError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, JobError::Retryable(_))
    }

    pub fn message(&self) -> &str {
        match self {
            JobError::Retryable(message) | JobError::Permanent(message) => message,
        }
    }
}

impl From<anyhow::Error> for JobError {
    fn from(e: anyhow::Error) -> Self {
        JobError::Retryable(format!("{:#}", e))
    }
}

/// Everything a handler may use while processing one job.
pub struct JobContext {
    job: QueuedJob,
    queue: Arc<JobQueue>,
    cancel: CancellationToken,
}

impl JobContext {
    pub fn new(job: QueuedJob, queue: Arc<JobQueue>, cancel: CancellationToken) -> Self {
        Self { job, queue, cancel }
    }

    pub fn job(&self) -> &QueuedJob {
        &self.job
    }

    pub fn job_id(&self) -> JobId {
        self.job.id
    }

    /// 1-based number of the attempt in progress.
    pub fn attempt(&self) -> u32 {
        self.job.attempts_made + 1
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Persist a new payload for this job, so a later attempt sees it.
    pub fn update_payload<P: Serialize>(&self, payload: &P) -> anyhow::Result<()> {
        self.queue.update_payload(self.job.id, payload)
    }
}

#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, ctx: &JobContext) -> Result<(), JobError>;

    /// Called once when the job is moved to the dead-job archive.
    async fn on_failed(&self, _job: &QueuedJob, _error: &JobError) {}
}
