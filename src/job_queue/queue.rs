//! Producer-side handle on the job queue.

use super::models::*;
use super::queue_store::JobQueueStore;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info};

/// Durable, priority-ordered queue shared by producers and workers.
///
/// Enqueueing wakes the idle consumer of that job type.
pub struct JobQueue {
    store: Arc<dyn JobQueueStore>,
    wakeups: HashMap<JobType, Arc<Notify>>,
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl JobQueue {
    pub fn new(store: Arc<dyn JobQueueStore>) -> Self {
        let wakeups = JobType::ALL
            .iter()
            .map(|job_type| (*job_type, Arc::new(Notify::new())))
            .collect();
        Self { store, wakeups }
    }

    pub fn store(&self) -> &Arc<dyn JobQueueStore> {
        &self.store
    }

    pub(crate) fn wakeup(&self, job_type: JobType) -> Arc<Notify> {
        self.wakeups[&job_type].clone()
    }

    pub fn enqueue<P: Serialize>(
        &self,
        job_type: JobType,
        payload: &P,
        options: EnqueueOptions,
    ) -> Result<JobId> {
        let payload = serde_json::to_value(payload).context("Failed to serialize job payload")?;
        let id = self.store.enqueue(job_type, &payload, &options, now_ms())?;
        debug!(
            job_id = id,
            priority = options.priority,
            "Enqueued {} job",
            job_type
        );
        self.wakeups[&job_type].notify_one();
        Ok(id)
    }

    pub fn update_payload<P: Serialize>(&self, job_id: JobId, payload: &P) -> Result<()> {
        let payload = serde_json::to_value(payload)?;
        if !self.store.update_payload(job_id, &payload)? {
            anyhow::bail!("Job {} no longer exists", job_id);
        }
        Ok(())
    }

    pub fn stats(&self, job_type: JobType) -> Result<QueueStats> {
        self.store.stats(job_type)
    }

    /// Requeue jobs left `ACTIVE` by a previous process.
    pub fn recover_interrupted(&self) -> Result<usize> {
        let recovered = self.store.recover_interrupted()?;
        if recovered > 0 {
            info!("Recovered {} interrupted jobs", recovered);
            for notify in self.wakeups.values() {
                notify.notify_one();
            }
        }
        Ok(recovered)
    }

    pub fn retry_dead_job(&self, dead_job_id: i64) -> Result<Option<JobId>> {
        let job_id = self.store.retry_dead_job(dead_job_id, now_ms())?;
        if let Some(job_id) = job_id {
            info!("Dead job {} requeued as job {}", dead_job_id, job_id);
            if let Some(job) = self.store.get_job(job_id)? {
                self.wakeups[&job.job_type].notify_one();
            }
        }
        Ok(job_id)
    }
}
