//! Consumer loop for one job type.
//!
//! Runs up to `concurrency` handlers in parallel, rate limited by a token
//! bucket. On shutdown it stops claiming, gives in-flight jobs
//! `shutdown_grace` to finish, then cancels them and releases their rows
//! back to the queue.

use super::handler::{JobContext, JobError, JobHandler};
use super::models::{JobType, QueuedJob};
use super::queue::{now_ms, JobQueue};
use super::rate_limiter::{RateLimit, RateLimiter, TokenBucket};
use super::retry_policy::{RetryDecision, RetryPolicy};
use crate::server::metrics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct ConsumeOptions {
    pub concurrency: usize,
    pub rate_limit: RateLimit,
    /// Idle poll interval, for delayed jobs becoming due.
    pub poll_interval: Duration,
    pub shutdown_grace: Duration,
    pub retry_policy: RetryPolicy,
}

impl Default for ConsumeOptions {
    fn default() -> Self {
        Self {
            concurrency: 10,
            rate_limit: RateLimit::per_second(10),
            poll_interval: Duration::from_millis(500),
            shutdown_grace: Duration::from_secs(30),
            retry_policy: RetryPolicy::default(),
        }
    }
}

pub struct JobWorker {
    queue: Arc<JobQueue>,
    job_type: JobType,
    handler: Arc<dyn JobHandler>,
    limiter: Arc<dyn RateLimiter>,
    options: ConsumeOptions,
}

impl JobWorker {
    pub fn new(
        queue: Arc<JobQueue>,
        job_type: JobType,
        handler: Arc<dyn JobHandler>,
        options: ConsumeOptions,
    ) -> Self {
        let limiter = Arc::new(TokenBucket::new(options.rate_limit));
        Self {
            queue,
            job_type,
            handler,
            limiter,
            options,
        }
    }

    /// Consume jobs until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let concurrency = self.options.concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let force_cancel = CancellationToken::new();
        let wakeup = self.queue.wakeup(self.job_type);
        let mut in_flight = JoinSet::new();

        info!(
            "{} worker started (concurrency {}, {} jobs per {:?})",
            self.job_type, concurrency, self.options.rate_limit.max, self.options.rate_limit.per
        );

        loop {
            while let Some(joined) = in_flight.try_join_next() {
                if let Err(e) = joined {
                    error!("{} job task panicked: {}", self.job_type, e);
                }
            }

            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            // Take the token before claiming: a throttled job stays WAITING.
            if !self.wait_for_token(&shutdown).await {
                break;
            }

            let job = match self.queue.store().claim_next(self.job_type, now_ms()) {
                Ok(job) => job,
                Err(e) => {
                    error!("Failed to claim {} job: {:#}", self.job_type, e);
                    None
                }
            };

            let Some(job) = job else {
                self.limiter.refund().await;
                drop(permit);
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = wakeup.notified() => {}
                    _ = tokio::time::sleep(self.options.poll_interval) => {}
                }
                continue;
            };

            debug!(job_id = job.id, "Starting {} job", self.job_type);
            in_flight.spawn(execute(
                self.queue.clone(),
                self.handler.clone(),
                self.options.retry_policy.clone(),
                job,
                force_cancel.child_token(),
                permit,
            ));
        }

        self.drain(in_flight, force_cancel).await;
        info!("{} worker stopped", self.job_type);
    }

    /// Returns false if shutdown arrived first.
    async fn wait_for_token(&self, shutdown: &CancellationToken) -> bool {
        loop {
            match self.limiter.try_acquire().await {
                Ok(()) => return true,
                Err(wait) => {
                    tokio::select! {
                        _ = shutdown.cancelled() => return false,
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
            }
        }
    }

    async fn drain(&self, mut in_flight: JoinSet<()>, force_cancel: CancellationToken) {
        if in_flight.is_empty() {
            return;
        }
        info!(
            "Waiting up to {:?} for {} in-flight {} jobs",
            self.options.shutdown_grace,
            in_flight.len(),
            self.job_type
        );
        let drained = tokio::time::timeout(self.options.shutdown_grace, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(
                "{} in-flight {} jobs did not finish in time, cancelling",
                in_flight.len(),
                self.job_type
            );
            force_cancel.cancel();
            while in_flight.join_next().await.is_some() {}
        }
    }
}

async fn execute(
    queue: Arc<JobQueue>,
    handler: Arc<dyn JobHandler>,
    retry_policy: RetryPolicy,
    job: QueuedJob,
    cancel: CancellationToken,
    _permit: OwnedSemaphorePermit,
) {
    let started = Instant::now();
    let job_type = job.job_type;
    let ctx = JobContext::new(job.clone(), queue.clone(), cancel.clone());

    let result = tokio::select! {
        result = handler.handle(&ctx) => Some(result),
        _ = cancel.cancelled() => None,
    };
    let store = queue.store();

    match result {
        None => {
            warn!(job_id = job.id, "{} job cancelled, returning it to the queue", job_type);
            if let Err(e) = store.release(job.id) {
                error!(job_id = job.id, "Failed to release cancelled job: {:#}", e);
            }
            metrics::record_job(job_type.as_str(), "released", started.elapsed());
        }
        Some(_) if cancel.is_cancelled() => {
            if let Err(e) = store.release(job.id) {
                error!(job_id = job.id, "Failed to release cancelled job: {:#}", e);
            }
            metrics::record_job(job_type.as_str(), "released", started.elapsed());
        }
        Some(Ok(())) => {
            if let Err(e) = store.complete(job.id, now_ms()) {
                error!(job_id = job.id, "Failed to mark job completed: {:#}", e);
            }
            debug!(job_id = job.id, "{} job completed in {:?}", job_type, started.elapsed());
            metrics::record_job(job_type.as_str(), "completed", started.elapsed());
        }
        Some(Err(job_error)) => {
            handle_failure(&queue, handler.as_ref(), &retry_policy, &job, job_error).await;
            metrics::record_job(job_type.as_str(), "failed", started.elapsed());
        }
    }
}

async fn handle_failure(
    queue: &JobQueue,
    handler: &dyn JobHandler,
    retry_policy: &RetryPolicy,
    job: &QueuedJob,
    job_error: JobError,
) {
    let store = queue.store();
    match retry_policy.decide(job, &job_error) {
        RetryDecision::RetryAfter(delay) => {
            warn!(
                job_id = job.id,
                attempt = job.attempts_made + 1,
                max_attempts = job.max_attempts,
                "{} job failed, retrying in {:?}: {}",
                job.job_type,
                delay,
                job_error
            );
            let available_at = now_ms() + delay.as_millis() as i64;
            if let Err(e) = store.schedule_retry(job.id, available_at, job_error.message()) {
                error!(job_id = job.id, "Failed to schedule retry: {:#}", e);
            }
        }
        RetryDecision::Bury => {
            error!(
                job_id = job.id,
                attempt = job.attempts_made + 1,
                "{} job moved to dead jobs: {}",
                job.job_type,
                job_error
            );
            if let Err(e) = store.bury(job.id, job_error.message(), now_ms()) {
                error!(job_id = job.id, "Failed to archive dead job: {:#}", e);
            }
            handler.on_failed(job, &job_error).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_queue::models::{EnqueueOptions, JobStatus};
    use crate::job_queue::queue_store::{RetentionSettings, SqliteJobQueueStore};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    fn queue() -> Arc<JobQueue> {
        Arc::new(JobQueue::new(Arc::new(
            SqliteJobQueueStore::in_memory(RetentionSettings::default()).unwrap(),
        )))
    }

    fn options(concurrency: usize) -> ConsumeOptions {
        ConsumeOptions {
            concurrency,
            rate_limit: RateLimit::per_second(1000),
            poll_interval: Duration::from_millis(10),
            shutdown_grace: Duration::from_millis(200),
            retry_policy: RetryPolicy::new(Duration::from_millis(20)),
        }
    }

    fn enqueue(queue: &JobQueue, priority: i32, max_attempts: u32, name: &str) -> i64 {
        queue
            .enqueue(
                JobType::Sentiment,
                &json!({ "name": name }),
                EnqueueOptions {
                    priority,
                    max_attempts,
                    backoff: Duration::from_millis(5),
                },
            )
            .unwrap()
    }

    /// Records job names; fails the first `failures` attempts of each job.
    #[derive(Default)]
    struct ScriptedHandler {
        seen: Mutex<Vec<String>>,
        failures: u32,
        permanent: bool,
        hang: bool,
        failed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl JobHandler for ScriptedHandler {
        async fn handle(&self, ctx: &JobContext) -> Result<(), JobError> {
            let name = ctx.job().payload["name"].as_str().unwrap().to_string();
            self.seen.lock().unwrap().push(name.clone());
            if self.hang {
                std::future::pending::<()>().await;
            }
            if self.permanent {
                return Err(JobError::Permanent(format!("{} is broken", name)));
            }
            if ctx.job().attempts_made < self.failures {
                return Err(JobError::Retryable("try again".to_string()));
            }
            Ok(())
        }

        async fn on_failed(&self, job: &QueuedJob, _error: &JobError) {
            let name = job.payload["name"].as_str().unwrap().to_string();
            self.failed.lock().unwrap().push(name);
        }
    }

    async fn run_until<F: Fn() -> bool>(
        queue: Arc<JobQueue>,
        handler: Arc<ScriptedHandler>,
        concurrency: usize,
        done: F,
    ) {
        let shutdown = CancellationToken::new();
        let worker = JobWorker::new(queue, JobType::Sentiment, handler, options(concurrency));
        let task = tokio::spawn(worker.run(shutdown.clone()));
        tokio::time::timeout(Duration::from_secs(5), async {
            while !done() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("worker did not reach expected state");
        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn processes_in_priority_order() {
        let queue = queue();
        enqueue(&queue, 5, 3, "normal-1");
        enqueue(&queue, 5, 3, "normal-2");
        enqueue(&queue, 1, 3, "vip");

        let handler = Arc::new(ScriptedHandler::default());
        let watched = handler.clone();
        run_until(queue.clone(), handler.clone(), 1, move || {
            watched.seen.lock().unwrap().len() == 3
        })
        .await;

        assert_eq!(
            *handler.seen.lock().unwrap(),
            vec!["vip", "normal-1", "normal-2"]
        );
        assert_eq!(queue.stats(JobType::Sentiment).unwrap().completed, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_job_stays_waiting_and_can_be_overtaken() {
        let queue = queue();
        enqueue(&queue, 5, 3, "first");

        let handler = Arc::new(ScriptedHandler::default());
        let shutdown = CancellationToken::new();
        let worker = JobWorker::new(
            queue.clone(),
            JobType::Sentiment,
            handler.clone(),
            ConsumeOptions {
                rate_limit: RateLimit::per_minute(1),
                ..options(1)
            },
        );
        let task = tokio::spawn(worker.run(shutdown.clone()));

        while handler.seen.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        enqueue(&queue, 5, 3, "normal");
        tokio::time::sleep(Duration::from_secs(10)).await;

        let stats = queue.stats(JobType::Sentiment).unwrap();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.waiting, 1);

        enqueue(&queue, 1, 3, "vip");
        tokio::time::sleep(Duration::from_secs(55)).await;
        assert_eq!(*handler.seen.lock().unwrap(), vec!["first", "vip"]);

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let queue = queue();
        let id = enqueue(&queue, 5, 3, "flaky");

        let handler = Arc::new(ScriptedHandler {
            failures: 2,
            ..Default::default()
        });
        let store = queue.store().clone();
        run_until(queue.clone(), handler.clone(), 2, move || {
            store
                .get_job(id)
                .unwrap()
                .is_some_and(|job| job.status == JobStatus::Completed)
        })
        .await;

        assert_eq!(handler.seen.lock().unwrap().len(), 3);
        assert!(handler.failed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn exhausted_job_is_archived_and_reported() {
        let queue = queue();
        enqueue(&queue, 5, 2, "doomed");

        let handler = Arc::new(ScriptedHandler {
            failures: 10,
            ..Default::default()
        });
        let watched = handler.clone();
        run_until(queue.clone(), handler.clone(), 1, move || {
            !watched.failed.lock().unwrap().is_empty()
        })
        .await;

        assert_eq!(handler.seen.lock().unwrap().len(), 2);
        let dead = queue.store().list_dead(JobType::Sentiment, 10).unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts_made, 2);
    }

    #[tokio::test]
    async fn permanent_error_skips_remaining_attempts() {
        let queue = queue();
        enqueue(&queue, 5, 5, "bad-input");

        let handler = Arc::new(ScriptedHandler {
            permanent: true,
            ..Default::default()
        });
        let watched = handler.clone();
        run_until(queue.clone(), handler.clone(), 1, move || {
            !watched.failed.lock().unwrap().is_empty()
        })
        .await;

        assert_eq!(*handler.seen.lock().unwrap(), vec!["bad-input"]);
        let dead = queue.store().list_dead(JobType::Sentiment, 10).unwrap();
        assert_eq!(dead[0].error, "bad-input is broken");
    }

    #[tokio::test]
    async fn shutdown_releases_jobs_that_outlive_grace_period() {
        let queue = queue();
        let id = enqueue(&queue, 5, 3, "slow");

        let handler = Arc::new(ScriptedHandler {
            hang: true,
            ..Default::default()
        });
        let watched = handler.clone();
        run_until(queue.clone(), handler.clone(), 1, move || {
            !watched.seen.lock().unwrap().is_empty()
        })
        .await;

        let job = queue.store().get_job(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Waiting);
        assert_eq!(job.attempts_made, 0);
    }
}
