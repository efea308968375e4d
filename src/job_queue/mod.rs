//! Durable priority job queue with retry, backoff and per-role workers.

mod handler;
mod models;
mod queue;
mod queue_store;
mod rate_limiter;
mod retry_policy;
mod schema;
mod worker;

pub use handler::{JobContext, JobError, JobHandler};
pub use models::*;
pub use queue::JobQueue;
pub use queue_store::{JobQueueStore, RetentionSettings, SqliteJobQueueStore};
pub use rate_limiter::{RateLimit, RateLimiter, TokenBucket};
pub use retry_policy::{RetryDecision, RetryPolicy};
pub use worker::{ConsumeOptions, JobWorker};
