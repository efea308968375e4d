//! Job handlers and the background tasks that drive them.

mod locks;
mod sentiment;
mod stats_publisher;
mod transcription;

pub use locks::FeedbackLocks;
pub use sentiment::SentimentHandler;
pub use stats_publisher::QueueStatsPublisher;
pub use transcription::TranscriptionHandler;

use crate::config::AppConfig;
use crate::job_queue::{ConsumeOptions, RateLimit, RetryPolicy};

pub fn sentiment_consume_options(config: &AppConfig) -> ConsumeOptions {
    ConsumeOptions {
        concurrency: config.sentiment_worker.concurrency,
        rate_limit: RateLimit::per_second(config.sentiment_worker.jobs_per_second),
        poll_interval: config.queue.poll_interval,
        shutdown_grace: config.queue.shutdown_grace,
        retry_policy: RetryPolicy::new(config.queue.max_backoff),
    }
}

pub fn transcription_consume_options(config: &AppConfig) -> ConsumeOptions {
    ConsumeOptions {
        concurrency: config.transcription.concurrency,
        rate_limit: RateLimit::per_minute(config.transcription.jobs_per_minute),
        poll_interval: config.queue.poll_interval,
        shutdown_grace: config.queue.shutdown_grace,
        retry_policy: RetryPolicy::new(config.queue.max_backoff),
    }
}
