use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::events::{EventBroadcaster, Topic};
use crate::job_queue::{JobQueue, JobType, QueueStats};
use crate::server::metrics;

/// Periodically exports queue depth to Prometheus and the event bus.
pub struct QueueStatsPublisher {
    queue: Arc<JobQueue>,
    broadcaster: Arc<dyn EventBroadcaster>,
    interval: Duration,
}

impl QueueStatsPublisher {
    pub fn new(
        queue: Arc<JobQueue>,
        broadcaster: Arc<dyn EventBroadcaster>,
        interval: Duration,
    ) -> Self {
        Self {
            queue,
            broadcaster,
            interval,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.publish_once(),
                _ = shutdown.cancelled() => break,
            }
        }
        debug!("Queue stats publisher stopped");
    }

    pub fn publish_once(&self) {
        let mut queues = Map::new();
        for job_type in JobType::ALL {
            match self.queue.stats(job_type) {
                Ok(stats) => {
                    update_gauges(job_type, &stats);
                    queues.insert(job_type.as_str().to_string(), json!(stats));
                }
                Err(e) => warn!("Failed to read {} queue stats: {:#}", job_type, e),
            }
        }
        self.broadcaster
            .publish(Topic::MetricsUpdate, json!({ "queues": Value::Object(queues) }));
    }
}

fn update_gauges(job_type: JobType, stats: &QueueStats) {
    let job_type = job_type.as_str();
    metrics::set_queue_depth(job_type, "waiting", stats.waiting);
    metrics::set_queue_depth(job_type, "delayed", stats.delayed);
    metrics::set_queue_depth(job_type, "active", stats.active);
    metrics::set_queue_depth(job_type, "completed", stats.completed);
    metrics::set_queue_depth(job_type, "dead", stats.dead);
}
