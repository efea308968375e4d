use super::{EventBroadcaster, EventEnvelope, Topic};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// In-process event bus built on a tokio broadcast channel.
///
/// Slow subscribers lag and lose the oldest events; publishing never waits.
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Log every event at debug level until the bus is dropped.
    pub fn spawn_log_subscriber(&self) -> tokio::task::JoinHandle<()> {
        let mut receiver = self.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => debug!(topic = %event.event_type, "event: {}", event.data),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Event log subscriber lagged, skipped {} events", skipped)
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBroadcaster for EventBus {
    fn publish(&self, topic: Topic, data: serde_json::Value) {
        if self.sender.send(EventEnvelope::new(topic, data)).is_err() {
            debug!("No subscribers for {}", topic);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(Topic::FeedbackNew, json!({"id": "fb-1"}));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, "feedback:new");
        assert_eq!(event.data, json!({"id": "fb-1"}));
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.publish(Topic::MetricsUpdate, json!({}));
    }
}
