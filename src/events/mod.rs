//! Publish-only event fan-out for pipeline activity.

mod bus;

pub use bus::EventBus;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    FeedbackNew,
    SentimentAnalyzed,
    AlertNew,
    AlertUpdated,
    AlertCritical,
    MetricsUpdate,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::FeedbackNew => "feedback:new",
            Topic::SentimentAnalyzed => "sentiment:analyzed",
            Topic::AlertNew => "alert:new",
            Topic::AlertUpdated => "alert:updated",
            Topic::AlertCritical => "alert:critical",
            Topic::MetricsUpdate => "metrics:update",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire envelope: `{type, data, timestamp}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: serde_json::Value,
    pub timestamp: String,
}

impl EventEnvelope {
    pub fn new(topic: Topic, data: serde_json::Value) -> Self {
        Self {
            event_type: topic.as_str().to_string(),
            data,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Fire-and-forget publisher. Implementations must never block or fail the caller.
pub trait EventBroadcaster: Send + Sync {
    fn publish(&self, topic: Topic, data: serde_json::Value);
}
