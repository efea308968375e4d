//! Alert data types.

use crate::feedback_store::Channel;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    SentimentSpike,
    HighVolumeNegative,
    TrendingTopic,
    ChannelPerformance,
    ChurnRisk,
    SystemAnomaly,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::SentimentSpike => "SENTIMENT_SPIKE",
            AlertType::HighVolumeNegative => "HIGH_VOLUME_NEGATIVE",
            AlertType::TrendingTopic => "TRENDING_TOPIC",
            AlertType::ChannelPerformance => "CHANNEL_PERFORMANCE",
            AlertType::ChurnRisk => "CHURN_RISK",
            AlertType::SystemAnomaly => "SYSTEM_ANOMALY",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "SENTIMENT_SPIKE" => Some(AlertType::SentimentSpike),
            "HIGH_VOLUME_NEGATIVE" => Some(AlertType::HighVolumeNegative),
            "TRENDING_TOPIC" => Some(AlertType::TrendingTopic),
            "CHANNEL_PERFORMANCE" => Some(AlertType::ChannelPerformance),
            "CHURN_RISK" => Some(AlertType::ChurnRisk),
            "SYSTEM_ANOMALY" => Some(AlertType::SystemAnomaly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    Critical,
    High,
    Medium,
    Low,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Critical => "CRITICAL",
            AlertSeverity::High => "HIGH",
            AlertSeverity::Medium => "MEDIUM",
            AlertSeverity::Low => "LOW",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "CRITICAL" => Some(AlertSeverity::Critical),
            "HIGH" => Some(AlertSeverity::High),
            "MEDIUM" => Some(AlertSeverity::Medium),
            "LOW" => Some(AlertSeverity::Low),
            _ => None,
        }
    }

    /// Critical and high alerts are additionally published on `alert:critical`.
    pub fn is_urgent(&self) -> bool {
        matches!(self, AlertSeverity::Critical | AlertSeverity::High)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    Open,
    InProgress,
    Resolved,
    Dismissed,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Open => "OPEN",
            AlertStatus::InProgress => "IN_PROGRESS",
            AlertStatus::Resolved => "RESOLVED",
            AlertStatus::Dismissed => "DISMISSED",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(AlertStatus::Open),
            "IN_PROGRESS" => Some(AlertStatus::InProgress),
            "RESOLVED" => Some(AlertStatus::Resolved),
            "DISMISSED" => Some(AlertStatus::Dismissed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AlertStatus::Resolved | AlertStatus::Dismissed)
    }

    pub fn can_transition_to(&self, next: AlertStatus) -> bool {
        match (self, next) {
            (AlertStatus::Open, AlertStatus::InProgress) => true,
            (AlertStatus::Open | AlertStatus::InProgress, AlertStatus::Resolved) => true,
            (AlertStatus::Open | AlertStatus::InProgress, AlertStatus::Dismissed) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: i64,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub status: AlertStatus,
    pub assigned_to: Option<String>,
    pub channel: Option<Channel>,
    pub threshold: serde_json::Value,
    pub data: serde_json::Value,
    pub created_at: i64,
    pub updated_at: i64,
    pub resolved_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAlert {
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub channel: Option<Channel>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub threshold: serde_json::Value,
    #[serde(default)]
    pub data: serde_json::Value,
}
