//! Rolling-window alert evaluation.
//!
//! After each classified item the engine counts negative results for the
//! item's channel over the trailing hour and day and raises alerts when
//! thresholds are crossed. An alert is skipped while another one with the
//! same `(type, channel)` is still open and younger than the dedup window.

use super::models::*;
use super::store::AlertStore;
use crate::config::AlertSettings;
use crate::events::{EventBroadcaster, Topic};
use crate::feedback_store::{Channel, FeedbackStore, Sentiment, WindowCounts};
use crate::server::metrics;
use anyhow::Result;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const HOUR_SECS: i64 = 60 * 60;
const DAY_SECS: i64 = 24 * HOUR_SECS;

#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("alert {0} not found")]
    NotFound(i64),
    #[error("cannot move alert from {from:?} to {to:?}")]
    InvalidTransition { from: AlertStatus, to: AlertStatus },
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub struct AlertEngine {
    feedback_store: Arc<dyn FeedbackStore>,
    alert_store: Arc<dyn AlertStore>,
    broadcaster: Arc<dyn EventBroadcaster>,
    settings: AlertSettings,
    // Serializes dedup-check-then-insert across concurrent sentiment jobs.
    evaluation_lock: Mutex<()>,
}

impl AlertEngine {
    pub fn new(
        feedback_store: Arc<dyn FeedbackStore>,
        alert_store: Arc<dyn AlertStore>,
        broadcaster: Arc<dyn EventBroadcaster>,
        settings: AlertSettings,
    ) -> Self {
        Self {
            feedback_store,
            alert_store,
            broadcaster,
            settings,
            evaluation_lock: Mutex::new(()),
        }
    }

    pub fn alert_store(&self) -> &Arc<dyn AlertStore> {
        &self.alert_store
    }

    /// Evaluate thresholds for `channel` after a result with `sentiment` was stored.
    /// Returns the alerts that were created.
    pub fn evaluate(&self, channel: Channel, sentiment: Sentiment) -> Result<Vec<Alert>> {
        self.evaluate_at(channel, sentiment, chrono::Utc::now().timestamp())
    }

    pub fn evaluate_at(&self, channel: Channel, sentiment: Sentiment, now: i64) -> Result<Vec<Alert>> {
        if !sentiment.is_negative() {
            return Ok(Vec::new());
        }

        let _guard = self.evaluation_lock.lock().unwrap();
        let last_hour = self
            .feedback_store
            .sentiment_window(channel, now - HOUR_SECS, now)?;
        let last_day = self
            .feedback_store
            .sentiment_window(channel, now - DAY_SECS, now)?;
        debug!(
            "Alert check for {}: 1h {}/{} negative, 24h {} negative",
            channel, last_hour.negative, last_hour.total, last_day.negative
        );

        let mut created = Vec::new();
        for candidate in self.candidates(channel, last_hour, last_day) {
            if let Some(alert) = self.raise(candidate, now)? {
                created.push(alert);
            }
        }
        Ok(created)
    }

    fn candidates(
        &self,
        channel: Channel,
        last_hour: WindowCounts,
        last_day: WindowCounts,
    ) -> Vec<NewAlert> {
        let s = &self.settings;
        let ratio = last_hour.negative_ratio();
        let mut candidates = Vec::new();

        if last_hour.negative >= s.high_volume_negative_1h {
            candidates.push(NewAlert {
                alert_type: AlertType::HighVolumeNegative,
                severity: AlertSeverity::High,
                title: format!("High volume of negative feedback on {}", channel),
                message: format!(
                    "{} negative feedback items on {} in the last hour",
                    last_hour.negative, channel
                ),
                channel: Some(channel),
                assigned_to: None,
                threshold: json!({ "negativeCount1h": s.high_volume_negative_1h }),
                data: json!({ "negativeCount1h": last_hour.negative, "window": "1h" }),
            });
        }

        if last_hour.total >= s.min_ratio_sample && ratio >= s.negative_ratio_1h {
            candidates.push(NewAlert {
                alert_type: AlertType::SentimentSpike,
                severity: AlertSeverity::Critical,
                title: format!("Negative sentiment spike on {}", channel),
                message: format!(
                    "{:.0}% of feedback on {} was negative in the last hour ({} of {})",
                    ratio * 100.0,
                    channel,
                    last_hour.negative,
                    last_hour.total
                ),
                channel: Some(channel),
                assigned_to: None,
                threshold: json!({
                    "negativeRatio1h": s.negative_ratio_1h,
                    "minSample": s.min_ratio_sample,
                }),
                data: json!({
                    "negativeCount1h": last_hour.negative,
                    "total1h": last_hour.total,
                    "negativeRatio1h": ratio,
                }),
            });
        }

        if last_hour.negative >= s.negative_count_1h {
            candidates.push(NewAlert {
                alert_type: AlertType::SentimentSpike,
                severity: AlertSeverity::High,
                title: format!("Negative sentiment spike on {}", channel),
                message: format!(
                    "{} negative feedback items on {} in the last hour",
                    last_hour.negative, channel
                ),
                channel: Some(channel),
                assigned_to: None,
                threshold: json!({ "negativeCount1h": s.negative_count_1h }),
                data: json!({ "negativeCount1h": last_hour.negative, "window": "1h" }),
            });
        }

        if last_day.negative >= s.negative_count_24h {
            candidates.push(NewAlert {
                alert_type: AlertType::SentimentSpike,
                severity: AlertSeverity::Medium,
                title: format!("Sustained negative sentiment on {}", channel),
                message: format!(
                    "{} negative feedback items on {} in the last 24 hours",
                    last_day.negative, channel
                ),
                channel: Some(channel),
                assigned_to: None,
                threshold: json!({ "negativeCount24h": s.negative_count_24h }),
                data: json!({ "negativeCount24h": last_day.negative, "window": "24h" }),
            });
        }

        candidates
    }

    /// Store `candidate` unless an active alert with the same key exists.
    fn raise(&self, candidate: NewAlert, now: i64) -> Result<Option<Alert>> {
        let since = now - self.settings.dedup_window.as_secs() as i64;
        if let Some(existing) =
            self.alert_store
                .find_recent_active(candidate.alert_type, candidate.channel, since)?
        {
            debug!(
                "Skipping {} {:?} alert, alert {} is still {}",
                candidate.alert_type.as_str(),
                candidate.channel,
                existing.id,
                existing.status.as_str()
            );
            return Ok(None);
        }

        let alert = self.alert_store.insert_alert(&candidate, now)?;
        info!(
            alert_id = alert.id,
            "Raised {} {} alert: {}",
            alert.severity.as_str(),
            alert.alert_type.as_str(),
            alert.title
        );
        metrics::record_alert(alert.alert_type.as_str(), alert.severity.as_str());
        self.announce(&alert);
        Ok(Some(alert))
    }

    fn announce(&self, alert: &Alert) {
        let payload = serde_json::to_value(alert).unwrap_or_default();
        self.broadcaster.publish(Topic::AlertNew, payload.clone());
        if alert.severity.is_urgent() {
            self.broadcaster.publish(Topic::AlertCritical, payload);
        }
    }

    /// Store an operator-created alert. It takes part in dedup for later
    /// engine evaluations but is never itself skipped.
    pub fn create_manual_alert(&self, alert: NewAlert) -> Result<Alert> {
        let alert = self
            .alert_store
            .insert_alert(&alert, chrono::Utc::now().timestamp())?;
        info!(alert_id = alert.id, "Manual alert created: {}", alert.title);
        metrics::record_alert(alert.alert_type.as_str(), alert.severity.as_str());
        self.announce(&alert);
        Ok(alert)
    }

    pub fn transition(
        &self,
        alert_id: i64,
        status: AlertStatus,
        assigned_to: Option<&str>,
    ) -> Result<Alert, AlertError> {
        let current = self
            .alert_store
            .get_alert(alert_id)?
            .ok_or(AlertError::NotFound(alert_id))?;
        if !current.status.can_transition_to(status) {
            return Err(AlertError::InvalidTransition {
                from: current.status,
                to: status,
            });
        }

        let updated = self
            .alert_store
            .update_status(alert_id, status, assigned_to, chrono::Utc::now().timestamp())?
            .ok_or(AlertError::NotFound(alert_id))?;
        info!(
            alert_id,
            "Alert moved from {} to {}",
            current.status.as_str(),
            updated.status.as_str()
        );
        self.broadcaster.publish(
            Topic::AlertUpdated,
            serde_json::to_value(&updated).unwrap_or_default(),
        );
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::SqliteAlertStore;
    use crate::feedback_store::{AnalysisResult, FeedbackItem, Metadata, SqliteFeedbackStore};
    use std::collections::BTreeMap;
    use std::time::Duration;

    const NOW: i64 = 1_700_000_000;

    #[derive(Default)]
    struct CapturingBroadcaster {
        events: Mutex<Vec<(Topic, serde_json::Value)>>,
    }

    impl CapturingBroadcaster {
        fn topics(&self) -> Vec<Topic> {
            self.events.lock().unwrap().iter().map(|(t, _)| *t).collect()
        }
    }

    impl EventBroadcaster for CapturingBroadcaster {
        fn publish(&self, topic: Topic, data: serde_json::Value) {
            self.events.lock().unwrap().push((topic, data));
        }
    }

    struct Fixture {
        feedback: Arc<SqliteFeedbackStore>,
        broadcaster: Arc<CapturingBroadcaster>,
        engine: AlertEngine,
        next_id: usize,
    }

    impl Fixture {
        fn new(settings: AlertSettings) -> Self {
            let feedback = Arc::new(SqliteFeedbackStore::in_memory().unwrap());
            let broadcaster = Arc::new(CapturingBroadcaster::default());
            let engine = AlertEngine::new(
                feedback.clone(),
                Arc::new(SqliteAlertStore::in_memory().unwrap()),
                broadcaster.clone(),
                settings,
            );
            Self {
                feedback,
                broadcaster,
                engine,
                next_id: 0,
            }
        }

        fn add(&mut self, channel: Channel, sentiment: Sentiment, created_at: i64, count: usize) {
            for _ in 0..count {
                self.next_id += 1;
                let id = format!("fb-{}", self.next_id);
                self.feedback
                    .insert_feedback(&FeedbackItem {
                        id: id.clone(),
                        channel,
                        comment: Some("text".to_string()),
                        metadata: Metadata::new(),
                        processed: true,
                        created_at,
                    })
                    .unwrap();
                self.feedback
                    .replace_analysis(&AnalysisResult {
                        feedback_id: id,
                        sentiment,
                        score: 0.0,
                        confidence: 0.9,
                        primary_emotion: None,
                        emotions: BTreeMap::new(),
                        key_phrases: Vec::new(),
                        word_count: 1,
                        created_at,
                    })
                    .unwrap();
            }
        }
    }

    fn kinds(alerts: &[Alert]) -> Vec<(AlertType, AlertSeverity)> {
        alerts.iter().map(|a| (a.alert_type, a.severity)).collect()
    }

    #[test]
    fn non_negative_sentiment_is_ignored() {
        let mut fx = Fixture::new(AlertSettings::default());
        fx.add(Channel::Email, Sentiment::Negative, NOW - 10, 30);
        let alerts = fx
            .engine
            .evaluate_at(Channel::Email, Sentiment::Neutral, NOW)
            .unwrap();
        assert!(alerts.is_empty());
        assert!(fx.broadcaster.topics().is_empty());
    }

    #[test]
    fn ratio_spike_is_critical_and_deduplicated() {
        let mut fx = Fixture::new(AlertSettings {
            negative_count_1h: 100,
            ..AlertSettings::default()
        });
        fx.add(Channel::InAppSurvey, Sentiment::Negative, NOW - 60, 10);
        fx.add(Channel::InAppSurvey, Sentiment::Positive, NOW - 60, 2);

        let first = fx
            .engine
            .evaluate_at(Channel::InAppSurvey, Sentiment::Negative, NOW)
            .unwrap();
        assert_eq!(
            kinds(&first),
            vec![(AlertType::SentimentSpike, AlertSeverity::Critical)]
        );
        assert_eq!(
            fx.broadcaster.topics(),
            vec![Topic::AlertNew, Topic::AlertCritical]
        );

        let second = fx
            .engine
            .evaluate_at(Channel::InAppSurvey, Sentiment::Negative, NOW + 1)
            .unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn ratio_requires_minimum_sample() {
        let mut fx = Fixture::new(AlertSettings::default());
        fx.add(Channel::Chatbot, Sentiment::VeryNegative, NOW - 60, 9);
        let alerts = fx
            .engine
            .evaluate_at(Channel::Chatbot, Sentiment::VeryNegative, NOW)
            .unwrap();
        assert!(alerts.is_empty());
    }

    #[test]
    fn count_thresholds_raise_independent_alert_types() {
        let mut fx = Fixture::new(AlertSettings {
            negative_ratio_1h: 1.1,
            ..AlertSettings::default()
        });
        fx.add(Channel::Email, Sentiment::Negative, NOW - 100, 20);

        let alerts = fx
            .engine
            .evaluate_at(Channel::Email, Sentiment::Negative, NOW)
            .unwrap();
        assert_eq!(
            kinds(&alerts),
            vec![
                (AlertType::HighVolumeNegative, AlertSeverity::High),
                (AlertType::SentimentSpike, AlertSeverity::High),
            ]
        );
    }

    #[test]
    fn daily_count_raises_medium_spike() {
        let mut fx = Fixture::new(AlertSettings::default());
        fx.add(Channel::Sms, Sentiment::Negative, NOW - 5 * HOUR_SECS, 50);
        fx.add(Channel::Sms, Sentiment::Positive, NOW - 60, 1);

        let alerts = fx
            .engine
            .evaluate_at(Channel::Sms, Sentiment::Negative, NOW)
            .unwrap();
        assert_eq!(
            kinds(&alerts),
            vec![(AlertType::SentimentSpike, AlertSeverity::Medium)]
        );
        assert_eq!(fx.broadcaster.topics(), vec![Topic::AlertNew]);
    }

    #[test]
    fn results_outside_the_window_are_not_counted() {
        let mut fx = Fixture::new(AlertSettings::default());
        fx.add(Channel::WebForm, Sentiment::Negative, NOW - HOUR_SECS, 15);
        let alerts = fx
            .engine
            .evaluate_at(Channel::WebForm, Sentiment::Negative, NOW)
            .unwrap();
        assert!(alerts.is_empty());
    }

    #[test]
    fn dedup_is_per_channel() {
        let mut fx = Fixture::new(AlertSettings::default());
        fx.add(Channel::Email, Sentiment::Negative, NOW - 60, 10);
        fx.add(Channel::Sms, Sentiment::Negative, NOW - 60, 10);

        let email = fx
            .engine
            .evaluate_at(Channel::Email, Sentiment::Negative, NOW)
            .unwrap();
        let sms = fx
            .engine
            .evaluate_at(Channel::Sms, Sentiment::Negative, NOW)
            .unwrap();
        assert_eq!(email.len(), 1);
        assert_eq!(sms.len(), 1);
        assert_eq!(sms[0].channel, Some(Channel::Sms));
    }

    #[test]
    fn dedup_expires_after_window() {
        let mut fx = Fixture::new(AlertSettings {
            dedup_window: Duration::from_secs(600),
            high_volume_negative_1h: 100,
            ..AlertSettings::default()
        });
        fx.add(Channel::Email, Sentiment::Negative, NOW - 60, 10);
        assert_eq!(
            fx.engine
                .evaluate_at(Channel::Email, Sentiment::Negative, NOW)
                .unwrap()
                .len(),
            1
        );

        let later = NOW + 601;
        fx.add(Channel::Email, Sentiment::Negative, later - 60, 10);
        assert_eq!(
            fx.engine
                .evaluate_at(Channel::Email, Sentiment::Negative, later)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn manual_alert_blocks_engine_alert_for_same_channel() {
        let mut fx = Fixture::new(AlertSettings::default());
        fx.engine
            .create_manual_alert(NewAlert {
                alert_type: AlertType::SentimentSpike,
                severity: AlertSeverity::Low,
                title: "Investigating EMAIL complaints".to_string(),
                message: "Manual".to_string(),
                channel: Some(Channel::Email),
                assigned_to: Some("analyst".to_string()),
                threshold: json!({}),
                data: json!({}),
            })
            .unwrap();
        fx.add(Channel::Email, Sentiment::Negative, chrono::Utc::now().timestamp() - 5, 12);

        let alerts = fx
            .engine
            .evaluate(Channel::Email, Sentiment::Negative)
            .unwrap();
        assert!(alerts.is_empty());
    }

    #[test]
    fn resolved_alert_no_longer_blocks() {
        let mut fx = Fixture::new(AlertSettings::default());
        fx.add(Channel::Email, Sentiment::Negative, NOW - 60, 10);
        let first = fx
            .engine
            .evaluate_at(Channel::Email, Sentiment::Negative, NOW)
            .unwrap();
        fx.engine
            .transition(first[0].id, AlertStatus::Resolved, None)
            .unwrap();

        let again = fx
            .engine
            .evaluate_at(Channel::Email, Sentiment::Negative, NOW + 5)
            .unwrap();
        assert_eq!(again.len(), 1);
    }

    #[test]
    fn transition_validates_and_publishes_update() {
        let fx = Fixture::new(AlertSettings::default());
        let alert = fx
            .engine
            .create_manual_alert(NewAlert {
                alert_type: AlertType::ChurnRisk,
                severity: AlertSeverity::Medium,
                title: "Churn risk".to_string(),
                message: "Enterprise account unhappy".to_string(),
                channel: None,
                assigned_to: None,
                threshold: json!({}),
                data: json!({}),
            })
            .unwrap();

        let in_progress = fx
            .engine
            .transition(alert.id, AlertStatus::InProgress, Some("csm"))
            .unwrap();
        assert_eq!(in_progress.assigned_to.as_deref(), Some("csm"));
        assert_eq!(
            fx.broadcaster.topics().last(),
            Some(&Topic::AlertUpdated)
        );

        let err = fx
            .engine
            .transition(alert.id, AlertStatus::Open, None)
            .unwrap_err();
        assert!(matches!(err, AlertError::InvalidTransition { .. }));
        assert!(matches!(
            fx.engine.transition(404, AlertStatus::Resolved, None),
            Err(AlertError::NotFound(404))
        ));
    }
}
