//! Alert storage.

use super::models::*;
use super::schema::ALERTS_VERSIONED_SCHEMAS;
use crate::feedback_store::Channel;
use crate::sqlite_persistence::{open_in_memory, open_versioned};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Timestamps are unix seconds supplied by the caller.
pub trait AlertStore: Send + Sync {
    fn insert_alert(&self, alert: &NewAlert, now: i64) -> Result<Alert>;

    fn get_alert(&self, id: i64) -> Result<Option<Alert>>;

    /// Most recent `OPEN` or `IN_PROGRESS` alert of `alert_type` for `channel`
    /// created at or after `since`.
    fn find_recent_active(
        &self,
        alert_type: AlertType,
        channel: Option<Channel>,
        since: i64,
    ) -> Result<Option<Alert>>;

    /// Set status (and assignee, when given). Stamps `resolved_at` for terminal states.
    fn update_status(
        &self,
        id: i64,
        status: AlertStatus,
        assigned_to: Option<&str>,
        now: i64,
    ) -> Result<Option<Alert>>;

    /// Newest first.
    fn list_alerts(&self, status: Option<AlertStatus>, limit: usize) -> Result<Vec<Alert>>;
}

pub struct SqliteAlertStore {
    conn: Arc<Mutex<Connection>>,
}

const ALERT_COLUMNS: &str = "id, alert_type, severity, title, message, status, assigned_to, \
     channel, threshold, data, created_at, updated_at, resolved_at";

impl SqliteAlertStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned(db_path, ALERTS_VERSIONED_SCHEMAS, "alerts")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            conn: Arc::new(Mutex::new(open_in_memory(ALERTS_VERSIONED_SCHEMAS)?)),
        })
    }

    fn row_to_alert(row: &rusqlite::Row) -> rusqlite::Result<Alert> {
        let alert_type: String = row.get("alert_type")?;
        let severity: String = row.get("severity")?;
        let status: String = row.get("status")?;
        let channel: Option<String> = row.get("channel")?;
        let threshold: String = row.get("threshold")?;
        let data: String = row.get("data")?;
        Ok(Alert {
            id: row.get("id")?,
            alert_type: AlertType::from_db_str(&alert_type)
                .ok_or_else(|| conversion_error(1, &alert_type))?,
            severity: AlertSeverity::from_db_str(&severity)
                .ok_or_else(|| conversion_error(2, &severity))?,
            title: row.get("title")?,
            message: row.get("message")?,
            status: AlertStatus::from_db_str(&status).ok_or_else(|| conversion_error(5, &status))?,
            assigned_to: row.get("assigned_to")?,
            channel: channel
                .map(|c| Channel::from_db_str(&c).ok_or_else(|| conversion_error(7, &c)))
                .transpose()?,
            threshold: serde_json::from_str(&threshold).map_err(|e| json_error(8, e))?,
            data: serde_json::from_str(&data).map_err(|e| json_error(9, e))?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            resolved_at: row.get("resolved_at")?,
        })
    }

    fn get_alert_with(conn: &Connection, id: i64) -> Result<Option<Alert>> {
        conn.query_row(
            &format!("SELECT {} FROM alerts WHERE id = ?1", ALERT_COLUMNS),
            params![id],
            Self::row_to_alert,
        )
        .optional()
        .context("Failed to load alert")
    }
}

fn conversion_error(index: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        format!("unexpected value '{}'", value).into(),
    )
}

fn json_error(index: usize, e: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
}

impl AlertStore for SqliteAlertStore {
    fn insert_alert(&self, alert: &NewAlert, now: i64) -> Result<Alert> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO alerts (alert_type, severity, title, message, status, assigned_to, channel,
                threshold, data, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'OPEN', ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                alert.alert_type.as_str(),
                alert.severity.as_str(),
                alert.title,
                alert.message,
                alert.assigned_to,
                alert.channel.map(|c| c.as_str()),
                serde_json::to_string(&alert.threshold)?,
                serde_json::to_string(&alert.data)?,
                now,
            ],
        )
        .context("Failed to insert alert")?;
        let id = conn.last_insert_rowid();
        Self::get_alert_with(&conn, id)?.context("Inserted alert disappeared")
    }

    fn get_alert(&self, id: i64) -> Result<Option<Alert>> {
        let conn = self.conn.lock().unwrap();
        Self::get_alert_with(&conn, id)
    }

    fn find_recent_active(
        &self,
        alert_type: AlertType,
        channel: Option<Channel>,
        since: i64,
    ) -> Result<Option<Alert>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!(
                "SELECT {} FROM alerts
                 WHERE alert_type = ?1 AND channel IS ?2
                   AND status IN ('OPEN', 'IN_PROGRESS') AND created_at >= ?3
                 ORDER BY created_at DESC, id DESC LIMIT 1",
                ALERT_COLUMNS
            ),
            params![alert_type.as_str(), channel.map(|c| c.as_str()), since],
            Self::row_to_alert,
        )
        .optional()
        .context("Failed to query recent alerts")
    }

    fn update_status(
        &self,
        id: i64,
        status: AlertStatus,
        assigned_to: Option<&str>,
        now: i64,
    ) -> Result<Option<Alert>> {
        let conn = self.conn.lock().unwrap();
        let resolved_at = status.is_terminal().then_some(now);
        let updated = conn.execute(
            "UPDATE alerts
             SET status = ?2, assigned_to = COALESCE(?3, assigned_to), updated_at = ?4,
                 resolved_at = COALESCE(?5, resolved_at)
             WHERE id = ?1",
            params![id, status.as_str(), assigned_to, now, resolved_at],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        Self::get_alert_with(&conn, id)
    }

    fn list_alerts(&self, status: Option<AlertStatus>, limit: usize) -> Result<Vec<Alert>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM alerts WHERE (?1 IS NULL OR status = ?1)
             ORDER BY created_at DESC, id DESC LIMIT ?2",
            ALERT_COLUMNS
        ))?;
        let alerts = stmt
            .query_map(
                params![status.map(|s| s.as_str()), limit as i64],
                Self::row_to_alert,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(alerts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spike(channel: Option<Channel>) -> NewAlert {
        NewAlert {
            alert_type: AlertType::SentimentSpike,
            severity: AlertSeverity::Critical,
            title: "Negative sentiment spike on EMAIL".to_string(),
            message: "80% negative".to_string(),
            channel,
            assigned_to: None,
            threshold: json!({"ratio": 0.7}),
            data: json!({"negative": 8, "total": 10}),
        }
    }

    #[test]
    fn inserted_alert_is_open() {
        let store = SqliteAlertStore::in_memory().unwrap();
        let alert = store.insert_alert(&spike(Some(Channel::Email)), 1_000).unwrap();
        assert_eq!(alert.status, AlertStatus::Open);
        assert_eq!(alert.channel, Some(Channel::Email));
        assert_eq!(alert.threshold, json!({"ratio": 0.7}));
        assert_eq!(alert.created_at, 1_000);
        assert_eq!(store.get_alert(alert.id).unwrap(), Some(alert));
    }

    #[test]
    fn find_recent_active_matches_type_channel_and_window() {
        let store = SqliteAlertStore::in_memory().unwrap();
        let alert = store.insert_alert(&spike(Some(Channel::Email)), 1_000).unwrap();

        let found = store
            .find_recent_active(AlertType::SentimentSpike, Some(Channel::Email), 500)
            .unwrap();
        assert_eq!(found.map(|a| a.id), Some(alert.id));

        assert!(store
            .find_recent_active(AlertType::SentimentSpike, Some(Channel::Sms), 500)
            .unwrap()
            .is_none());
        assert!(store
            .find_recent_active(AlertType::HighVolumeNegative, Some(Channel::Email), 500)
            .unwrap()
            .is_none());
        assert!(store
            .find_recent_active(AlertType::SentimentSpike, Some(Channel::Email), 1_001)
            .unwrap()
            .is_none());
    }

    #[test]
    fn resolved_alerts_are_not_active() {
        let store = SqliteAlertStore::in_memory().unwrap();
        let alert = store.insert_alert(&spike(Some(Channel::Email)), 1_000).unwrap();
        let resolved = store
            .update_status(alert.id, AlertStatus::Resolved, Some("ops@example.com"), 1_100)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.resolved_at, Some(1_100));
        assert_eq!(resolved.assigned_to.as_deref(), Some("ops@example.com"));

        assert!(store
            .find_recent_active(AlertType::SentimentSpike, Some(Channel::Email), 0)
            .unwrap()
            .is_none());
    }

    #[test]
    fn channel_less_alerts_dedup_among_themselves() {
        let store = SqliteAlertStore::in_memory().unwrap();
        store.insert_alert(&spike(None), 1_000).unwrap();
        assert!(store
            .find_recent_active(AlertType::SentimentSpike, None, 0)
            .unwrap()
            .is_some());
        assert!(store
            .find_recent_active(AlertType::SentimentSpike, Some(Channel::Email), 0)
            .unwrap()
            .is_none());
    }

    #[test]
    fn list_alerts_filters_by_status() {
        let store = SqliteAlertStore::in_memory().unwrap();
        let first = store.insert_alert(&spike(Some(Channel::Email)), 1).unwrap();
        store.insert_alert(&spike(Some(Channel::Sms)), 2).unwrap();
        store
            .update_status(first.id, AlertStatus::Dismissed, None, 3)
            .unwrap();

        assert_eq!(store.list_alerts(None, 10).unwrap().len(), 2);
        let open = store.list_alerts(Some(AlertStatus::Open), 10).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].channel, Some(Channel::Sms));
    }

    #[test]
    fn update_missing_alert_returns_none() {
        let store = SqliteAlertStore::in_memory().unwrap();
        assert!(store
            .update_status(99, AlertStatus::Resolved, None, 1)
            .unwrap()
            .is_none());
    }
}
