//! SQLite-backed feedback store.

use super::models::*;
use super::schema::FEEDBACK_VERSIONED_SCHEMAS;
use super::trait_def::FeedbackStore;
use crate::sqlite_persistence::{open_in_memory, open_versioned};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub struct SqliteFeedbackStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteFeedbackStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned(db_path, FEEDBACK_VERSIONED_SCHEMAS, "feedback")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = open_in_memory(FEEDBACK_VERSIONED_SCHEMAS)?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_feedback(row: &rusqlite::Row) -> rusqlite::Result<FeedbackItem> {
        let channel: String = row.get("channel")?;
        let metadata: String = row.get("metadata")?;
        Ok(FeedbackItem {
            id: row.get("id")?,
            channel: Channel::from_db_str(&channel).ok_or_else(|| conversion_error(1, &channel))?,
            comment: row.get("comment")?,
            metadata: serde_json::from_str(&metadata).map_err(|e| json_error(3, e))?,
            processed: row.get::<_, i64>("processed")? != 0,
            created_at: row.get("created_at")?,
        })
    }

    fn row_to_analysis(row: &rusqlite::Row) -> rusqlite::Result<AnalysisResult> {
        let sentiment: String = row.get("sentiment")?;
        let primary_emotion: Option<String> = row.get("primary_emotion")?;
        let emotions: String = row.get("emotions")?;
        let key_phrases: String = row.get("key_phrases")?;
        Ok(AnalysisResult {
            feedback_id: row.get("feedback_id")?,
            sentiment: Sentiment::from_db_str(&sentiment)
                .ok_or_else(|| conversion_error(2, &sentiment))?,
            score: row.get("score")?,
            confidence: row.get("confidence")?,
            primary_emotion: primary_emotion
                .map(|e| serde_json::from_value(serde_json::Value::String(e)))
                .transpose()
                .map_err(|e| json_error(5, e))?,
            emotions: serde_json::from_str(&emotions).map_err(|e| json_error(6, e))?,
            key_phrases: serde_json::from_str(&key_phrases).map_err(|e| json_error(7, e))?,
            word_count: row.get::<_, i64>("word_count")? as usize,
            created_at: row.get("created_at")?,
        })
    }

    fn load_metadata(conn: &Connection, id: &str) -> Result<Option<Metadata>> {
        let raw: Option<String> = conn
            .query_row(
                "SELECT metadata FROM feedback WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|raw| serde_json::from_str(&raw).context("Corrupt feedback metadata"))
            .transpose()
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

fn emotion_label(emotion: Emotion) -> Result<String> {
    match serde_json::to_value(emotion)? {
        serde_json::Value::String(label) => Ok(label),
        other => anyhow::bail!("Unexpected emotion encoding: {}", other),
    }
}

impl FeedbackStore for SqliteFeedbackStore {
    fn insert_feedback(&self, item: &FeedbackItem) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO feedback (id, channel, comment, metadata, processed, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                item.id,
                item.channel.as_str(),
                item.comment,
                serde_json::to_string(&item.metadata)?,
                item.processed,
                item.created_at,
            ],
        )
        .with_context(|| format!("Failed to insert feedback {}", item.id))?;
        Ok(())
    }

    fn get_feedback(&self, id: &str) -> Result<Option<FeedbackItem>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, channel, comment, metadata, processed, created_at FROM feedback WHERE id = ?1",
            params![id],
            Self::row_to_feedback,
        )
        .optional()
        .context("Failed to load feedback")
    }

    fn set_processed(&self, id: &str, processed: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE feedback SET processed = ?2 WHERE id = ?1",
            params![id, processed],
        )?;
        Ok(())
    }

    fn update_comment(&self, id: &str, comment: &str, metadata_patch: &Metadata) -> Result<bool> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let Some(mut metadata) = Self::load_metadata(&tx, id)? else {
            return Ok(false);
        };
        metadata.extend(metadata_patch.clone());
        tx.execute(
            "UPDATE feedback SET comment = ?2, metadata = ?3 WHERE id = ?1",
            params![id, comment, serde_json::to_string(&metadata)?],
        )?;
        tx.commit()?;
        Ok(true)
    }

    fn merge_metadata(&self, id: &str, patch: &Metadata) -> Result<bool> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let Some(mut metadata) = Self::load_metadata(&tx, id)? else {
            return Ok(false);
        };
        metadata.extend(patch.clone());
        tx.execute(
            "UPDATE feedback SET metadata = ?2 WHERE id = ?1",
            params![id, serde_json::to_string(&metadata)?],
        )?;
        tx.commit()?;
        Ok(true)
    }

    fn replace_analysis(&self, result: &AnalysisResult) -> Result<()> {
        let primary_emotion = result.primary_emotion.map(emotion_label).transpose()?;
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM analysis_results WHERE feedback_id = ?1",
            params![result.feedback_id],
        )?;
        tx.execute(
            "INSERT INTO analysis_results (feedback_id, sentiment, score, confidence, primary_emotion,
                emotions, key_phrases, word_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                result.feedback_id,
                result.sentiment.as_str(),
                result.score,
                result.confidence,
                primary_emotion,
                serde_json::to_string(&result.emotions)?,
                serde_json::to_string(&result.key_phrases)?,
                result.word_count as i64,
                result.created_at,
            ],
        )
        .with_context(|| format!("Failed to store analysis for {}", result.feedback_id))?;
        tx.commit()?;
        Ok(())
    }

    fn get_analysis(&self, feedback_id: &str) -> Result<Option<AnalysisResult>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT feedback_id, sentiment, score, confidence, primary_emotion, emotions,
                key_phrases, word_count, created_at
             FROM analysis_results WHERE feedback_id = ?1",
            params![feedback_id],
            Self::row_to_analysis,
        )
        .optional()
        .context("Failed to load analysis")
    }

    fn delete_analysis(&self, feedback_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM analysis_results WHERE feedback_id = ?1",
            params![feedback_id],
        )?;
        Ok(deleted > 0)
    }

    fn sentiment_window(&self, channel: Channel, since: i64, until: i64) -> Result<WindowCounts> {
        let conn = self.conn.lock().unwrap();
        let (total, negative) = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN a.sentiment IN ('NEGATIVE', 'VERY_NEGATIVE') THEN 1 ELSE 0 END), 0)
             FROM analysis_results a
             JOIN feedback f ON f.id = a.feedback_id
             WHERE f.channel = ?1 AND a.created_at > ?2 AND a.created_at <= ?3",
            params![channel.as_str(), since, until],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?;
        Ok(WindowCounts {
            negative: negative as u64,
            total: total as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn item(id: &str, channel: Channel) -> FeedbackItem {
        FeedbackItem {
            id: id.to_string(),
            channel,
            comment: Some("The statement page is slow".to_string()),
            metadata: Metadata::new(),
            processed: false,
            created_at: 1_000,
        }
    }

    fn analysis(feedback_id: &str, sentiment: Sentiment, created_at: i64) -> AnalysisResult {
        let mut emotions = BTreeMap::new();
        emotions.insert(Emotion::Anger, 0.7);
        AnalysisResult {
            feedback_id: feedback_id.to_string(),
            sentiment,
            score: -0.6,
            confidence: 0.8,
            primary_emotion: Some(Emotion::Anger),
            emotions,
            key_phrases: vec!["statement".to_string(), "slow".to_string()],
            word_count: 5,
            created_at,
        }
    }

    fn analysis_rows(store: &SqliteFeedbackStore, feedback_id: &str) -> i64 {
        let conn = store.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM analysis_results WHERE feedback_id = ?1",
            params![feedback_id],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn stores_and_loads_feedback() {
        let store = SqliteFeedbackStore::in_memory().unwrap();
        let mut fb = item("fb-1", Channel::Email);
        fb.metadata.insert("source".to_string(), json!("import"));
        store.insert_feedback(&fb).unwrap();

        assert_eq!(store.get_feedback("fb-1").unwrap(), Some(fb));
        assert_eq!(store.get_feedback("missing").unwrap(), None);
    }

    #[test]
    fn replace_analysis_keeps_a_single_result() {
        let store = SqliteFeedbackStore::in_memory().unwrap();
        store.insert_feedback(&item("fb-1", Channel::Chatbot)).unwrap();

        store
            .replace_analysis(&analysis("fb-1", Sentiment::Negative, 10))
            .unwrap();
        let mut rerun = analysis("fb-1", Sentiment::Positive, 20);
        rerun.primary_emotion = None;
        rerun.emotions.clear();
        store.replace_analysis(&rerun).unwrap();

        assert_eq!(analysis_rows(&store, "fb-1"), 1);
        assert_eq!(store.get_analysis("fb-1").unwrap(), Some(rerun));
    }

    #[test]
    fn unique_constraint_rejects_raw_duplicate_insert() {
        let store = SqliteFeedbackStore::in_memory().unwrap();
        store.insert_feedback(&item("fb-1", Channel::Chatbot)).unwrap();
        store
            .replace_analysis(&analysis("fb-1", Sentiment::Neutral, 10))
            .unwrap();

        let conn = store.conn.lock().unwrap();
        let duplicate = conn.execute(
            "INSERT INTO analysis_results (feedback_id, sentiment, score, confidence, emotions,
                key_phrases, word_count, created_at)
             VALUES ('fb-1', 'NEUTRAL', 0, 0, '{}', '[]', 0, 11)",
            [],
        );
        assert!(duplicate.is_err());
    }

    #[test]
    fn delete_analysis_reports_whether_a_row_existed() {
        let store = SqliteFeedbackStore::in_memory().unwrap();
        store.insert_feedback(&item("fb-1", Channel::Sms)).unwrap();
        store
            .replace_analysis(&analysis("fb-1", Sentiment::Negative, 10))
            .unwrap();

        assert!(store.delete_analysis("fb-1").unwrap());
        assert!(!store.delete_analysis("fb-1").unwrap());
        assert_eq!(store.get_analysis("fb-1").unwrap(), None);
    }

    #[test]
    fn update_comment_merges_metadata() {
        let store = SqliteFeedbackStore::in_memory().unwrap();
        let mut fb = item("voice-1", Channel::VoiceCall);
        fb.comment = Some(TRANSCRIPTION_PLACEHOLDER.to_string());
        fb.metadata
            .insert(metadata_keys::AUDIO_URL.to_string(), json!("s3://a.wav"));
        fb.metadata.insert(
            metadata_keys::TRANSCRIPTION_STATUS.to_string(),
            json!("pending"),
        );
        store.insert_feedback(&fb).unwrap();

        let mut patch = Metadata::new();
        patch.insert(
            metadata_keys::TRANSCRIPTION_STATUS.to_string(),
            json!("completed"),
        );
        assert!(store
            .update_comment("voice-1", "I was charged twice", &patch)
            .unwrap());
        assert!(!store.update_comment("nope", "x", &patch).unwrap());

        let stored = store.get_feedback("voice-1").unwrap().unwrap();
        assert_eq!(stored.comment.as_deref(), Some("I was charged twice"));
        assert_eq!(stored.metadata["transcriptionStatus"], "completed");
        assert_eq!(stored.metadata["audioUrl"], "s3://a.wav");
    }

    #[test]
    fn sentiment_window_counts_per_channel_and_time() {
        let store = SqliteFeedbackStore::in_memory().unwrap();
        let rows = [
            ("a", Channel::InAppSurvey, Sentiment::VeryNegative, 100),
            ("b", Channel::InAppSurvey, Sentiment::Negative, 150),
            ("c", Channel::InAppSurvey, Sentiment::Positive, 160),
            ("d", Channel::InAppSurvey, Sentiment::Negative, 50),
            ("e", Channel::Email, Sentiment::Negative, 150),
        ];
        for (id, channel, sentiment, at) in rows {
            store.insert_feedback(&item(id, channel)).unwrap();
            store.replace_analysis(&analysis(id, sentiment, at)).unwrap();
        }

        let counts = store
            .sentiment_window(Channel::InAppSurvey, 50, 160)
            .unwrap();
        assert_eq!(
            counts,
            WindowCounts {
                negative: 2,
                total: 3
            }
        );
        assert_eq!(
            store.sentiment_window(Channel::Sms, 0, 1_000).unwrap(),
            WindowCounts::default()
        );
    }

    #[test]
    fn deleting_feedback_cascades_to_analysis() {
        let store = SqliteFeedbackStore::in_memory().unwrap();
        store.insert_feedback(&item("fb-1", Channel::WebForm)).unwrap();
        store
            .replace_analysis(&analysis("fb-1", Sentiment::Negative, 10))
            .unwrap();
        store
            .conn
            .lock()
            .unwrap()
            .execute("DELETE FROM feedback WHERE id = 'fb-1'", [])
            .unwrap();
        assert_eq!(analysis_rows(&store, "fb-1"), 0);
    }
}
