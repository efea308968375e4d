//! Feedback and analysis data types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const TRANSCRIPTION_PLACEHOLDER: &str = "[Transcription pending]";

/// Metadata keys written by the transcription path.
pub mod metadata_keys {
    pub const TRANSCRIPTION_STATUS: &str = "transcriptionStatus";
    pub const TRANSCRIPTION_ERROR: &str = "transcriptionError";
    pub const TRANSCRIPTION_CONFIDENCE: &str = "transcriptionConfidence";
    pub const TRANSCRIPT_ID: &str = "transcriptId";
    pub const AUDIO_URL: &str = "audioUrl";
}

pub type Metadata = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    InAppSurvey,
    Chatbot,
    VoiceCall,
    SocialMedia,
    Email,
    WebForm,
    Sms,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::InAppSurvey => "IN_APP_SURVEY",
            Channel::Chatbot => "CHATBOT",
            Channel::VoiceCall => "VOICE_CALL",
            Channel::SocialMedia => "SOCIAL_MEDIA",
            Channel::Email => "EMAIL",
            Channel::WebForm => "WEB_FORM",
            Channel::Sms => "SMS",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "IN_APP_SURVEY" => Some(Channel::InAppSurvey),
            "CHATBOT" => Some(Channel::Chatbot),
            "VOICE_CALL" => Some(Channel::VoiceCall),
            "SOCIAL_MEDIA" => Some(Channel::SocialMedia),
            "EMAIL" => Some(Channel::Email),
            "WEB_FORM" => Some(Channel::WebForm),
            "SMS" => Some(Channel::Sms),
            _ => None,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Five-way sentiment, ordered from most negative to most positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sentiment {
    VeryNegative,
    Negative,
    Neutral,
    Positive,
    VeryPositive,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::VeryNegative => "VERY_NEGATIVE",
            Sentiment::Negative => "NEGATIVE",
            Sentiment::Neutral => "NEUTRAL",
            Sentiment::Positive => "POSITIVE",
            Sentiment::VeryPositive => "VERY_POSITIVE",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "VERY_NEGATIVE" => Some(Sentiment::VeryNegative),
            "NEGATIVE" => Some(Sentiment::Negative),
            "NEUTRAL" => Some(Sentiment::Neutral),
            "POSITIVE" => Some(Sentiment::Positive),
            "VERY_POSITIVE" => Some(Sentiment::VeryPositive),
            _ => None,
        }
    }

    /// Negative or very negative.
    pub fn is_negative(&self) -> bool {
        *self <= Sentiment::Negative
    }
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Emotion {
    Joy,
    Anger,
    Sadness,
    Fear,
    Surprise,
    Disgust,
    Trust,
    Anticipation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CustomerSegment {
    Vip,
    Standard,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackItem {
    pub id: String,
    pub channel: Channel,
    pub comment: Option<String>,
    pub metadata: Metadata,
    pub processed: bool,
    pub created_at: i64,
}

/// Input for a new text feedback item.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFeedback {
    pub channel: Channel,
    pub comment: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub customer_segment: Option<CustomerSegment>,
}

/// One stored sentiment/emotion enrichment. At most one per feedback item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub feedback_id: String,
    pub sentiment: Sentiment,
    pub score: f64,
    pub confidence: f64,
    pub primary_emotion: Option<Emotion>,
    pub emotions: BTreeMap<Emotion, f64>,
    pub key_phrases: Vec<String>,
    pub word_count: usize,
    pub created_at: i64,
}

/// Result counts for a channel over one trailing window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowCounts {
    pub negative: u64,
    pub total: u64,
}

impl WindowCounts {
    pub fn negative_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.negative as f64 / self.total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentiment_ordering_runs_negative_to_positive() {
        assert!(Sentiment::VeryNegative < Sentiment::Negative);
        assert!(Sentiment::Neutral < Sentiment::VeryPositive);
        assert!(Sentiment::VeryNegative.is_negative());
        assert!(Sentiment::Negative.is_negative());
        assert!(!Sentiment::Neutral.is_negative());
    }

    #[test]
    fn emotion_map_serializes_with_label_keys() {
        let mut emotions = BTreeMap::new();
        emotions.insert(Emotion::Anger, 0.9);
        emotions.insert(Emotion::Trust, 0.1);
        assert_eq!(
            serde_json::to_string(&emotions).unwrap(),
            r#"{"ANGER":0.9,"TRUST":0.1}"#
        );
    }

    #[test]
    fn channel_round_trips_through_db_strings() {
        for channel in [Channel::InAppSurvey, Channel::VoiceCall, Channel::Sms] {
            assert_eq!(Channel::from_db_str(channel.as_str()), Some(channel));
        }
        assert_eq!(Channel::from_db_str("FAX"), None);
    }

    #[test]
    fn negative_ratio_handles_empty_window() {
        assert_eq!(WindowCounts::default().negative_ratio(), 0.0);
        let counts = WindowCounts {
            negative: 10,
            total: 12,
        };
        assert!((counts.negative_ratio() - 0.8333).abs() < 0.001);
    }
}
