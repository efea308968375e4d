//! Shared constants for end-to-end tests

pub const SENTIMENT_MODEL: &str = "test/sentiment-model";
pub const EMOTION_MODEL: &str = "test/emotion-model";

pub const NEGATIVE_TEXT: &str = "The app is broken again and support was rude";
pub const POSITIVE_TEXT: &str = "Lovely experience, the new checkout is quick";

pub const AUDIO_URL: &str = "https://cdn.example.com/calls/0001.wav";
pub const TRANSCRIPT_ID: &str = "transcript-0001";
pub const TRANSCRIPT_TEXT: &str = "The agent was rude and my order is still broken";

/// Words that make the scripted classifier answer NEGATIVE.
pub const NEGATIVE_MARKERS: &[&str] = &["broken", "rude", "terrible"];
