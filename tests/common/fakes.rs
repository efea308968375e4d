//! Scripted providers and a recording event broadcaster.

use super::constants::*;
use async_trait::async_trait;
use feedback_pulse::classifier::{ClassifierBackend, ClassifierError, LabelScore};
use feedback_pulse::events::{EventBroadcaster, Topic};
use feedback_pulse::transcription::{
    SpeechToText, Transcript, TranscriptStatus, TranscriptionError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Answers NEGATIVE for texts containing a negative marker, POSITIVE otherwise.
#[derive(Default)]
pub struct ScriptedClassifier {
    pub calls: AtomicUsize,
}

impl ScriptedClassifier {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClassifierBackend for ScriptedClassifier {
    async fn classify(&self, model: &str, text: &str) -> Result<Vec<LabelScore>, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let lowered = text.to_lowercase();
        let negative = NEGATIVE_MARKERS.iter().any(|m| lowered.contains(m));

        let labels = match (model, negative) {
            (EMOTION_MODEL, true) => vec![
                LabelScore::new("anger", 0.72),
                LabelScore::new("sadness", 0.2),
            ],
            (EMOTION_MODEL, false) => vec![LabelScore::new("joy", 0.81)],
            (_, true) => vec![
                LabelScore::new("NEGATIVE", 0.96),
                LabelScore::new("POSITIVE", 0.04),
            ],
            (_, false) => vec![
                LabelScore::new("POSITIVE", 0.93),
                LabelScore::new("NEGATIVE", 0.07),
            ],
        };
        Ok(labels)
    }
}

#[derive(Debug, Clone)]
pub enum TranscriptScript {
    /// Report `processing` for the first `after` polls, then complete with `text`.
    Complete { after: usize, text: String },
    /// Provider-side failure on the first poll.
    Fail(String),
    /// Completes with blank text.
    Empty,
}

pub struct ScriptedSpeechToText {
    script: TranscriptScript,
    submits: AtomicUsize,
    polls: AtomicUsize,
    polled_ids: Mutex<Vec<String>>,
}

impl ScriptedSpeechToText {
    pub fn new(script: TranscriptScript) -> Self {
        Self {
            script,
            submits: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            polled_ids: Mutex::new(Vec::new()),
        }
    }

    pub fn completing(after: usize, text: &str) -> Self {
        Self::new(TranscriptScript::Complete {
            after,
            text: text.to_string(),
        })
    }

    pub fn submits(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn polled_ids(&self) -> Vec<String> {
        self.polled_ids.lock().unwrap().clone()
    }
}

fn transcript(id: &str, status: TranscriptStatus) -> Transcript {
    Transcript {
        id: id.to_string(),
        status,
        text: None,
        confidence: None,
        words: Vec::new(),
        error: None,
    }
}

#[async_trait]
impl SpeechToText for ScriptedSpeechToText {
    async fn submit_transcription(&self, _audio_url: &str) -> Result<String, TranscriptionError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        Ok(TRANSCRIPT_ID.to_string())
    }

    async fn get_transcript(&self, transcript_id: &str) -> Result<Transcript, TranscriptionError> {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        self.polled_ids
            .lock()
            .unwrap()
            .push(transcript_id.to_string());

        let result = match &self.script {
            TranscriptScript::Complete { after, .. } if poll <= *after => {
                transcript(transcript_id, TranscriptStatus::Processing)
            }
            TranscriptScript::Complete { text, .. } => Transcript {
                text: Some(text.clone()),
                confidence: Some(0.88),
                ..transcript(transcript_id, TranscriptStatus::Completed)
            },
            TranscriptScript::Fail(message) => Transcript {
                error: Some(message.clone()),
                ..transcript(transcript_id, TranscriptStatus::Error)
            },
            TranscriptScript::Empty => Transcript {
                text: Some("  ".to_string()),
                ..transcript(transcript_id, TranscriptStatus::Completed)
            },
        };
        Ok(result)
    }
}

#[derive(Default)]
pub struct RecordingBroadcaster {
    events: Mutex<Vec<(Topic, serde_json::Value)>>,
}

impl RecordingBroadcaster {
    pub fn events(&self, topic: Topic) -> Vec<serde_json::Value> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| *t == topic)
            .map(|(_, data)| data.clone())
            .collect()
    }

    pub fn count(&self, topic: Topic) -> usize {
        self.events(topic).len()
    }
}

impl EventBroadcaster for RecordingBroadcaster {
    fn publish(&self, topic: Topic, data: serde_json::Value) {
        self.events.lock().unwrap().push((topic, data));
    }
}
