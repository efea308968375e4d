//! Speech-to-text provider seam.

mod assemblyai;
mod provider;

pub use assemblyai::AssemblyAiClient;
pub use provider::{SpeechToText, Transcript, TranscriptStatus, TranscriptionError};

#[cfg(test)]
pub use provider::MockSpeechToText;
