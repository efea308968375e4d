//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{ScriptedSpeechToText, TestPipeline, NEGATIVE_TEXT};
//!
//! #[tokio::test]
//! async fn test_text_is_analyzed() {
//!     let pipeline = TestPipeline::spawn(ScriptedSpeechToText::completing(0, "hi"), |_| {});
//!     // submit through pipeline.intake, then pipeline.wait_for_completed(...)
//! }
//! ```

#![allow(dead_code)]

mod constants;
mod fakes;
mod pipeline;
mod stub_server;

// Public API - this is what tests import
pub use constants::*;
pub use fakes::{RecordingBroadcaster, ScriptedClassifier, ScriptedSpeechToText, TranscriptScript};
pub use pipeline::TestPipeline;
pub use stub_server::{RecordedRequest, StubServer};
