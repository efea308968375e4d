//! Feedback Pulse
//!
//! Enriches customer feedback with sentiment, emotion and key phrases,
//! transcribes voice feedback, and raises alerts when negative sentiment
//! spikes on a channel. The library exposes the pipeline for the binary and
//! for the integration tests.

pub mod alerts;
pub mod classifier;
pub mod config;
pub mod events;
pub mod feedback_store;
pub mod intake;
pub mod job_queue;
pub mod server;
pub mod sqlite_persistence;
pub mod transcription;
pub mod workers;

// Re-export commonly used types for convenience
pub use alerts::{AlertEngine, SqliteAlertStore};
pub use classifier::ClassifierClient;
pub use events::{EventBroadcaster, EventBus};
pub use feedback_store::{FeedbackStore, SqliteFeedbackStore};
pub use intake::{FeedbackIntake, FeedbackSource};
pub use job_queue::{JobQueue, SqliteJobQueueStore};
