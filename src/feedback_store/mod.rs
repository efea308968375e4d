//! Feedback items and their sentiment analysis results.

mod models;
mod schema;
mod store;
mod trait_def;

pub use models::*;
pub use store::SqliteFeedbackStore;
pub use trait_def::FeedbackStore;
