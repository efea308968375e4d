use super::models::*;
use anyhow::Result;

/// Storage for feedback items and their analysis results.
///
/// Timestamps are unix seconds.
pub trait FeedbackStore: Send + Sync {
    fn insert_feedback(&self, item: &FeedbackItem) -> Result<()>;

    fn get_feedback(&self, id: &str) -> Result<Option<FeedbackItem>>;

    fn set_processed(&self, id: &str, processed: bool) -> Result<()>;

    /// Rewrite the comment and merge `metadata_patch` into the metadata.
    /// Returns false if the item does not exist.
    fn update_comment(&self, id: &str, comment: &str, metadata_patch: &Metadata) -> Result<bool>;

    /// Merge `patch` into the item's metadata. Returns false if the item does not exist.
    fn merge_metadata(&self, id: &str, patch: &Metadata) -> Result<bool>;

    /// Delete any prior result for the same feedback item and insert `result`,
    /// in one transaction.
    fn replace_analysis(&self, result: &AnalysisResult) -> Result<()>;

    fn get_analysis(&self, feedback_id: &str) -> Result<Option<AnalysisResult>>;

    /// Returns true if a result was deleted.
    fn delete_analysis(&self, feedback_id: &str) -> Result<bool>;

    /// Counts results for `channel` created in `(since, until]`.
    fn sentiment_window(&self, channel: Channel, since: i64, until: i64) -> Result<WindowCounts>;
}
