use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One `(label, score)` pair as returned by a text-classification model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f64,
}

impl LabelScore {
    pub fn new(label: impl Into<String>, score: f64) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ClassifierError {
    #[error("model {0} is loading")]
    ModelLoading(String),

    #[error("rate limited by classifier provider")]
    RateLimited,

    #[error("classifier request failed: {0}")]
    Http(String),

    #[error("classifier returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid classifier response: {0}")]
    InvalidResponse(String),
}

impl ClassifierError {
    /// Label used for the `outcome` dimension of request metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            ClassifierError::ModelLoading(_) => "model_loading",
            ClassifierError::RateLimited => "rate_limited",
            ClassifierError::Http(_) => "http_error",
            ClassifierError::Api { .. } => "api_error",
            ClassifierError::InvalidResponse(_) => "invalid_response",
        }
    }
}

/// A hosted text-classification provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClassifierBackend: Send + Sync {
    async fn classify(&self, model: &str, text: &str) -> Result<Vec<LabelScore>, ClassifierError>;
}
