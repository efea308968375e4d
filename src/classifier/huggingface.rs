//! HTTP backend for the Hugging Face inference API.
//!
//! Requests are `POST {base_url}/models/{model}` with `{"inputs": text}`.
//! Responses come either flat (`[{label, score}]`) or nested one level
//! (`[[{label, score}]]`) depending on the model pipeline.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::provider::{ClassifierBackend, ClassifierError, LabelScore};

#[derive(Clone)]
pub struct HuggingFaceClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    Nested(Vec<Vec<LabelScore>>),
    Flat(Vec<LabelScore>),
}

/// Body of a request that hit a model still being loaded.
#[derive(Deserialize)]
struct LoadingResponse {
    error: String,
    estimated_time: f64,
}

fn is_loading_body(body: &str) -> bool {
    serde_json::from_str::<LoadingResponse>(body).is_ok_and(|response| {
        response.estimated_time >= 0.0 && response.error.to_lowercase().contains("loading")
    })
}

impl InferenceResponse {
    fn into_labels(self) -> Vec<LabelScore> {
        match self {
            InferenceResponse::Nested(outer) => outer.into_iter().next().unwrap_or_default(),
            InferenceResponse::Flat(labels) => labels,
        }
    }
}

impl HuggingFaceClient {
    pub fn new(base_url: String, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ClassifierBackend for HuggingFaceClient {
    async fn classify(&self, model: &str, text: &str) -> Result<Vec<LabelScore>, ClassifierError> {
        let url = format!("{}/models/{}", self.base_url, model);
        let mut request = self.client.post(&url).json(&json!({ "inputs": text }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ClassifierError::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClassifierError::Http(e.to_string()))?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ClassifierError::RateLimited);
        }
        if !status.is_success() {
            if status == StatusCode::SERVICE_UNAVAILABLE || is_loading_body(&body) {
                return Err(ClassifierError::ModelLoading(model.to_string()));
            }
            return Err(ClassifierError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: InferenceResponse = serde_json::from_str(&body)
            .map_err(|e| ClassifierError::InvalidResponse(e.to_string()))?;
        let labels = parsed.into_labels();
        if labels.is_empty() {
            return Err(ClassifierError::InvalidResponse(
                "empty label list".to_string(),
            ));
        }
        Ok(labels)
    }
}
