//! HTTP client for the AssemblyAI v2 transcript API.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;

use super::provider::{SpeechToText, Transcript, TranscriptionError};

#[derive(Clone)]
pub struct AssemblyAiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    language_code: String,
}

#[derive(Deserialize)]
struct SubmitResponse {
    id: String,
}

impl AssemblyAiClient {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        language_code: String,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            language_code,
        })
    }

    fn with_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("authorization", key),
            None => request,
        }
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, TranscriptionError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TranscriptionError::Api {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json()
            .await
            .map_err(|e| TranscriptionError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl SpeechToText for AssemblyAiClient {
    async fn submit_transcription(&self, audio_url: &str) -> Result<String, TranscriptionError> {
        let url = format!("{}/v2/transcript", self.base_url);
        let body = json!({
            "audio_url": audio_url,
            "language_code": self.language_code,
            "punctuate": true,
            "format_text": true,
        });

        let response = self
            .with_auth(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| TranscriptionError::Http(e.to_string()))?;

        let submitted: SubmitResponse = Self::parse(response).await?;
        Ok(submitted.id)
    }

    async fn get_transcript(&self, transcript_id: &str) -> Result<Transcript, TranscriptionError> {
        let url = format!("{}/v2/transcript/{}", self.base_url, transcript_id);
        let response = self
            .with_auth(self.client.get(&url))
            .send()
            .await
            .map_err(|e| TranscriptionError::Http(e.to_string()))?;

        Self::parse(response).await
    }
}
