use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub metrics_port: Option<u16>,

    pub classifier: Option<ClassifierConfig>,
    pub sentiment_worker: Option<SentimentWorkerConfig>,
    pub transcription: Option<TranscriptionConfig>,
    pub alerts: Option<AlertsConfig>,
    pub queue: Option<QueueConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ClassifierConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub sentiment_model: Option<String>,
    pub emotion_model: Option<String>,
    pub timeout_sec: Option<u64>,
    pub model_warmup_delay_ms: Option<u64>,
    pub rate_limit_delay_ms: Option<u64>,
    // Sentiment bands
    pub extreme_threshold: Option<f64>,
    pub moderate_threshold: Option<f64>,
    pub moderate_scale: Option<f64>,
    pub neutral_scale: Option<f64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SentimentWorkerConfig {
    /// Parallel classifications.
    pub batch_size: Option<usize>,
    pub jobs_per_second: Option<u32>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub language_code: Option<String>,
    pub timeout_sec: Option<u64>,
    pub polling_attempts: Option<u32>,
    pub polling_interval_ms: Option<u64>,
    pub concurrency: Option<usize>,
    pub jobs_per_minute: Option<u32>,
    pub max_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AlertsConfig {
    pub negative_count_1h: Option<u64>,
    pub negative_ratio_1h: Option<f64>,
    pub min_ratio_sample: Option<u64>,
    pub high_volume_negative_1h: Option<u64>,
    pub negative_count_24h: Option<u64>,
    pub dedup_window_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct QueueConfig {
    pub poll_interval_ms: Option<u64>,
    pub shutdown_grace_secs: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub completed_retention: Option<usize>,
    pub dead_job_retention: Option<usize>,
    pub stats_interval_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
