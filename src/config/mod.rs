mod file_config;

pub use file_config::{
    AlertsConfig, ClassifierConfig, FileConfig, QueueConfig, SentimentWorkerConfig,
    TranscriptionConfig,
};

use crate::classifier::SentimentBands;
use crate::job_queue::{JobDefaults, RetentionSettings};
use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

/// CLI (and environment) arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub metrics_port: u16,
    pub classifier_base_url: Option<String>,
    pub classifier_api_key: Option<String>,
    pub classifier_batch_size: Option<usize>,
    pub classifier_retry_attempts: Option<u32>,
    pub classifier_retry_delay_ms: Option<u64>,
    pub model_warmup_delay_ms: Option<u64>,
    pub transcription_base_url: Option<String>,
    pub transcription_api_key: Option<String>,
    pub transcription_polling_attempts: Option<u32>,
    pub transcription_polling_interval_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub metrics_port: u16,

    // Feature configs (with defaults)
    pub classifier: ClassifierSettings,
    pub sentiment_worker: SentimentWorkerSettings,
    pub transcription: TranscriptionSettings,
    pub alerts: AlertSettings,
    pub queue: QueueSettings,
}

#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub sentiment_model: String,
    pub emotion_model: String,
    pub timeout: Duration,
    pub model_warmup_delay: Duration,
    pub rate_limit_delay: Duration,
    pub bands: SentimentBands,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api-inference.huggingface.co".to_string(),
            api_key: None,
            sentiment_model: "distilbert-base-uncased-finetuned-sst-2-english".to_string(),
            emotion_model: "j-hartmann/emotion-english-distilroberta-base".to_string(),
            timeout: Duration::from_secs(30),
            model_warmup_delay: Duration::from_secs(10),
            rate_limit_delay: Duration::from_secs(2),
            bands: SentimentBands::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SentimentWorkerSettings {
    pub concurrency: usize,
    pub jobs_per_second: u32,
    pub job_defaults: JobDefaults,
}

impl Default for SentimentWorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: 10,
            jobs_per_second: 10,
            job_defaults: JobDefaults {
                max_attempts: 3,
                backoff: Duration::from_secs(2),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct TranscriptionSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub language_code: String,
    pub timeout: Duration,
    pub polling_attempts: u32,
    pub polling_interval: Duration,
    pub concurrency: usize,
    pub jobs_per_minute: u32,
    pub job_defaults: JobDefaults,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.assemblyai.com".to_string(),
            api_key: None,
            language_code: "en_us".to_string(),
            timeout: Duration::from_secs(30),
            polling_attempts: 60,
            polling_interval: Duration::from_secs(5),
            concurrency: 2,
            jobs_per_minute: 10,
            job_defaults: JobDefaults {
                max_attempts: 3,
                backoff: Duration::from_secs(10),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct AlertSettings {
    /// Negative results in the last hour that raise HIGH_VOLUME_NEGATIVE.
    pub high_volume_negative_1h: u64,
    pub negative_ratio_1h: f64,
    /// Minimum results in the last hour before the ratio is considered.
    pub min_ratio_sample: u64,
    pub negative_count_1h: u64,
    pub negative_count_24h: u64,
    pub dedup_window: Duration,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            high_volume_negative_1h: 20,
            negative_ratio_1h: 0.7,
            min_ratio_sample: 10,
            negative_count_1h: 10,
            negative_count_24h: 50,
            dedup_window: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub poll_interval: Duration,
    pub shutdown_grace: Duration,
    pub max_backoff: Duration,
    pub retention: RetentionSettings,
    pub stats_interval: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            shutdown_grace: Duration::from_secs(30),
            max_backoff: Duration::from_secs(15 * 60),
            retention: RetentionSettings::default(),
            stats_interval: Duration::from_secs(30),
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let classifier = resolve_classifier(cli, file.classifier.unwrap_or_default())?;

        let sw_file = file.sentiment_worker.unwrap_or_default();
        let sw_defaults = SentimentWorkerSettings::default();
        let sentiment_worker = SentimentWorkerSettings {
            concurrency: sw_file
                .batch_size
                .or(cli.classifier_batch_size)
                .unwrap_or(sw_defaults.concurrency),
            jobs_per_second: sw_file
                .jobs_per_second
                .unwrap_or(sw_defaults.jobs_per_second),
            job_defaults: JobDefaults {
                max_attempts: sw_file
                    .retry_attempts
                    .or(cli.classifier_retry_attempts)
                    .unwrap_or(sw_defaults.job_defaults.max_attempts),
                backoff: sw_file
                    .retry_delay_ms
                    .or(cli.classifier_retry_delay_ms)
                    .map(Duration::from_millis)
                    .unwrap_or(sw_defaults.job_defaults.backoff),
            },
        };
        if sentiment_worker.concurrency == 0 {
            bail!("Classifier batch size must be at least 1");
        }

        let tr_file = file.transcription.unwrap_or_default();
        let tr_defaults = TranscriptionSettings::default();
        let transcription = TranscriptionSettings {
            base_url: tr_file
                .base_url
                .or_else(|| cli.transcription_base_url.clone())
                .unwrap_or(tr_defaults.base_url),
            api_key: tr_file
                .api_key
                .or_else(|| cli.transcription_api_key.clone()),
            language_code: tr_file.language_code.unwrap_or(tr_defaults.language_code),
            timeout: tr_file
                .timeout_sec
                .map(Duration::from_secs)
                .unwrap_or(tr_defaults.timeout),
            polling_attempts: tr_file
                .polling_attempts
                .or(cli.transcription_polling_attempts)
                .unwrap_or(tr_defaults.polling_attempts),
            polling_interval: tr_file
                .polling_interval_ms
                .or(cli.transcription_polling_interval_ms)
                .map(Duration::from_millis)
                .unwrap_or(tr_defaults.polling_interval),
            concurrency: tr_file.concurrency.unwrap_or(tr_defaults.concurrency),
            jobs_per_minute: tr_file
                .jobs_per_minute
                .unwrap_or(tr_defaults.jobs_per_minute),
            job_defaults: JobDefaults {
                max_attempts: tr_file
                    .max_attempts
                    .unwrap_or(tr_defaults.job_defaults.max_attempts),
                backoff: tr_file
                    .retry_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(tr_defaults.job_defaults.backoff),
            },
        };
        if transcription.polling_attempts == 0 {
            bail!("Transcription polling attempts must be at least 1");
        }
        if transcription.polling_interval.is_zero() {
            bail!("Transcription polling interval must be greater than zero");
        }

        let alerts_file = file.alerts.unwrap_or_default();
        let alert_defaults = AlertSettings::default();
        let alerts = AlertSettings {
            high_volume_negative_1h: alerts_file
                .high_volume_negative_1h
                .unwrap_or(alert_defaults.high_volume_negative_1h),
            negative_ratio_1h: alerts_file
                .negative_ratio_1h
                .unwrap_or(alert_defaults.negative_ratio_1h),
            min_ratio_sample: alerts_file
                .min_ratio_sample
                .unwrap_or(alert_defaults.min_ratio_sample),
            negative_count_1h: alerts_file
                .negative_count_1h
                .unwrap_or(alert_defaults.negative_count_1h),
            negative_count_24h: alerts_file
                .negative_count_24h
                .unwrap_or(alert_defaults.negative_count_24h),
            dedup_window: alerts_file
                .dedup_window_secs
                .map(Duration::from_secs)
                .unwrap_or(alert_defaults.dedup_window),
        };

        let queue_file = file.queue.unwrap_or_default();
        let queue_defaults = QueueSettings::default();
        let queue = QueueSettings {
            poll_interval: queue_file
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(queue_defaults.poll_interval),
            shutdown_grace: queue_file
                .shutdown_grace_secs
                .map(Duration::from_secs)
                .unwrap_or(queue_defaults.shutdown_grace),
            max_backoff: queue_file
                .max_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(queue_defaults.max_backoff),
            retention: RetentionSettings {
                completed: queue_file
                    .completed_retention
                    .unwrap_or(queue_defaults.retention.completed),
                dead: queue_file
                    .dead_job_retention
                    .unwrap_or(queue_defaults.retention.dead),
            },
            stats_interval: queue_file
                .stats_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(queue_defaults.stats_interval),
        };
        if queue.poll_interval.is_zero() {
            bail!("Queue poll interval must be greater than zero");
        }
        if queue.stats_interval.is_zero() {
            bail!("Queue stats interval must be greater than zero");
        }
        if queue.shutdown_grace.is_zero() {
            bail!("Shutdown grace period must be greater than zero");
        }

        Ok(Self {
            db_dir,
            metrics_port,
            classifier,
            sentiment_worker,
            transcription,
            alerts,
            queue,
        })
    }

    pub fn feedback_db_path(&self) -> PathBuf {
        self.db_dir.join("feedback.db")
    }

    pub fn alerts_db_path(&self) -> PathBuf {
        self.db_dir.join("alerts.db")
    }

    pub fn job_queue_db_path(&self) -> PathBuf {
        self.db_dir.join("job_queue.db")
    }
}

fn resolve_classifier(cli: &CliConfig, file: ClassifierConfig) -> Result<ClassifierSettings> {
    let defaults = ClassifierSettings::default();
    let bands = SentimentBands {
        extreme_threshold: file
            .extreme_threshold
            .unwrap_or(defaults.bands.extreme_threshold),
        moderate_threshold: file
            .moderate_threshold
            .unwrap_or(defaults.bands.moderate_threshold),
        moderate_scale: file.moderate_scale.unwrap_or(defaults.bands.moderate_scale),
        neutral_scale: file.neutral_scale.unwrap_or(defaults.bands.neutral_scale),
    };
    if !(0.0..=1.0).contains(&bands.moderate_threshold)
        || !(0.0..=1.0).contains(&bands.extreme_threshold)
        || bands.moderate_threshold > bands.extreme_threshold
    {
        bail!(
            "Invalid sentiment thresholds: moderate {} must not exceed extreme {}, both in [0, 1]",
            bands.moderate_threshold,
            bands.extreme_threshold
        );
    }

    Ok(ClassifierSettings {
        base_url: file
            .base_url
            .or_else(|| cli.classifier_base_url.clone())
            .unwrap_or(defaults.base_url),
        api_key: file.api_key.or_else(|| cli.classifier_api_key.clone()),
        sentiment_model: file.sentiment_model.unwrap_or(defaults.sentiment_model),
        emotion_model: file.emotion_model.unwrap_or(defaults.emotion_model),
        timeout: file
            .timeout_sec
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout),
        model_warmup_delay: file
            .model_warmup_delay_ms
            .or(cli.model_warmup_delay_ms)
            .map(Duration::from_millis)
            .unwrap_or(defaults.model_warmup_delay),
        rate_limit_delay: file
            .rate_limit_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.rate_limit_delay),
        bands,
    })
}
