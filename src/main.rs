use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use feedback_pulse::alerts::{AlertEngine, SqliteAlertStore};
use feedback_pulse::classifier::{ClassifierClient, HuggingFaceClient};
use feedback_pulse::config::{self, AppConfig, FileConfig};
use feedback_pulse::events::EventBus;
use feedback_pulse::feedback_store::SqliteFeedbackStore;
use feedback_pulse::intake::{self, FeedbackIntake};
use feedback_pulse::job_queue::{JobQueue, JobType, JobWorker, SqliteJobQueueStore};
use feedback_pulse::server::{metrics, run_ops_server, OpsState};
use feedback_pulse::transcription::AssemblyAiClient;
use feedback_pulse::workers::{
    sentiment_consume_options, transcription_consume_options, FeedbackLocks, QueueStatsPublisher,
    SentimentHandler, TranscriptionHandler,
};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

fn parse_dir(s: &str) -> Result<PathBuf, String> {
    let path = parse_path(s)?;
    if !path.exists() {
        return Err(format!("Directory does not exist: {}", s));
    }
    if !path.is_dir() {
        return Err(format!("Path is not a directory: {}", s));
    }
    Ok(path)
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, env = "FEEDBACK_PULSE_CONFIG", value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory containing database files (feedback.db, alerts.db, job_queue.db).
    /// Can also be specified in config file.
    #[clap(long, env = "DB_DIR", value_parser = parse_dir)]
    pub db_dir: Option<PathBuf>,

    /// JSON files of text feedback to bulk-import at startup. Repeatable.
    #[clap(long = "import", value_parser = parse_path)]
    pub imports: Vec<PathBuf>,

    /// The port for the ops server (health and Prometheus scraping).
    #[clap(long, env = "METRICS_PORT", default_value_t = 9091)]
    pub metrics_port: u16,

    /// Base URL of the text-classification inference API.
    #[clap(long, env = "HUGGINGFACE_API_URL")]
    pub classifier_base_url: Option<String>,

    #[clap(long, env = "HUGGINGFACE_API_KEY", hide_env_values = true)]
    pub classifier_api_key: Option<String>,

    /// Number of sentiment jobs processed in parallel.
    #[clap(long, env = "SENTIMENT_BATCH_SIZE")]
    pub batch_size: Option<usize>,

    /// Attempts per sentiment job before it is moved to the dead-job archive.
    #[clap(long, env = "SENTIMENT_RETRY_ATTEMPTS")]
    pub retry_attempts: Option<u32>,

    /// Base delay of the exponential retry backoff, in milliseconds.
    #[clap(long, env = "SENTIMENT_RETRY_DELAY_MS")]
    pub retry_delay_ms: Option<u64>,

    /// Wait before retrying a model that is still loading, in milliseconds.
    #[clap(long, env = "MODEL_WARMUP_DELAY_MS")]
    pub model_warmup_delay_ms: Option<u64>,

    /// Base URL of the speech-to-text API.
    #[clap(long, env = "ASSEMBLYAI_API_URL")]
    pub transcription_base_url: Option<String>,

    #[clap(long, env = "ASSEMBLYAI_API_KEY", hide_env_values = true)]
    pub transcription_api_key: Option<String>,

    /// Maximum transcript polls per transcription attempt.
    #[clap(long, env = "TRANSCRIPTION_POLLING_ATTEMPTS")]
    pub polling_attempts: Option<u32>,

    /// Delay between transcript polls, in milliseconds.
    #[clap(long, env = "TRANSCRIPTION_POLLING_INTERVAL_MS")]
    pub polling_interval_ms: Option<u64>,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_dir: args.db_dir.clone(),
            metrics_port: args.metrics_port,
            classifier_base_url: args.classifier_base_url.clone(),
            classifier_api_key: args.classifier_api_key.clone(),
            classifier_batch_size: args.batch_size,
            classifier_retry_attempts: args.retry_attempts,
            classifier_retry_delay_ms: args.retry_delay_ms,
            model_warmup_delay_ms: args.model_warmup_delay_ms,
            transcription_base_url: args.transcription_base_url.clone(),
            transcription_api_key: args.transcription_api_key.clone(),
            transcription_polling_attempts: args.polling_attempts,
            transcription_polling_interval_ms: args.polling_interval_ms,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let app_config = AppConfig::resolve(&config::CliConfig::from(&cli_args), file_config)?;
    info!("Using database directory {:?}", app_config.db_dir);

    info!("Initializing metrics...");
    metrics::init_metrics();

    let feedback_store = Arc::new(
        SqliteFeedbackStore::new(app_config.feedback_db_path())
            .context("Failed to open feedback database")?,
    );
    let alert_store = Arc::new(
        SqliteAlertStore::new(app_config.alerts_db_path())
            .context("Failed to open alerts database")?,
    );
    let queue_store = SqliteJobQueueStore::new(
        app_config.job_queue_db_path(),
        app_config.queue.retention,
    )
    .context("Failed to open job queue database")?;
    let queue = Arc::new(JobQueue::new(Arc::new(queue_store)));
    queue.recover_interrupted()?;

    let event_bus = Arc::new(EventBus::default());
    let _event_log = event_bus.spawn_log_subscriber();

    if app_config.classifier.api_key.is_none() {
        warn!("No classifier API key configured, requests will be anonymous");
    }
    let hf_client = HuggingFaceClient::new(
        app_config.classifier.base_url.clone(),
        app_config.classifier.api_key.clone(),
        app_config.classifier.timeout,
    )?;
    let classifier = Arc::new(ClassifierClient::new(
        Arc::new(hf_client),
        &app_config.classifier,
    ));

    let stt_client = AssemblyAiClient::new(
        app_config.transcription.base_url.clone(),
        app_config.transcription.api_key.clone(),
        app_config.transcription.language_code.clone(),
        app_config.transcription.timeout,
    )?;

    let intake = FeedbackIntake::new(
        feedback_store.clone(),
        queue.clone(),
        event_bus.clone(),
        app_config.sentiment_worker.job_defaults,
        app_config.transcription.job_defaults,
    );
    for path in &cli_args.imports {
        let items = intake::load_import_file(path)?;
        let ids = intake.submit_bulk(items);
        info!("Imported {} feedback items from {:?}", ids.len(), path);
    }

    let alert_engine = Arc::new(AlertEngine::new(
        feedback_store.clone(),
        alert_store,
        event_bus.clone(),
        app_config.alerts.clone(),
    ));
    let locks = Arc::new(FeedbackLocks::new());

    let sentiment_handler = Arc::new(SentimentHandler::new(
        classifier.clone(),
        feedback_store.clone(),
        alert_engine,
        event_bus.clone(),
        locks.clone(),
    ));
    let transcription_handler = Arc::new(TranscriptionHandler::new(
        Arc::new(stt_client),
        feedback_store,
        locks,
        &app_config.transcription,
        app_config.sentiment_worker.job_defaults,
    ));

    let shutdown_token = CancellationToken::new();

    {
        let classifier = classifier.clone();
        tokio::spawn(async move { classifier.warm_up().await });
    }

    let mut tasks = tokio::task::JoinSet::new();
    tasks.spawn(
        JobWorker::new(
            queue.clone(),
            JobType::Sentiment,
            sentiment_handler,
            sentiment_consume_options(&app_config),
        )
        .run(shutdown_token.clone()),
    );
    tasks.spawn(
        JobWorker::new(
            queue.clone(),
            JobType::Transcription,
            transcription_handler,
            transcription_consume_options(&app_config),
        )
        .run(shutdown_token.clone()),
    );
    tasks.spawn(
        QueueStatsPublisher::new(queue, event_bus, app_config.queue.stats_interval)
            .run(shutdown_token.clone()),
    );

    info!("Ops server available at port {}!", app_config.metrics_port);

    tokio::select! {
        result = run_ops_server(
            app_config.metrics_port,
            OpsState::new(classifier),
            shutdown_token.clone(),
        ) => {
            if let Err(e) = &result {
                error!("Ops server stopped: {:#}", e);
            }
            shutdown_token.cancel();
            result?;
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown");
            shutdown_token.cancel();
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!("Background task failed: {}", e);
        }
    }
    info!("Shutdown complete");
    Ok(())
}
