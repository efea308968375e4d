//! Full pipeline harness
//!
//! Each test gets its own temp database directory, scripted providers and
//! both workers running with fast timings. When dropped, the workers are
//! cancelled and temp resources are cleaned up.

use super::constants::*;
use super::fakes::{RecordingBroadcaster, ScriptedClassifier, ScriptedSpeechToText};
use feedback_pulse::alerts::{AlertEngine, SqliteAlertStore};
use feedback_pulse::classifier::ClassifierClient;
use feedback_pulse::config::{AppConfig, CliConfig};
use feedback_pulse::feedback_store::{FeedbackItem, FeedbackStore, SqliteFeedbackStore};
use feedback_pulse::intake::FeedbackIntake;
use feedback_pulse::job_queue::{JobQueue, JobType, JobWorker, SqliteJobQueueStore};
use feedback_pulse::workers::{
    sentiment_consume_options, transcription_consume_options, FeedbackLocks, SentimentHandler,
    TranscriptionHandler,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TestPipeline {
    pub config: AppConfig,
    pub feedback_store: Arc<SqliteFeedbackStore>,
    pub alert_store: Arc<SqliteAlertStore>,
    pub queue: Arc<JobQueue>,
    pub intake: FeedbackIntake,
    pub broadcaster: Arc<RecordingBroadcaster>,
    pub classifier: Arc<ScriptedClassifier>,
    pub stt: Arc<ScriptedSpeechToText>,

    shutdown: CancellationToken,
    workers: Vec<JoinHandle<()>>,
    _temp_dir: TempDir,
}

/// Defaults tuned for tests: millisecond timings, alerts effectively off.
fn test_config(db_dir: &TempDir) -> AppConfig {
    let cli = CliConfig {
        db_dir: Some(db_dir.path().to_path_buf()),
        metrics_port: 0,
        ..Default::default()
    };
    let mut config = AppConfig::resolve(&cli, None).expect("Failed to resolve test config");

    config.classifier.sentiment_model = SENTIMENT_MODEL.to_string();
    config.classifier.emotion_model = EMOTION_MODEL.to_string();
    config.classifier.model_warmup_delay = Duration::from_millis(10);
    config.classifier.rate_limit_delay = Duration::from_millis(10);

    config.sentiment_worker.jobs_per_second = 1000;
    config.sentiment_worker.job_defaults.backoff = Duration::from_millis(10);

    config.transcription.polling_attempts = 5;
    config.transcription.polling_interval = Duration::from_millis(10);
    config.transcription.jobs_per_minute = 1000;
    config.transcription.job_defaults.max_attempts = 2;
    config.transcription.job_defaults.backoff = Duration::from_millis(10);

    config.queue.poll_interval = Duration::from_millis(10);
    config.queue.shutdown_grace = Duration::from_millis(500);
    config.queue.max_backoff = Duration::from_millis(100);

    config.alerts.high_volume_negative_1h = 1_000;
    config.alerts.negative_count_1h = 1_000;
    config.alerts.negative_count_24h = 1_000;
    config.alerts.min_ratio_sample = 1_000;
    config
}

impl TestPipeline {
    /// Build the pipeline without starting workers.
    pub fn new(stt: ScriptedSpeechToText, configure: impl FnOnce(&mut AppConfig)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = test_config(&temp_dir);
        configure(&mut config);

        let feedback_store = Arc::new(
            SqliteFeedbackStore::new(config.feedback_db_path())
                .expect("Failed to open feedback store"),
        );
        let alert_store = Arc::new(
            SqliteAlertStore::new(config.alerts_db_path()).expect("Failed to open alert store"),
        );
        let queue_store =
            SqliteJobQueueStore::new(config.job_queue_db_path(), config.queue.retention)
                .expect("Failed to open job queue");
        let queue = Arc::new(JobQueue::new(Arc::new(queue_store)));
        let broadcaster = Arc::new(RecordingBroadcaster::default());

        let intake = FeedbackIntake::new(
            feedback_store.clone(),
            queue.clone(),
            broadcaster.clone(),
            config.sentiment_worker.job_defaults,
            config.transcription.job_defaults,
        );

        Self {
            config,
            feedback_store,
            alert_store,
            queue,
            intake,
            broadcaster,
            classifier: Arc::new(ScriptedClassifier::default()),
            stt: Arc::new(stt),
            shutdown: CancellationToken::new(),
            workers: Vec::new(),
            _temp_dir: temp_dir,
        }
    }

    /// Build and start both workers.
    pub fn spawn(stt: ScriptedSpeechToText, configure: impl FnOnce(&mut AppConfig)) -> Self {
        let mut pipeline = Self::new(stt, configure);
        pipeline.start();
        pipeline
    }

    pub fn start(&mut self) {
        let classifier = Arc::new(ClassifierClient::new(
            self.classifier.clone(),
            &self.config.classifier,
        ));
        let alert_engine = Arc::new(AlertEngine::new(
            self.feedback_store.clone(),
            self.alert_store.clone(),
            self.broadcaster.clone(),
            self.config.alerts.clone(),
        ));
        let locks = Arc::new(FeedbackLocks::new());

        let sentiment = SentimentHandler::new(
            classifier,
            self.feedback_store.clone(),
            alert_engine,
            self.broadcaster.clone(),
            locks.clone(),
        );
        let transcription = TranscriptionHandler::new(
            self.stt.clone(),
            self.feedback_store.clone(),
            locks,
            &self.config.transcription,
            self.config.sentiment_worker.job_defaults,
        );

        self.workers.push(tokio::spawn(
            JobWorker::new(
                self.queue.clone(),
                JobType::Sentiment,
                Arc::new(sentiment),
                sentiment_consume_options(&self.config),
            )
            .run(self.shutdown.clone()),
        ));
        self.workers.push(tokio::spawn(
            JobWorker::new(
                self.queue.clone(),
                JobType::Transcription,
                Arc::new(transcription),
                transcription_consume_options(&self.config),
            )
            .run(self.shutdown.clone()),
        ));
    }

    pub fn feedback(&self, id: &str) -> FeedbackItem {
        self.feedback_store
            .get_feedback(id)
            .unwrap()
            .expect("feedback item should exist")
    }

    /// Poll `condition` until it holds or the wait times out.
    pub async fn wait_for<F: Fn(&Self) -> bool>(&self, what: &str, condition: F) {
        let reached = tokio::time::timeout(WAIT_TIMEOUT, async {
            while !condition(self) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(reached.is_ok(), "Timed out waiting for {}", what);
    }

    pub async fn wait_for_completed(&self, job_type: JobType, count: u64) {
        self.wait_for(&format!("{} completed {} job(s)", job_type, count), |p| {
            p.queue.stats(job_type).unwrap().completed >= count
        })
        .await;
    }

    pub async fn wait_for_dead(&self, job_type: JobType, count: u64) {
        self.wait_for(&format!("{} dead job(s) in {}", count, job_type), |p| {
            p.queue.stats(job_type).unwrap().dead >= count
        })
        .await;
    }

    /// Cancel the workers and wait for them to drain.
    pub async fn stop(mut self) {
        self.shutdown.cancel();
        for worker in self.workers.drain(..) {
            worker.await.expect("worker task panicked");
        }
    }
}

impl Drop for TestPipeline {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
