use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all pipeline metrics
const PREFIX: &str = "feedback_pulse";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Job Metrics
    pub static ref JOBS_PROCESSED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_jobs_processed_total"), "Total job attempts by outcome"),
        &["job_type", "outcome"]
    ).expect("Failed to create jobs_processed_total metric");

    pub static ref JOB_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_job_duration_seconds"),
            "Job attempt duration in seconds"
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0, 600.0]),
        &["job_type"]
    ).expect("Failed to create job_duration_seconds metric");

    pub static ref QUEUE_JOBS: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_queue_jobs"), "Jobs per queue state"),
        &["job_type", "state"]
    ).expect("Failed to create queue_jobs metric");

    // Classifier Metrics
    pub static ref CLASSIFIER_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_classifier_requests_total"), "Classifier provider calls"),
        &["model", "outcome"]
    ).expect("Failed to create classifier_requests_total metric");

    pub static ref CLASSIFIER_FALLBACKS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            format!("{PREFIX}_classifier_fallbacks_total"),
            "Classifications served by the local fallback"
        ),
        &["kind"]
    ).expect("Failed to create classifier_fallbacks_total metric");

    // Alert Metrics
    pub static ref ALERTS_RAISED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_alerts_raised_total"), "Alerts created"),
        &["alert_type", "severity"]
    ).expect("Failed to create alerts_raised_total metric");

    // Process Metrics
    pub static ref PROCESS_MEMORY_BYTES: Gauge = Gauge::new(
        format!("{PREFIX}_process_memory_bytes"),
        "Process memory usage in bytes"
    ).expect("Failed to create process_memory_bytes metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(JOBS_PROCESSED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(JOB_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(QUEUE_JOBS.clone()));
    let _ = REGISTRY.register(Box::new(CLASSIFIER_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(CLASSIFIER_FALLBACKS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ALERTS_RAISED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PROCESS_MEMORY_BYTES.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record one finished job attempt
pub fn record_job(job_type: &str, outcome: &str, duration: Duration) {
    JOBS_PROCESSED_TOTAL
        .with_label_values(&[job_type, outcome])
        .inc();

    JOB_DURATION_SECONDS
        .with_label_values(&[job_type])
        .observe(duration.as_secs_f64());
}

pub fn record_classifier_request(model: &str, outcome: &str) {
    CLASSIFIER_REQUESTS_TOTAL
        .with_label_values(&[model, outcome])
        .inc();
}

pub fn record_classifier_fallback(kind: &str) {
    CLASSIFIER_FALLBACKS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn record_alert(alert_type: &str, severity: &str) {
    ALERTS_RAISED_TOTAL
        .with_label_values(&[alert_type, severity])
        .inc();
}

pub fn set_queue_depth(job_type: &str, state: &str, count: u64) {
    QUEUE_JOBS
        .with_label_values(&[job_type, state])
        .set(count as f64);
}

/// Update process memory usage
pub fn update_memory_usage() {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if line.starts_with("VmRSS:") {
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        if let Ok(kb) = kb_str.parse::<f64>() {
                            PROCESS_MEMORY_BYTES.set(kb * 1024.0);
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    update_memory_usage();

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_else(|_| String::from(""));
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
