//! Operational HTTP surface: `/health` and `/metrics`.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::metrics::metrics_handler;
use crate::classifier::ClassifierClient;

#[derive(Clone)]
pub struct OpsState {
    pub classifier: Arc<ClassifierClient>,
    pub version: String,
}

impl OpsState {
    pub fn new(classifier: Arc<ClassifierClient>) -> Self {
        Self {
            classifier,
            version: env!("BUILD_VERSION").to_string(),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: String,
    models_warmed: bool,
}

async fn health(State(state): State<OpsState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: state.version.clone(),
        models_warmed: state.classifier.models_warmed(),
    })
}

pub fn make_ops_app(state: OpsState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Serve the ops app until `shutdown` is cancelled.
pub async fn run_ops_server(port: u16, state: OpsState, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind ops server to port {}", port))?;
    info!("Ops server listening on {}", listener.local_addr()?);

    axum::serve(listener, make_ops_app(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}
