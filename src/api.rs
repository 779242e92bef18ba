//! Read-only status surface: `/health`, `/status`, optional `/metrics`.

use axum::{extract::State, routing::get, Json, Router};
use tokio::sync::watch;

use crate::metrics::Metrics;
use crate::orchestrator::PipelineStatus;

#[derive(Clone)]
pub struct AppState {
    status: watch::Receiver<PipelineStatus>,
}

impl AppState {
    pub fn new(status: watch::Receiver<PipelineStatus>) -> Self {
        Self { status }
    }
}

/// Router without metrics; tests use this directly.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(status))
        .with_state(state)
}

/// Router plus `/metrics` when a recorder is installed.
pub fn router_with_metrics(state: AppState, metrics: Option<&Metrics>) -> Router {
    let base = router(state);
    match metrics {
        Some(m) => base.merge(m.router()),
        None => base,
    }
}

async fn status(State(state): State<AppState>) -> Json<PipelineStatus> {
    Json(state.status.borrow().clone())
}

/// Bind and serve until `shutdown` resolves.
pub async fn serve(
    bind: &str,
    app: Router,
    shutdown: tokio_util::sync::CancellationToken,
) -> anyhow::Result<()> {
    use anyhow::Context;
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding status server on {bind}"))?;
    tracing::info!(%bind, "status server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("status server")
}
