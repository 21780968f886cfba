//! Prometheus scrape endpoint.

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use beacon_common::error::AppError;
use beacon_notifier::refresh_queue_depth;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/metrics", get(metrics))
}

/// GET /metrics: Prometheus text exposition of the pipeline metrics.
async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    // On failure the previous gauge values are served.
    if let Err(e) = refresh_queue_depth(state.repo.as_ref(), &state.metrics).await {
        tracing::warn!(error = %e, "Failed to refresh queue depth before scrape");
    }

    let body = state
        .metrics
        .render()
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    ))
}
