//! Operator endpoints for the notification queue.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use beacon_common::error::AppError;
use beacon_notifier::{QueueItem, QueueStats, QueueStatus};

use crate::state::AppState;

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 500;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/notifications/queue", get(list_queue))
        .route("/api/notifications/queue/stats", get(queue_stats))
        .route("/api/notifications/queue/{id}/retry", post(retry_item))
}

#[derive(Debug, Deserialize)]
pub struct ListQueueParams {
    pub status: Option<String>,
    pub limit: Option<u32>,
}

/// GET /api/notifications/queue: Items in one status, newest first. Defaults to failed items.
async fn list_queue(
    State(state): State<AppState>,
    Query(params): Query<ListQueueParams>,
) -> Result<Json<Vec<QueueItem>>, AppError> {
    let status = match params.status.as_deref() {
        Some(raw) => raw.parse::<QueueStatus>().map_err(AppError::Validation)?,
        None => QueueStatus::Failed,
    };
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let items = state.repo.list_items(status, limit).await?;
    Ok(Json(items))
}

/// GET /api/notifications/queue/stats: Item counts per status.
async fn queue_stats(State(state): State<AppState>) -> Result<Json<QueueStats>, AppError> {
    let stats = state.repo.queue_stats().await?;
    Ok(Json(stats))
}

/// POST /api/notifications/queue/:id/retry: Requeue a failed item.
async fn retry_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<QueueItem>, AppError> {
    let item = state
        .repo
        .get_item(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Queue item {} not found", id)))?;

    if item.status != QueueStatus::Failed {
        return Err(AppError::Validation(format!(
            "Queue item {} is {}, only failed items can be retried",
            id, item.status
        )));
    }

    if !state.repo.requeue(id).await? {
        // Lost a race with another requeue.
        return Err(AppError::Validation(format!(
            "Queue item {} is no longer failed",
            id
        )));
    }

    tracing::info!(item_id = %id, "Queue item requeued by operator");

    let item = state
        .repo
        .get_item(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Queue item {} not found", id)))?;
    Ok(Json(item))
}
