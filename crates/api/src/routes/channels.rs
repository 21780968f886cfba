//! Channel test-send endpoint.

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;
use uuid::Uuid;

use beacon_common::error::AppError;
use beacon_common::types::ChannelType;

use crate::state::AppState;

const TEST_SUBJECT: &str = "Test notification";
const TEST_MESSAGE: &str =
    "This is a test notification. If you can read it, the channel is set up correctly.";

pub fn router() -> Router<AppState> {
    Router::new().route("/api/channels/{id}/test", post(send_test))
}

/// POST /api/channels/:id/test: Deliver a test message right away, bypassing the queue.
async fn send_test(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let channel = state
        .repo
        .get_channel(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Channel {} not found", id)))?;

    let body = match channel.channel_type {
        ChannelType::Webhook => json!({
            "type": "test",
            "channel_id": channel.id,
            "message": TEST_MESSAGE,
        })
        .to_string(),
        _ => TEST_MESSAGE.to_string(),
    };

    state
        .dispatcher
        .send_to_channel(&channel, TEST_SUBJECT, &body)
        .await?;

    Ok(Json(json!({
        "sent": true,
        "channel_id": channel.id,
        "channel_type": channel.channel_type,
    })))
}
