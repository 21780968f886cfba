//! JSON bodies for incoming webhooks.

use serde::Serialize;

use super::subject;
use crate::error::RenderError;
use crate::payload::NotificationPayload;

#[derive(Serialize)]
struct WebhookBody<'a> {
    subject: String,
    #[serde(flatten)]
    payload: &'a NotificationPayload,
}

/// Every message kind shares the same document shape; `kind` tells receivers apart.
pub fn document(payload: &NotificationPayload) -> Result<String, RenderError> {
    let body = WebhookBody {
        subject: subject(payload),
        payload,
    };
    Ok(serde_json::to_string(&body)?)
}
