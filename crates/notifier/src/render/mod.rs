//! Payload rendering per channel type and message kind.
//!
//! The subject line is shared by all channels; the body comes from a template
//! selected by `(channel type, message kind)`. The template table is checked
//! for completeness when the [`Renderer`] is built, so a missing combination
//! fails at startup instead of on the first delivery that needs it.

pub mod email;
pub mod format;
pub mod telegram;
pub mod webhook;

use std::collections::HashMap;

use beacon_common::types::{ChannelType, EventType};

use crate::error::RenderError;
use crate::payload::{MessageKind, NotificationPayload};

/// A body template.
pub type TemplateFn = fn(&NotificationPayload) -> Result<String, RenderError>;

/// Subject and body ready for a sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

/// Lookup key of a template, e.g. `telegram_update`.
pub fn template_key(channel_type: ChannelType, kind: MessageKind) -> String {
    format!("{}_{}", channel_type, kind)
}

/// Subject line shared by every channel.
pub fn subject(payload: &NotificationPayload) -> String {
    let title = &payload.event.title;
    match payload.kind {
        MessageKind::Initial => match payload.event.event_type {
            EventType::Incident => format!("Incident: {}", title),
            EventType::Maintenance => format!("Maintenance: {}", title),
        },
        MessageKind::Update => format!("Update: {}", title),
        MessageKind::Resolved => format!("Resolved: {}", title),
        MessageKind::Completed => format!("Completed: {}", title),
        MessageKind::Cancelled => format!("Cancelled: {}", title),
    }
}

/// The built-in template table.
pub fn default_templates() -> Vec<(ChannelType, MessageKind, TemplateFn)> {
    vec![
        (ChannelType::Email, MessageKind::Initial, email::initial),
        (ChannelType::Email, MessageKind::Update, email::update),
        (ChannelType::Email, MessageKind::Resolved, email::resolved),
        (ChannelType::Email, MessageKind::Completed, email::completed),
        (ChannelType::Email, MessageKind::Cancelled, email::cancelled),
        (ChannelType::Telegram, MessageKind::Initial, telegram::initial),
        (ChannelType::Telegram, MessageKind::Update, telegram::update),
        (ChannelType::Telegram, MessageKind::Resolved, telegram::resolved),
        (ChannelType::Telegram, MessageKind::Completed, telegram::completed),
        (ChannelType::Telegram, MessageKind::Cancelled, telegram::cancelled),
        (ChannelType::Webhook, MessageKind::Initial, webhook::document),
        (ChannelType::Webhook, MessageKind::Update, webhook::document),
        (ChannelType::Webhook, MessageKind::Resolved, webhook::document),
        (ChannelType::Webhook, MessageKind::Completed, webhook::document),
        (ChannelType::Webhook, MessageKind::Cancelled, webhook::document),
    ]
}

/// Deterministic, side-effect-free payload renderer.
pub struct Renderer {
    templates: HashMap<(ChannelType, MessageKind), TemplateFn>,
}

impl Renderer {
    /// Build a renderer from the built-in templates.
    pub fn new() -> Result<Self, RenderError> {
        Self::with_templates(default_templates())
    }

    /// Build a renderer from an explicit table, requiring a template for every
    /// channel type and message kind.
    pub fn with_templates(
        entries: impl IntoIterator<Item = (ChannelType, MessageKind, TemplateFn)>,
    ) -> Result<Self, RenderError> {
        let templates: HashMap<(ChannelType, MessageKind), TemplateFn> = entries
            .into_iter()
            .map(|(channel_type, kind, template)| ((channel_type, kind), template))
            .collect();

        let missing: Vec<String> = ChannelType::ALL
            .iter()
            .flat_map(|&channel_type| {
                MessageKind::ALL
                    .iter()
                    .map(move |&kind| (channel_type, kind))
            })
            .filter(|key| !templates.contains_key(key))
            .map(|(channel_type, kind)| template_key(channel_type, kind))
            .collect();

        if !missing.is_empty() {
            return Err(RenderError::MissingTemplates(missing));
        }

        Ok(Self { templates })
    }

    pub fn render(
        &self,
        channel_type: ChannelType,
        payload: &NotificationPayload,
    ) -> Result<RenderedMessage, RenderError> {
        let template = self
            .templates
            .get(&(channel_type, payload.kind))
            .ok_or(RenderError::TemplateNotFound {
                channel_type,
                kind: payload.kind,
            })?;

        Ok(RenderedMessage {
            subject: subject(payload),
            body: template(payload)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{
        EventSnapshot, GroupSnapshot, PayloadChanges, ResolutionInfo, ServiceSnapshot,
        StatusTransition,
    };
    use beacon_common::types::{EventStatus, ServiceStatus, Severity};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn make_payload(kind: MessageKind, event_type: EventType) -> NotificationPayload {
        let created = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        NotificationPayload {
            kind,
            event: EventSnapshot {
                id: Uuid::nil(),
                title: "API <latency>".to_string(),
                event_type,
                status: EventStatus::Investigating,
                severity: Some(Severity::Major),
                message: "Requests are slow & timing out".to_string(),
                services: vec![ServiceSnapshot {
                    id: Uuid::nil(),
                    name: "Public API".to_string(),
                    status: ServiceStatus::Degraded,
                }],
                groups: vec![GroupSnapshot {
                    id: Uuid::nil(),
                    name: "Core".to_string(),
                }],
                started_at: Some(created),
                scheduled_start_at: None,
                scheduled_end_at: None,
                created_at: created,
            },
            changes: None,
            resolution: None,
            event_url: Some("https://status.example.com/events/1".to_string()),
            generated_at: created,
        }
    }

    #[test]
    fn test_default_templates_cover_every_combination() {
        let renderer = Renderer::new().unwrap();
        for channel_type in ChannelType::ALL {
            for kind in MessageKind::ALL {
                let payload = make_payload(kind, EventType::Incident);
                assert!(renderer.render(channel_type, &payload).is_ok());
            }
        }
    }

    #[test]
    fn test_incomplete_template_table_fails_at_construction() {
        let entries: Vec<_> = default_templates()
            .into_iter()
            .filter(|(channel_type, kind, _)| {
                !(*channel_type == ChannelType::Email && *kind == MessageKind::Update)
            })
            .collect();

        match Renderer::with_templates(entries) {
            Err(RenderError::MissingTemplates(missing)) => {
                assert_eq!(missing, vec!["email_update".to_string()]);
            }
            _ => panic!("expected MissingTemplates"),
        }
    }

    #[test]
    fn test_subject_is_shared_across_channels() {
        let renderer = Renderer::new().unwrap();
        let payload = make_payload(MessageKind::Update, EventType::Incident);
        let subjects: Vec<String> = ChannelType::ALL
            .iter()
            .map(|&ct| renderer.render(ct, &payload).unwrap().subject)
            .collect();
        assert!(subjects.iter().all(|s| s == "Update: API <latency>"));
    }

    #[test]
    fn test_subject_per_kind() {
        let initial = make_payload(MessageKind::Initial, EventType::Incident);
        assert_eq!(subject(&initial), "Incident: API <latency>");
        let maintenance = make_payload(MessageKind::Initial, EventType::Maintenance);
        assert_eq!(subject(&maintenance), "Maintenance: API <latency>");
        let resolved = make_payload(MessageKind::Resolved, EventType::Incident);
        assert_eq!(subject(&resolved), "Resolved: API <latency>");
        let cancelled = make_payload(MessageKind::Cancelled, EventType::Maintenance);
        assert_eq!(subject(&cancelled), "Cancelled: API <latency>");
    }

    #[test]
    fn test_telegram_body_is_html_escaped() {
        let renderer = Renderer::new().unwrap();
        let payload = make_payload(MessageKind::Initial, EventType::Incident);
        let message = renderer.render(ChannelType::Telegram, &payload).unwrap();

        assert!(message.body.contains("<b>New incident: API &lt;latency&gt;</b>"));
        assert!(message.body.contains("slow &amp; timing out"));
        assert!(message.body.contains("<a href=\"https://status.example.com/events/1\">"));
        assert!(message.body.contains("Public API"));
    }

    #[test]
    fn test_email_body_is_plain_text() {
        let renderer = Renderer::new().unwrap();
        let payload = make_payload(MessageKind::Initial, EventType::Incident);
        let message = renderer.render(ChannelType::Email, &payload).unwrap();

        assert!(message.body.contains("API <latency>"));
        assert!(message.body.contains("Severity:  Major"));
        assert!(!message.body.contains("<b>"));
        assert!(message.body.contains("Follow this event: https://status.example.com/events/1"));
    }

    #[test]
    fn test_update_body_lists_changes() {
        let renderer = Renderer::new().unwrap();
        let mut payload = make_payload(MessageKind::Update, EventType::Incident);
        payload.changes = Some(PayloadChanges {
            status: Some(StatusTransition {
                from: EventStatus::Investigating,
                to: EventStatus::Identified,
            }),
            services_added: vec![ServiceSnapshot {
                id: Uuid::nil(),
                name: "Billing".to_string(),
                status: ServiceStatus::PartialOutage,
            }],
            reason: Some("Root cause found".to_string()),
            ..Default::default()
        });

        let email = renderer.render(ChannelType::Email, &payload).unwrap();
        assert!(email.body.contains("Status changed from Investigating to Identified"));
        assert!(email.body.contains("Billing added (Partial outage)"));
        assert!(email.body.contains("Reason: Root cause found"));

        let telegram = renderer.render(ChannelType::Telegram, &payload).unwrap();
        assert!(telegram.body.contains("Investigating \u{2192} Identified"));
    }

    #[test]
    fn test_resolved_body_includes_duration() {
        let renderer = Renderer::new().unwrap();
        let mut payload = make_payload(MessageKind::Resolved, EventType::Incident);
        payload.resolution = Some(ResolutionInfo {
            resolved_at: payload.event.created_at + chrono::Duration::minutes(95),
            duration_seconds: 95 * 60,
            message: Some("Fixed by rollback".to_string()),
        });

        let email = renderer.render(ChannelType::Email, &payload).unwrap();
        assert!(email.body.contains("has been resolved"));
        assert!(email.body.contains("Duration:  1h 35m"));
        assert!(email.body.contains("Fixed by rollback"));
    }

    #[test]
    fn test_webhook_body_is_json_document() {
        let renderer = Renderer::new().unwrap();
        let payload = make_payload(MessageKind::Initial, EventType::Incident);
        let message = renderer.render(ChannelType::Webhook, &payload).unwrap();

        let doc: serde_json::Value = serde_json::from_str(&message.body).unwrap();
        assert_eq!(doc["subject"], "Incident: API <latency>");
        assert_eq!(doc["kind"], "initial");
        assert_eq!(doc["event"]["severity"], "major");
        assert_eq!(doc["event"]["services"][0]["name"], "Public API");
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let renderer = Renderer::new().unwrap();
        let payload = make_payload(MessageKind::Update, EventType::Maintenance);
        for channel_type in ChannelType::ALL {
            let a = renderer.render(channel_type, &payload).unwrap();
            let b = renderer.render(channel_type, &payload).unwrap();
            assert_eq!(a, b);
        }
    }
}
