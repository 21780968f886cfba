//! HTML bodies for the Telegram Bot API.

use beacon_common::types::EventType;

use super::format::{
    bold, escape_html, event_type_icon, format_timestamp, join_within, link, service_status_icon,
    service_status_label, severity_icon, severity_label, status_icon, status_label,
};
use crate::error::RenderError;
use crate::payload::{NotificationPayload, format_duration};

/// Telegram `sendMessage` text limit (characters).
pub const MESSAGE_LIMIT: usize = 4096;

pub fn initial(payload: &NotificationPayload) -> Result<String, RenderError> {
    let event = &payload.event;
    let headline = match event.event_type {
        EventType::Incident => "New incident",
        EventType::Maintenance => "Scheduled maintenance",
    };

    let mut lines = vec![
        format!(
            "{} {}",
            event_type_icon(event.event_type),
            bold(&format!("{}: {}", headline, event.title))
        ),
        String::new(),
    ];
    lines.extend(status_lines(payload));
    lines.push(String::new());
    lines.push(escape_html(&event.message));
    lines.extend(services_section(payload));

    Ok(finish(lines, footer(payload)))
}

pub fn update(payload: &NotificationPayload) -> Result<String, RenderError> {
    let event = &payload.event;
    let mut lines = vec![
        format!("\u{1f4e2} {}", bold(&format!("Update: {}", event.title))), // 📢
        String::new(),
    ];
    lines.extend(status_lines(payload));
    lines.push(String::new());
    lines.push(escape_html(&event.message));

    if let Some(changes) = payload.changes.as_ref().filter(|c| !c.is_empty()) {
        lines.push(String::new());
        lines.push(bold("Changes:"));
        if let Some(status) = changes.status {
            lines.push(format!(
                "{} Status: {} \u{2192} {}",
                status_icon(status.to),
                status_label(status.from),
                status_label(status.to)
            ));
        }
        for service in &changes.services_added {
            lines.push(format!(
                "\u{2795} {} ({})",
                escape_html(&service.name),
                service_status_label(service.status)
            ));
        }
        for service in &changes.services_removed {
            lines.push(format!("\u{2796} {}", escape_html(&service.name)));
        }
        for service in &changes.services_updated {
            lines.push(format!(
                "{} {}: {} \u{2192} {}",
                service_status_icon(service.to),
                escape_html(&service.name),
                service_status_label(service.from),
                service_status_label(service.to)
            ));
        }
        if let Some(reason) = &changes.reason {
            lines.push(format!("Reason: {}", escape_html(reason)));
        }
    }

    lines.extend(services_section(payload));
    Ok(finish(lines, footer(payload)))
}

pub fn resolved(payload: &NotificationPayload) -> Result<String, RenderError> {
    closing(payload, "Resolved")
}

pub fn completed(payload: &NotificationPayload) -> Result<String, RenderError> {
    closing(payload, "Maintenance completed")
}

pub fn cancelled(payload: &NotificationPayload) -> Result<String, RenderError> {
    let event = &payload.event;
    let mut lines = vec![
        format!(
            "\u{274c} {}",
            bold(&format!("Maintenance cancelled: {}", event.title))
        ),
        String::new(),
        escape_html(&event.message),
    ];
    if let Some(start) = event.scheduled_start_at {
        lines.push(String::new());
        lines.push(format!("Was scheduled for {}", format_timestamp(start)));
    }
    Ok(finish(lines, footer(payload)))
}

fn closing(payload: &NotificationPayload, headline: &str) -> Result<String, RenderError> {
    let event = &payload.event;
    let mut lines = vec![
        format!("\u{2705} {}", bold(&format!("{}: {}", headline, event.title))),
        String::new(),
    ];

    if let Some(resolution) = &payload.resolution {
        lines.push(format!(
            "Closed at {}",
            format_timestamp(resolution.resolved_at)
        ));
        if resolution.duration_seconds > 0 {
            lines.push(format!(
                "Duration: {}",
                format_duration(resolution.duration_seconds)
            ));
        }
        if let Some(message) = &resolution.message {
            lines.push(String::new());
            lines.push(escape_html(message));
        }
    }

    lines.extend(services_section(payload));
    Ok(finish(lines, footer(payload)))
}

fn status_lines(payload: &NotificationPayload) -> Vec<String> {
    let event = &payload.event;
    let mut lines = vec![format!(
        "{} Status: {}",
        status_icon(event.status),
        bold(status_label(event.status))
    )];
    match event.event_type {
        EventType::Incident => lines.push(format!(
            "{} Severity: {}",
            severity_icon(event.severity),
            bold(severity_label(event.severity))
        )),
        EventType::Maintenance => {
            if let (Some(start), Some(end)) = (event.scheduled_start_at, event.scheduled_end_at) {
                lines.push(format!(
                    "\u{1f552} Window: {} to {}",
                    format_timestamp(start),
                    format_timestamp(end)
                ));
            }
        }
    }
    lines
}

fn services_section(payload: &NotificationPayload) -> Vec<String> {
    let event = &payload.event;
    let mut lines = Vec::new();
    if !event.services.is_empty() {
        lines.push(String::new());
        lines.push(bold("Affected services:"));
        for service in &event.services {
            lines.push(format!(
                "{} {}: {}",
                service_status_icon(service.status),
                escape_html(&service.name),
                service_status_label(service.status)
            ));
        }
    }
    if !event.groups.is_empty() {
        let names: Vec<String> = event.groups.iter().map(|g| escape_html(&g.name)).collect();
        lines.push(format!("Groups: {}", names.join(", ")));
    }
    lines
}

fn footer(payload: &NotificationPayload) -> Vec<String> {
    match &payload.event_url {
        Some(url) => vec![String::new(), link(url, "View on status page")],
        None => Vec::new(),
    }
}

fn finish(lines: Vec<String>, tail: Vec<String>) -> String {
    join_within(&lines, &tail, MESSAGE_LIMIT)
}
