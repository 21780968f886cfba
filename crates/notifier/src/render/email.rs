//! Plain-text email bodies.

use beacon_common::types::EventType;

use super::format::{
    format_timestamp, service_status_label, severity_label, status_label,
};
use crate::error::RenderError;
use crate::payload::{NotificationPayload, format_duration};

pub fn initial(payload: &NotificationPayload) -> Result<String, RenderError> {
    let event = &payload.event;
    let intro = match event.event_type {
        EventType::Incident => "A new incident has been reported.",
        EventType::Maintenance => "Maintenance has been scheduled.",
    };

    let mut lines = vec![intro.to_string(), String::new(), event.title.clone(), String::new()];
    lines.extend(summary(payload));
    lines.push(String::new());
    lines.push(event.message.clone());
    lines.extend(services(payload));
    lines.extend(footer(payload));
    Ok(lines.join("\n"))
}

pub fn update(payload: &NotificationPayload) -> Result<String, RenderError> {
    let event = &payload.event;
    let mut lines = vec![
        format!("There is a new update on \"{}\".", event.title),
        String::new(),
    ];
    lines.extend(summary(payload));
    lines.push(String::new());
    lines.push(event.message.clone());

    if let Some(changes) = payload.changes.as_ref().filter(|c| !c.is_empty()) {
        lines.push(String::new());
        lines.push("Changes:".to_string());
        if let Some(status) = changes.status {
            lines.push(format!(
                "  - Status changed from {} to {}",
                status_label(status.from),
                status_label(status.to)
            ));
        }
        for service in &changes.services_added {
            lines.push(format!(
                "  - {} added ({})",
                service.name,
                service_status_label(service.status)
            ));
        }
        for service in &changes.services_removed {
            lines.push(format!("  - {} removed", service.name));
        }
        for service in &changes.services_updated {
            lines.push(format!(
                "  - {} changed from {} to {}",
                service.name,
                service_status_label(service.from),
                service_status_label(service.to)
            ));
        }
        if let Some(reason) = &changes.reason {
            lines.push(format!("  Reason: {}", reason));
        }
    }

    lines.extend(services(payload));
    lines.extend(footer(payload));
    Ok(lines.join("\n"))
}

pub fn resolved(payload: &NotificationPayload) -> Result<String, RenderError> {
    closing(payload, "has been resolved")
}

pub fn completed(payload: &NotificationPayload) -> Result<String, RenderError> {
    closing(payload, "has been completed")
}

pub fn cancelled(payload: &NotificationPayload) -> Result<String, RenderError> {
    let event = &payload.event;
    let mut lines = vec![
        format!("The maintenance \"{}\" has been cancelled.", event.title),
        String::new(),
        event.message.clone(),
    ];
    if let Some(start) = event.scheduled_start_at {
        lines.push(String::new());
        lines.push(format!("It was scheduled for {}.", format_timestamp(start)));
    }
    lines.extend(footer(payload));
    Ok(lines.join("\n"))
}

fn closing(payload: &NotificationPayload, verb: &str) -> Result<String, RenderError> {
    let event = &payload.event;
    let mut lines = vec![format!("\"{}\" {}.", event.title, verb)];

    if let Some(resolution) = &payload.resolution {
        lines.push(String::new());
        lines.push(format!(
            "Closed at: {}",
            format_timestamp(resolution.resolved_at)
        ));
        if resolution.duration_seconds > 0 {
            lines.push(format!(
                "Duration:  {}",
                format_duration(resolution.duration_seconds)
            ));
        }
        if let Some(message) = &resolution.message {
            lines.push(String::new());
            lines.push(message.clone());
        }
    }

    lines.extend(services(payload));
    lines.extend(footer(payload));
    Ok(lines.join("\n"))
}

fn summary(payload: &NotificationPayload) -> Vec<String> {
    let event = &payload.event;
    let mut lines = vec![format!("Status:    {}", status_label(event.status))];
    match event.event_type {
        EventType::Incident => {
            lines.push(format!("Severity:  {}", severity_label(event.severity)));
        }
        EventType::Maintenance => {
            if let Some(start) = event.scheduled_start_at {
                lines.push(format!("Starts:    {}", format_timestamp(start)));
            }
            if let Some(end) = event.scheduled_end_at {
                lines.push(format!("Ends:      {}", format_timestamp(end)));
            }
        }
    }
    lines
}

fn services(payload: &NotificationPayload) -> Vec<String> {
    let event = &payload.event;
    let mut lines = Vec::new();
    if !event.services.is_empty() {
        lines.push(String::new());
        lines.push("Affected services:".to_string());
        for service in &event.services {
            lines.push(format!(
                "  - {}: {}",
                service.name,
                service_status_label(service.status)
            ));
        }
    }
    if !event.groups.is_empty() {
        let names: Vec<&str> = event.groups.iter().map(|g| g.name.as_str()).collect();
        lines.push(format!("Groups: {}", names.join(", ")));
    }
    lines
}

fn footer(payload: &NotificationPayload) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(url) = &payload.event_url {
        lines.push(String::new());
        lines.push(format!("Follow this event: {}", url));
    }
    lines.push(String::new());
    lines.push("You receive this email because you subscribed to status updates.".to_string());
    lines
}
