//! Formatting lookups shared by the channel templates.
//!
//! Every lookup is total: values the table does not know map to a neutral
//! default instead of an error.

use chrono::{DateTime, Utc};

use beacon_common::types::{EventStatus, EventType, ServiceStatus, Severity};

/// Marker used for values without a dedicated icon.
pub const DEFAULT_ICON: &str = "\u{2139}\u{fe0f}"; // ℹ️

pub fn event_type_icon(event_type: EventType) -> &'static str {
    match event_type {
        EventType::Incident => "\u{1f6a8}",    // 🚨
        EventType::Maintenance => "\u{1f527}", // 🔧
    }
}

pub fn status_icon(status: EventStatus) -> &'static str {
    match status {
        EventStatus::Investigating => "\u{1f50d}",      // 🔍
        EventStatus::Identified => "\u{1f3af}",         // 🎯
        EventStatus::Monitoring => "\u{1f440}",         // 👀
        EventStatus::Resolved => "\u{2705}",            // ✅
        EventStatus::Scheduled => "\u{1f4c5}",          // 📅
        EventStatus::InProgress => "\u{1f6e0}\u{fe0f}", // 🛠️
        EventStatus::Completed => "\u{2705}",           // ✅
        EventStatus::Cancelled => "\u{274c}",           // ❌
        EventStatus::Unknown => DEFAULT_ICON,
    }
}

pub fn severity_icon(severity: Option<Severity>) -> &'static str {
    match severity {
        Some(Severity::Minor) => "\u{1f7e1}",    // 🟡
        Some(Severity::Major) => "\u{1f7e0}",    // 🟠
        Some(Severity::Critical) => "\u{1f534}", // 🔴
        Some(Severity::Unknown) | None => DEFAULT_ICON,
    }
}

pub fn service_status_icon(status: ServiceStatus) -> &'static str {
    match status {
        ServiceStatus::Operational => "\u{1f7e2}",   // 🟢
        ServiceStatus::Degraded => "\u{1f7e1}",      // 🟡
        ServiceStatus::PartialOutage => "\u{1f7e0}", // 🟠
        ServiceStatus::MajorOutage => "\u{1f534}",   // 🔴
        ServiceStatus::Maintenance => "\u{1f535}",   // 🔵
        ServiceStatus::Unknown => "\u{26aa}",        // ⚪
    }
}

pub fn status_label(status: EventStatus) -> &'static str {
    match status {
        EventStatus::Investigating => "Investigating",
        EventStatus::Identified => "Identified",
        EventStatus::Monitoring => "Monitoring",
        EventStatus::Resolved => "Resolved",
        EventStatus::Scheduled => "Scheduled",
        EventStatus::InProgress => "In progress",
        EventStatus::Completed => "Completed",
        EventStatus::Cancelled => "Cancelled",
        EventStatus::Unknown => "Unknown",
    }
}

pub fn severity_label(severity: Option<Severity>) -> &'static str {
    match severity {
        Some(Severity::Minor) => "Minor",
        Some(Severity::Major) => "Major",
        Some(Severity::Critical) => "Critical",
        Some(Severity::Unknown) | None => "Unknown",
    }
}

pub fn service_status_label(status: ServiceStatus) -> &'static str {
    match status {
        ServiceStatus::Operational => "Operational",
        ServiceStatus::Degraded => "Degraded performance",
        ServiceStatus::PartialOutage => "Partial outage",
        ServiceStatus::MajorOutage => "Major outage",
        ServiceStatus::Maintenance => "Under maintenance",
        ServiceStatus::Unknown => "Unknown",
    }
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M UTC").to_string()
}

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn bold(text: &str) -> String {
    format!("<b>{}</b>", escape_html(text))
}

pub fn link(url: &str, label: &str) -> String {
    format!("<a href=\"{}\">{}</a>", escape_html(url), escape_html(label))
}

const TRUNCATED_MARKER: &str = "\n\n[truncated]";

/// Join HTML lines into at most `limit` characters, always keeping `tail`.
///
/// Each line must be balanced on its own. When the body does not fit, lines
/// are kept whole until the budget runs out; a final line without markup is
/// cut short, never inside an entity, and a line with markup is dropped.
pub fn join_within(lines: &[String], tail: &[String], limit: usize) -> String {
    let tail_text: String = tail.iter().map(|line| format!("\n{line}")).collect();
    let full = format!("{}{}", lines.join("\n"), tail_text);
    if full.chars().count() <= limit {
        return full;
    }

    let budget = limit
        .saturating_sub(tail_text.chars().count())
        .saturating_sub(TRUNCATED_MARKER.chars().count());
    let mut body = String::new();
    let mut used = 0;

    for (i, line) in lines.iter().enumerate() {
        let sep = usize::from(i > 0);
        let len = line.chars().count();
        if used + sep + len <= budget {
            if sep == 1 {
                body.push('\n');
            }
            body.push_str(line);
            used += sep + len;
            continue;
        }

        let remaining = budget.saturating_sub(used + sep);
        if remaining > 0 && !line.contains('<') {
            if sep == 1 {
                body.push('\n');
            }
            body.push_str(&cut_escaped(line, remaining));
        }
        break;
    }

    format!("{body}{TRUNCATED_MARKER}{tail_text}")
}

/// First `limit` characters of escaped text, backing off before a split entity.
fn cut_escaped(text: &str, limit: usize) -> String {
    let mut cut: String = text.chars().take(limit).collect();
    if let Some(amp) = cut.rfind('&') {
        if !cut[amp..].contains(';') {
            cut.truncate(amp);
        }
    }
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_values_use_default_marker() {
        assert_eq!(status_icon(EventStatus::Unknown), DEFAULT_ICON);
        assert_eq!(severity_icon(None), DEFAULT_ICON);
        assert_eq!(severity_icon(Some(Severity::Unknown)), DEFAULT_ICON);
        assert_eq!(severity_label(None), "Unknown");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<script>\"a\" & b</script>"),
            "&lt;script&gt;&quot;a&quot; &amp; b&lt;/script&gt;"
        );
    }

    #[test]
    fn test_bold_and_link_escape_content() {
        assert_eq!(bold("a<b"), "<b>a&lt;b</b>");
        assert_eq!(
            link("https://status.example.com/?a=1&b=2", "View"),
            "<a href=\"https://status.example.com/?a=1&amp;b=2\">View</a>"
        );
    }

    #[test]
    fn test_join_within_fits() {
        let lines = vec!["a".to_string(), "b".to_string()];
        let tail = vec![String::new(), link("https://x", "View")];
        assert_eq!(
            join_within(&lines, &tail, 100),
            "a\nb\n\n<a href=\"https://x\">View</a>"
        );
    }

    #[test]
    fn test_join_within_keeps_tail_and_limit() {
        let lines = vec![bold("Title"), "a".repeat(5000)];
        let tail = vec![String::new(), link("https://status.example.com/events/1", "View")];
        let joined = join_within(&lines, &tail, 4096);

        assert!(joined.chars().count() <= 4096);
        assert!(joined.starts_with("<b>Title</b>\n"));
        assert!(joined.contains("[truncated]"));
        assert!(joined.ends_with("View</a>"));
    }

    #[test]
    fn test_join_within_never_splits_entities() {
        for pad in 0..8 {
            let text = escape_html(&format!("{}{}", "a".repeat(90 + pad), "&".repeat(20)));
            let joined = join_within(&[text], &[], 120);
            let body = joined.trim_end_matches(TRUNCATED_MARKER);
            assert_eq!(body.matches('&').count(), body.matches("&amp;").count());
        }
    }

    #[test]
    fn test_join_within_drops_markup_line_that_does_not_fit() {
        let lines = vec!["a".repeat(50), bold(&"b".repeat(100))];
        let joined = join_within(&lines, &[], 80);
        assert_eq!(joined, format!("{}{}", "a".repeat(50), TRUNCATED_MARKER));
    }
}
