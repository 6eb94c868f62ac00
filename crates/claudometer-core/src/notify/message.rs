//! Notification content.

use chrono::{DateTime, Utc};

use super::notifier::ThresholdCrossing;
use super::sink::Notification;

/// Page opened when a notification is clicked
pub const CLAUDE_URL: &str = "https://claude.ai";

/// Build the notification for a threshold crossing
pub fn threshold_notification(crossing: &ThresholdCrossing, now: DateTime<Utc>) -> Notification {
    let percent = crossing.utilization as u32;
    let period_name = crossing.period.display_name();

    let body = match crossing.resets_at {
        Some(resets_at) => format!(
            "{} limit at {}%\nResets {}",
            period_name,
            percent,
            format_relative_time(Some(resets_at), now)
        ),
        None => format!("{} limit at {}%", period_name, percent),
    };

    Notification {
        title: format!("Claude Usage: {}%", percent),
        body,
        urgent: crossing.is_urgent(),
        link: Some(CLAUDE_URL.to_string()),
    }
}

/// Build the one-shot notification sent when the session cookie expires
pub fn auth_expired_notification() -> Notification {
    Notification {
        title: "Claude Monitor: Auth Error".to_string(),
        body: "Session cookie expired. Please update your cookie in the config file.".to_string(),
        urgent: true,
        link: Some(CLAUDE_URL.to_string()),
    }
}

/// Format a reset time relative to `now`, e.g. `in 2h 15m`.
///
/// Minutes are only shown when the reset is less than a day away.
pub fn format_relative_time(resets_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(resets_at) = resets_at else {
        return "unknown".to_string();
    };

    let total_seconds = (resets_at - now).num_seconds();
    if total_seconds <= 0 {
        return "now".to_string();
    }

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3_600;
    let minutes = (total_seconds % 3_600) / 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{}d", days));
    }
    if hours > 0 {
        parts.push(format!("{}h", hours));
    }
    if minutes > 0 && days == 0 {
        parts.push(format!("{}m", minutes));
    }

    if parts.is_empty() {
        return "< 1m".to_string();
    }
    format!("in {}", parts.join(" "))
}
