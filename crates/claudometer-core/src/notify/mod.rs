//! Threshold notifications: deduplication, content and delivery.

pub mod message;
pub mod notifier;
pub mod sink;
pub mod thresholds;

pub use message::{auth_expired_notification, format_relative_time, threshold_notification};
pub use notifier::{ThresholdCrossing, ThresholdNotifier};
pub use sink::{DesktopSink, LogSink, Notification, NotificationSink};
pub use thresholds::{is_urgent, Thresholds, DEFAULT_THRESHOLDS};
