//! Notification delivery.
//!
//! Delivery is best-effort: a sink reports success as a `bool` and logs its
//! own failures, so a broken notification daemon never disturbs polling.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::{error, info};

/// Application name shown by the desktop notification daemon
pub const APP_NAME: &str = "Claudometer";

/// Upper bound on one run of the platform notification tool
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// A desktop notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// Louder and longer-lived
    pub urgent: bool,
    /// Page to open for details, appended to the delivered body
    pub link: Option<String>,
}

impl Notification {
    /// Body text as delivered, with the link on its own last line
    pub fn full_body(&self) -> String {
        match &self.link {
            Some(link) => format!("{}\n{}", self.body, link),
            None => self.body.clone(),
        }
    }
}

/// Something that can show a notification to the user
pub trait NotificationSink: Send + Sync {
    /// Deliver a notification; returns false if delivery failed
    fn notify(&self, notification: &Notification) -> bool;
}

/// Sink that only writes notifications to the log
#[derive(Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, notification: &Notification) -> bool {
        info!(
            urgent = notification.urgent,
            link = notification.link.as_deref().unwrap_or(""),
            "[NOTIFY] {}: {}",
            notification.title,
            notification.body.replace('\n', " | ")
        );
        true
    }
}

/// Sink that shells out to the platform notification tool
/// (`notify-send` on Linux, `osascript` on macOS).
///
/// The tool runs on its own task with a timeout, so a hung daemon never
/// holds up the poll that raised the notification.
#[derive(Debug)]
pub struct DesktopSink {
    timeout: Duration,
}

impl Default for DesktopSink {
    fn default() -> Self {
        Self::new()
    }
}

impl DesktopSink {
    /// Create a desktop sink
    pub fn new() -> Self {
        Self {
            timeout: DELIVERY_TIMEOUT,
        }
    }

    /// Override the per-notification timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check whether the platform notification tool can be found
    pub async fn is_available() -> bool {
        // osascript ships with every macOS install
        if cfg!(target_os = "macos") {
            return true;
        }
        let mut command = Command::new("notify-send");
        command.arg("--version").kill_on_drop(true);
        matches!(
            tokio::time::timeout(Duration::from_secs(2), command.output()).await,
            Ok(Ok(output)) if output.status.success()
        )
    }
}

impl NotificationSink for DesktopSink {
    /// Returns true once delivery is dispatched; failures are logged later
    fn notify(&self, notification: &Notification) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!("Failed to send notification: no async runtime");
            return false;
        };

        let command = build_command(notification);
        let title = notification.title.clone();
        let timeout = self.timeout;
        runtime.spawn(async move {
            match run_command(command, timeout).await {
                Ok(()) => info!("Notification sent: {}", title),
                Err(e) => error!("Failed to send notification: {:#}", e),
            }
        });
        true
    }
}

/// Run a notification command, killing it if it outlives `timeout`
async fn run_command(mut command: Command, timeout: Duration) -> Result<()> {
    command.kill_on_drop(true);
    let output = tokio::time::timeout(timeout, command.output())
        .await
        .map_err(|_| anyhow::anyhow!("notification command timed out after {:?}", timeout))?
        .context("Failed to execute notification command")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("notification command failed: {}", stderr.trim());
    }
    Ok(())
}

/// Build the platform command for a notification
#[cfg(target_os = "macos")]
fn build_command(notification: &Notification) -> Command {
    let mut script = format!(
        "display notification \"{}\" with title \"{}\"",
        escape_applescript(&notification.full_body()),
        escape_applescript(&notification.title)
    );
    if notification.urgent {
        script.push_str(" sound name \"default\"");
    }
    let mut command = Command::new("osascript");
    command.args(["-e", &script]);
    command
}

/// Build the platform command for a notification
#[cfg(not(target_os = "macos"))]
fn build_command(notification: &Notification) -> Command {
    let (urgency, expire_ms) = if notification.urgent {
        ("critical", "25000")
    } else {
        ("normal", "7000")
    };
    let mut command = Command::new("notify-send");
    command
        .args(["--app-name", APP_NAME])
        .args(["--urgency", urgency])
        .args(["--expire-time", expire_ms])
        .arg(&notification.title)
        .arg(notification.full_body());
    command
}

#[cfg(target_os = "macos")]
fn escape_applescript(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
