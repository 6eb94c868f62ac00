//! Published monitor status.
//!
//! The error state and the last good snapshot travel together in one
//! immutable [`MonitorStatus`] value behind a `watch` channel, so a reader
//! never sees a snapshot paired with a stale error state.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::backoff::ErrorState;
use crate::usage::UsageSnapshot;

/// Sender for monitor status updates
pub type StatusSender = watch::Sender<MonitorStatus>;
/// Receiver for monitor status updates
pub type StatusReceiver = watch::Receiver<MonitorStatus>;

/// Create a watch channel for monitor status
pub fn status_channel() -> (StatusSender, StatusReceiver) {
    watch::channel(MonitorStatus::default())
}

/// Where the scheduled poll loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollPhase {
    #[default]
    Idle,
    Polling,
    Sleeping,
    Stopped,
}

/// Everything the renderer needs after a poll
#[derive(Debug, Clone, Default)]
pub struct MonitorStatus {
    /// Last successfully fetched snapshot (kept while in error)
    pub snapshot: Option<Arc<UsageSnapshot>>,
    /// Active error state; takes rendering priority over `snapshot`
    pub error: ErrorState,
    /// Message of the last failure
    pub last_error: Option<String>,
    /// Server-advertised cooldown from the last 429
    pub retry_after: Option<Duration>,
    /// Consecutive network/generic failures
    pub consecutive_failures: u32,
    /// Scheduled loop phase
    pub phase: PollPhase,
    /// When the last poll completed
    pub updated_at: Option<DateTime<Utc>>,
    /// Number of completed polls
    pub completed_polls: u64,
}

impl MonitorStatus {
    /// True before the first poll completes
    pub fn is_loading(&self) -> bool {
        self.completed_polls == 0
    }
}
