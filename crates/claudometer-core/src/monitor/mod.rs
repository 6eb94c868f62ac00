//! Scheduled polling with backoff, and the status it publishes.

pub mod backoff;
pub mod poller;
pub mod render;
pub mod status;

pub use backoff::{Backoff, ErrorState};
pub use poller::Poller;
pub use render::{IconSpec, LogRenderer, Rgb, StatusRenderer, TrayView};
pub use status::{status_channel, MonitorStatus, PollPhase, StatusReceiver, StatusSender};
