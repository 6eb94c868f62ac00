//! MonitorCore, the Facade entry-point for hosts (console, tray, tests).
//!
//! This struct owns the poller and the threshold notifier and exposes
//! high-level methods. Hosts never need to acquire locks or wire services
//! themselves.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::monitor::{ErrorState, IconSpec, MonitorStatus, Poller, StatusReceiver, TrayView};
use crate::notify::{ThresholdCrossing, ThresholdNotifier, Thresholds};
use crate::usage::{Period, UsageSnapshot};

/// The Facade that wraps all claudometer-core services.
///
/// Constructed via [`MonitorCoreBuilder`](super::builder::MonitorCoreBuilder).
pub struct MonitorCore {
    /// Application settings
    settings: Arc<Settings>,
    /// Scheduled poller
    poller: Arc<Poller>,
    /// Shared with the poller
    notifier: Arc<Mutex<ThresholdNotifier>>,
    /// Icon and tooltip model
    view: TrayView,
    /// Handle of the running poll loop
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl MonitorCore {
    /// Create a new MonitorCore instance (prefer `MonitorCoreBuilder`)
    pub(crate) fn new(
        settings: Arc<Settings>,
        poller: Arc<Poller>,
        notifier: Arc<Mutex<ThresholdNotifier>>,
    ) -> Self {
        let view = TrayView::new(settings.notification_periods.iter().cloned());
        Self {
            settings,
            poller,
            notifier,
            view,
            handle: Mutex::new(None),
        }
    }

    /// Access application settings (read-only)
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    // =========================================================
    // Lifecycle
    // =========================================================

    /// Start the scheduled poll loop; false if it is already running.
    ///
    /// A loop that was stopped but has not yet exited is aborted first, so
    /// it cannot resume once the running flag is set again.
    pub fn start(&self) -> bool {
        let mut handle = self.handle.lock();
        if let Some(old) = handle.take() {
            if !old.is_finished() {
                if self.poller.is_running() {
                    warn!("Monitor already running");
                    *handle = Some(old);
                    return false;
                }
                debug!("Aborting stopped poll loop before restart");
                old.abort();
            }
        }
        *handle = Some(self.poller.start());
        true
    }

    /// Signal the poll loop to stop without waiting
    pub fn stop(&self) {
        self.poller.stop();
    }

    /// Whether the poll loop is active
    pub fn is_running(&self) -> bool {
        self.poller.is_running()
    }

    /// Stop and wait up to `grace` for the loop to exit.
    ///
    /// Returns false if the loop had to be aborted.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.stop();
        let handle = self.handle.lock().take();
        let Some(mut handle) = handle else {
            return true;
        };

        match tokio::time::timeout(grace, &mut handle).await {
            Ok(_) => {
                info!("Monitor shut down");
                true
            }
            Err(_) => {
                warn!(
                    grace_ms = grace.as_millis() as u64,
                    "Poll loop did not stop in time, aborting"
                );
                handle.abort();
                false
            }
        }
    }

    // =========================================================
    // Polling
    // =========================================================

    /// Poll now on a separate task; may overlap a scheduled poll
    pub fn trigger_manual_refresh(&self) -> JoinHandle<ErrorState> {
        self.poller.trigger_manual_refresh()
    }

    /// Poll once on the caller's task
    pub async fn poll_now(&self) -> ErrorState {
        self.poller.poll_once().await
    }

    // =========================================================
    // Notifications
    // =========================================================

    /// Run the threshold notifier on a snapshot and return new crossings
    pub fn evaluate(&self, snapshot: &UsageSnapshot) -> Vec<ThresholdCrossing> {
        self.notifier.lock().evaluate(snapshot)
    }

    /// Replace thresholds; every period's crossing history is cleared
    pub fn update_thresholds(&self, thresholds: Thresholds) {
        self.notifier.lock().update_thresholds(thresholds);
    }

    /// Current thresholds
    pub fn thresholds(&self) -> Thresholds {
        self.notifier.lock().thresholds().clone()
    }

    /// Clear crossing history for one period, or all with `None`
    pub fn reset_notifications(&self, period: Option<&Period>) {
        self.notifier.lock().reset(period);
    }

    // =========================================================
    // Status
    // =========================================================

    /// Latest published status
    pub fn status(&self) -> MonitorStatus {
        self.poller.status()
    }

    /// Subscribe to status updates
    pub fn subscribe(&self) -> StatusReceiver {
        self.poller.subscribe()
    }

    /// Tooltip text for the current status
    pub fn tooltip(&self) -> String {
        self.view.tooltip(&self.status(), Utc::now())
    }

    /// Icon descriptor for the current status
    pub fn icon(&self) -> IconSpec {
        self.view.icon(&self.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::{FetchError, FetchFuture, PeriodUsage, UsageFetcher};

    struct FixedFetcher(Result<UsageSnapshot, FetchError>);

    impl UsageFetcher for FixedFetcher {
        fn fetch_usage(&self) -> FetchFuture<'_> {
            let result = self.0.clone();
            Box::pin(async move { result })
        }
    }

    fn core_with(result: Result<UsageSnapshot, FetchError>) -> MonitorCore {
        let settings = Arc::new(Settings::default());
        let notifier = Arc::new(Mutex::new(ThresholdNotifier::default()));
        let poller = Poller::new(
            Arc::new(FixedFetcher(result)),
            notifier.clone(),
            Duration::from_secs(300),
        );
        MonitorCore::new(settings, Arc::new(poller), notifier)
    }

    fn snapshot(five_hour: f64) -> UsageSnapshot {
        UsageSnapshot::from_periods([(Period::FiveHour, Some(PeriodUsage::new(five_hour, None)))])
    }

    #[test]
    fn test_evaluate_and_reset() {
        let core = core_with(Ok(UsageSnapshot::default()));
        assert_eq!(core.evaluate(&snapshot(95.0)).len(), 3);
        assert!(core.evaluate(&snapshot(95.0)).is_empty());

        core.reset_notifications(Some(&Period::FiveHour));
        assert_eq!(core.evaluate(&snapshot(95.0)).len(), 3);

        core.reset_notifications(None);
        assert_eq!(core.evaluate(&snapshot(60.0)).len(), 1);
    }

    #[test]
    fn test_update_thresholds() {
        let core = core_with(Ok(UsageSnapshot::default()));
        core.evaluate(&snapshot(80.0));
        core.update_thresholds(Thresholds::new([70u8]));
        assert_eq!(core.thresholds().as_slice(), &[70]);
        assert_eq!(core.evaluate(&snapshot(80.0)).len(), 1);
    }

    #[tokio::test]
    async fn test_poll_now_updates_tooltip() {
        let core = core_with(Ok(snapshot(42.0)));
        assert_eq!(core.icon(), IconSpec::Loading);

        assert_eq!(core.poll_now().await, ErrorState::None);
        assert!(core.tooltip().contains("5-hour:  42% [OK]"));
        assert_eq!(core.icon().label(), "42%");
    }

    #[tokio::test]
    async fn test_start_twice_and_shutdown() {
        let core = core_with(Err(FetchError::Auth { status: 401 }));
        assert!(core.start());
        assert!(!core.start());
        assert!(core.is_running());

        assert!(core.shutdown(Duration::from_secs(3)).await);
        assert!(!core.is_running());
        // Nothing left to wait for
        assert!(core.shutdown(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_restart_right_after_stop() {
        let core = core_with(Err(FetchError::Auth { status: 401 }));
        let mut rx = core.subscribe();
        assert!(core.start());
        while rx.borrow_and_update().completed_polls == 0 {
            rx.changed().await.expect("sender alive");
        }

        // The old loop is still inside its sleep tick
        core.stop();
        assert!(!core.is_running());
        assert!(core.start());
        assert!(core.is_running());
        assert!(!core.start());

        assert!(core.shutdown(Duration::from_secs(3)).await);
        assert!(!core.is_running());
    }
}
