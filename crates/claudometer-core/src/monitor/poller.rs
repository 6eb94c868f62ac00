use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::backoff::{Backoff, ErrorState};
use super::render::{LogRenderer, StatusRenderer};
use super::status::{status_channel, MonitorStatus, PollPhase, StatusReceiver, StatusSender};
use crate::notify::{
    auth_expired_notification, threshold_notification, LogSink, NotificationSink,
    ThresholdNotifier,
};
use crate::usage::{FetchError, UsageFetcher};

/// Granularity of the interruptible sleep
const SLEEP_TICK: Duration = Duration::from_secs(1);

/// Scheduled usage poller.
///
/// Owns the backoff loop and publishes every poll outcome as a new
/// [`MonitorStatus`]. Manual refreshes run [`Poller::poll_once`] on their own
/// task and may overlap a scheduled poll; whichever completes last wins.
pub struct Poller {
    fetcher: Arc<dyn UsageFetcher>,
    notifier: Arc<Mutex<ThresholdNotifier>>,
    sink: Arc<dyn NotificationSink>,
    renderer: Arc<dyn StatusRenderer>,
    status_tx: StatusSender,
    running: AtomicBool,
    base_interval: Duration,
}

impl Poller {
    /// Create a new poller
    pub fn new(
        fetcher: Arc<dyn UsageFetcher>,
        notifier: Arc<Mutex<ThresholdNotifier>>,
        base_interval: Duration,
    ) -> Self {
        let (status_tx, _) = status_channel();
        Self {
            fetcher,
            notifier,
            sink: Arc::new(LogSink),
            renderer: Arc::new(LogRenderer::default()),
            status_tx,
            running: AtomicBool::new(false),
            base_interval,
        }
    }

    /// Set the notification sink
    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Set the status renderer
    pub fn with_renderer(mut self, renderer: Arc<dyn StatusRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Base interval between healthy polls
    pub fn base_interval(&self) -> Duration {
        self.base_interval
    }

    /// Whether the scheduled loop is active
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current published status
    pub fn status(&self) -> MonitorStatus {
        self.status_tx.borrow().clone()
    }

    /// Subscribe to status updates
    pub fn subscribe(&self) -> StatusReceiver {
        self.status_tx.subscribe()
    }

    /// Start the scheduled loop in a background task
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        let poller = Arc::clone(self);
        tokio::spawn(async move {
            poller.run().await;
        })
    }

    /// Ask the loop to exit; it notices within one sleep tick
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Stopping usage poller");
        }
    }

    /// Poll immediately on a separate task, outside the schedule
    pub fn trigger_manual_refresh(self: &Arc<Self>) -> JoinHandle<ErrorState> {
        info!("Manual refresh requested");
        let poller = Arc::clone(self);
        tokio::spawn(async move { poller.poll_once().await })
    }

    /// Run the polling loop until stopped
    async fn run(self: Arc<Self>) {
        info!(
            interval_secs = self.base_interval.as_secs(),
            "Usage poller started"
        );
        let mut backoff = Backoff::new();

        self.set_phase(PollPhase::Polling);
        self.poll_once().await;

        while self.is_running() {
            let state = self.status_tx.borrow().error;
            let sleep = backoff.next_sleep(state, self.base_interval);
            debug!(
                error = state.as_str(),
                sleep_secs = sleep.as_secs(),
                multiplier = backoff.multiplier(),
                "Next poll scheduled"
            );

            self.set_phase(PollPhase::Sleeping);
            if !sleep_while_running(&self.running, sleep).await {
                break;
            }

            self.set_phase(PollPhase::Polling);
            self.poll_once().await;
        }

        self.set_phase(PollPhase::Stopped);
        info!("Usage poller stopped");
    }

    /// Fetch once and publish the outcome.
    ///
    /// Success forwards the snapshot to the notifier; failures never touch
    /// the notifier's crossing history.
    pub async fn poll_once(&self) -> ErrorState {
        match self.fetcher.fetch_usage().await {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                debug!(
                    periods = snapshot.present().count(),
                    "Fetched usage snapshot"
                );

                self.publish(|status| {
                    status.snapshot = Some(Arc::clone(&snapshot));
                    status.error = ErrorState::None;
                    status.last_error = None;
                    status.retry_after = None;
                    status.consecutive_failures = 0;
                });

                let crossings = self.notifier.lock().evaluate(&snapshot);
                let now = Utc::now();
                for crossing in &crossings {
                    info!(
                        period = %crossing.period,
                        threshold = crossing.threshold,
                        utilization = crossing.utilization,
                        "Usage threshold crossed"
                    );
                    self.sink.notify(&threshold_notification(crossing, now));
                }
                ErrorState::None
            }
            Err(err) => {
                let state = ErrorState::from(&err);
                log_fetch_error(&err);

                let mut entered_auth = false;
                self.publish(|status| {
                    entered_auth =
                        state == ErrorState::AuthExpired && status.error != ErrorState::AuthExpired;
                    status.error = state;
                    status.last_error = Some(err.to_string());
                    status.retry_after = match &err {
                        FetchError::RateLimited { retry_after_secs } => {
                            Some(Duration::from_secs(*retry_after_secs))
                        }
                        _ => None,
                    };
                    if state.is_transient() {
                        status.consecutive_failures += 1;
                    }
                });

                if entered_auth {
                    self.sink.notify(&auth_expired_notification());
                }
                state
            }
        }
    }

    /// Apply a poll outcome atomically, then render the result
    fn publish<F>(&self, apply: F)
    where
        F: FnOnce(&mut MonitorStatus),
    {
        self.status_tx.send_modify(|status| {
            apply(status);
            status.updated_at = Some(Utc::now());
            status.completed_polls += 1;
        });
        let status = self.status_tx.borrow().clone();
        self.renderer.render(&status);
    }

    fn set_phase(&self, phase: PollPhase) {
        self.status_tx.send_if_modified(|status| {
            if status.phase == phase {
                return false;
            }
            status.phase = phase;
            true
        });
    }
}

fn log_fetch_error(err: &FetchError) {
    match err {
        FetchError::Auth { .. } => error!("Authentication failed: {}", err),
        FetchError::RateLimited { .. } => warn!("{}", err),
        FetchError::Network(_) => warn!("{}", err),
        FetchError::Api(_) => error!("{}", err),
    }
}

/// Sleep in short ticks, returning false as soon as `running` clears
async fn sleep_while_running(running: &AtomicBool, total: Duration) -> bool {
    let mut remaining = total;
    while !remaining.is_zero() {
        if !running.load(Ordering::SeqCst) {
            return false;
        }
        let step = remaining.min(SLEEP_TICK);
        tokio::time::sleep(step).await;
        remaining -= step;
    }
    running.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Notification;
    use crate::usage::{FetchFuture, Period, PeriodUsage, UsageSnapshot};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    type Scripted = (Duration, Result<UsageSnapshot, FetchError>);

    /// Fetcher replaying a script, then returning an empty snapshot
    struct ScriptedFetcher {
        script: Mutex<VecDeque<Scripted>>,
        calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn new<I>(results: I) -> Self
        where
            I: IntoIterator<Item = Result<UsageSnapshot, FetchError>>,
        {
            Self::with_delays(results.into_iter().map(|r| (Duration::ZERO, r)))
        }

        fn with_delays<I>(script: I) -> Self
        where
            I: IntoIterator<Item = Scripted>,
        {
            Self {
                script: Mutex::new(script.into_iter().collect()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl UsageFetcher for ScriptedFetcher {
        fn fetch_usage(&self) -> FetchFuture<'_> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (delay, result) = self
                .script
                .lock()
                .pop_front()
                .unwrap_or((Duration::ZERO, Ok(UsageSnapshot::default())));
            Box::pin(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                result
            })
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Notification>>,
    }

    impl RecordingSink {
        fn titles(&self) -> Vec<String> {
            self.sent.lock().iter().map(|n| n.title.clone()).collect()
        }
    }

    impl NotificationSink for RecordingSink {
        fn notify(&self, notification: &Notification) -> bool {
            self.sent.lock().push(notification.clone());
            true
        }
    }

    #[derive(Default)]
    struct RecordingRenderer {
        seen: Mutex<Vec<ErrorState>>,
    }

    impl StatusRenderer for RecordingRenderer {
        fn render(&self, status: &MonitorStatus) {
            self.seen.lock().push(status.error);
        }
    }

    fn usage(five_hour: f64) -> Result<UsageSnapshot, FetchError> {
        Ok(UsageSnapshot::from_periods([
            (Period::FiveHour, Some(PeriodUsage::new(five_hour, None))),
            (Period::SevenDay, None),
        ]))
    }

    fn network() -> Result<UsageSnapshot, FetchError> {
        Err(FetchError::Network("connection refused".to_string()))
    }

    fn auth() -> Result<UsageSnapshot, FetchError> {
        Err(FetchError::Auth { status: 401 })
    }

    struct Harness {
        poller: Arc<Poller>,
        fetcher: Arc<ScriptedFetcher>,
        notifier: Arc<Mutex<ThresholdNotifier>>,
        sink: Arc<RecordingSink>,
        renderer: Arc<RecordingRenderer>,
    }

    fn harness(fetcher: ScriptedFetcher, interval: Duration) -> Harness {
        let fetcher = Arc::new(fetcher);
        let notifier = Arc::new(Mutex::new(ThresholdNotifier::default()));
        let sink = Arc::new(RecordingSink::default());
        let renderer = Arc::new(RecordingRenderer::default());
        let poller = Poller::new(fetcher.clone(), notifier.clone(), interval)
            .with_sink(sink.clone())
            .with_renderer(renderer.clone());
        Harness {
            poller: Arc::new(poller),
            fetcher,
            notifier,
            sink,
            renderer,
        }
    }

    #[tokio::test]
    async fn test_success_publishes_and_notifies() {
        let h = harness(ScriptedFetcher::new([usage(80.0)]), Duration::from_secs(300));

        assert_eq!(h.poller.poll_once().await, ErrorState::None);

        let status = h.poller.status();
        assert_eq!(status.error, ErrorState::None);
        assert_eq!(status.completed_polls, 1);
        let snapshot = status.snapshot.expect("snapshot published");
        assert_eq!(
            snapshot.get(&Period::FiveHour).map(|u| u.utilization),
            Some(80.0)
        );
        assert_eq!(
            h.sink.titles(),
            vec!["Claude Usage: 80%".to_string(), "Claude Usage: 80%".to_string()]
        );
        assert_eq!(h.renderer.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_error_keeps_snapshot_and_skips_notifier() {
        let h = harness(
            ScriptedFetcher::new([usage(60.0), network(), usage(60.0)]),
            Duration::from_secs(300),
        );

        h.poller.poll_once().await;
        assert_eq!(h.sink.titles().len(), 1);

        assert_eq!(h.poller.poll_once().await, ErrorState::NetworkError);
        let status = h.poller.status();
        assert_eq!(status.error, ErrorState::NetworkError);
        assert!(status.snapshot.is_some());
        assert_eq!(status.consecutive_failures, 1);
        assert!(status
            .last_error
            .as_deref()
            .is_some_and(|e| e.contains("connection refused")));
        assert_eq!(h.notifier.lock().notified_for(&Period::FiveHour), vec![50]);

        // Back to healthy: no duplicate notification for the same episode
        h.poller.poll_once().await;
        assert_eq!(h.sink.titles().len(), 1);
        let status = h.poller.status();
        assert_eq!(status.error, ErrorState::None);
        assert_eq!(status.consecutive_failures, 0);

        assert_eq!(
            *h.renderer.seen.lock(),
            vec![
                ErrorState::None,
                ErrorState::NetworkError,
                ErrorState::None
            ]
        );
    }

    #[tokio::test]
    async fn test_auth_notification_once_per_transition() {
        let h = harness(
            ScriptedFetcher::new([auth(), auth(), usage(10.0), auth()]),
            Duration::from_secs(300),
        );

        h.poller.poll_once().await;
        h.poller.poll_once().await;
        assert_eq!(h.sink.titles(), vec!["Claude Monitor: Auth Error".to_string()]);

        h.poller.poll_once().await;
        h.poller.poll_once().await;
        assert_eq!(h.sink.titles().len(), 2);
        assert_eq!(h.poller.status().error, ErrorState::AuthExpired);
    }

    #[tokio::test]
    async fn test_rate_limit_records_retry_after() {
        let h = harness(
            ScriptedFetcher::new([Err(FetchError::RateLimited {
                retry_after_secs: 240,
            })]),
            Duration::from_secs(300),
        );

        assert_eq!(h.poller.poll_once().await, ErrorState::RateLimited);
        let status = h.poller.status();
        assert_eq!(status.retry_after, Some(Duration::from_secs(240)));
        assert_eq!(status.consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_follows_backoff_schedule() {
        let h = harness(
            ScriptedFetcher::new([network(), network(), usage(10.0)]),
            Duration::from_secs(300),
        );
        let handle = h.poller.start();

        // Initial poll, then 300s (x1) before the second
        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(h.fetcher.calls(), 2);

        // Second failure sleeps 600s (x2)
        tokio::time::sleep(Duration::from_secs(549)).await;
        assert_eq!(h.fetcher.calls(), 2);
        tokio::time::sleep(Duration::from_secs(55)).await;
        assert_eq!(h.fetcher.calls(), 3);
        assert_eq!(h.poller.status().error, ErrorState::None);

        h.poller.stop();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop exits within a tick")
            .expect("loop task does not panic");
        assert_eq!(h.poller.status().phase, PollPhase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_waits_fixed_interval() {
        let h = harness(
            ScriptedFetcher::new([
                Err(FetchError::RateLimited {
                    retry_after_secs: 600,
                }),
                usage(10.0),
            ]),
            Duration::from_secs(300),
        );
        let handle = h.poller.start();

        tokio::time::sleep(Duration::from_secs(119)).await;
        assert_eq!(h.fetcher.calls(), 1);
        assert_eq!(h.poller.status().retry_after, Some(Duration::from_secs(600)));

        // 120s regardless of the advertised Retry-After
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(h.fetcher.calls(), 2);
        assert_eq!(h.poller.status().error, ErrorState::None);

        h.poller.stop();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop exits within a tick")
            .expect("loop task does not panic");
    }

    #[tokio::test]
    async fn test_stop_interrupts_long_sleep() {
        let h = harness(ScriptedFetcher::new([auth()]), Duration::from_secs(300));
        let mut rx = h.poller.subscribe();
        let handle = h.poller.start();
        assert!(h.poller.is_running());

        // Wait for the first poll to publish; the loop then sleeps 3600s
        while rx.borrow_and_update().completed_polls == 0 {
            rx.changed().await.expect("sender alive");
        }

        h.poller.stop();
        assert!(!h.poller.is_running());
        tokio::time::timeout(Duration::from_secs(3), handle)
            .await
            .expect("loop exits promptly")
            .expect("loop task does not panic");
        assert_eq!(h.fetcher.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_refresh_last_completion_wins() {
        let h = harness(
            ScriptedFetcher::with_delays([
                (Duration::from_millis(200), usage(10.0)),
                (Duration::ZERO, usage(20.0)),
            ]),
            Duration::from_secs(300),
        );

        let slow = h.poller.trigger_manual_refresh();
        tokio::task::yield_now().await;
        let fast = h.poller.trigger_manual_refresh();

        assert_eq!(fast.await.expect("refresh task"), ErrorState::None);
        assert_eq!(slow.await.expect("refresh task"), ErrorState::None);

        let status = h.poller.status();
        assert_eq!(status.completed_polls, 2);
        let snapshot = status.snapshot.expect("snapshot published");
        assert_eq!(
            snapshot.get(&Period::FiveHour).map(|u| u.utilization),
            Some(10.0)
        );
    }
}
