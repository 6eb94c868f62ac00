//! Builder for constructing a [`MonitorCore`] instance.
//!
//! ```ignore
//! let core = MonitorCoreBuilder::new(settings)
//!     .with_sink(Arc::new(DesktopSink::new()))
//!     .with_renderer(renderer)
//!     .build()?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use parking_lot::Mutex;

use crate::config::Settings;
use crate::monitor::{Poller, StatusRenderer};
use crate::notify::{NotificationSink, ThresholdNotifier};
use crate::usage::{ClaudeUsageClient, UsageFetcher};

use super::core::MonitorCore;

/// Builder for constructing a [`MonitorCore`] Facade instance
pub struct MonitorCoreBuilder {
    settings: Arc<Settings>,
    fetcher: Option<Arc<dyn UsageFetcher>>,
    sink: Option<Arc<dyn NotificationSink>>,
    renderer: Option<Arc<dyn StatusRenderer>>,
}

impl MonitorCoreBuilder {
    /// Create a new builder with the given settings
    pub fn new(settings: Settings) -> Self {
        Self::from_shared_settings(Arc::new(settings))
    }

    /// Create a new builder from an already-shared settings
    pub fn from_shared_settings(settings: Arc<Settings>) -> Self {
        Self {
            settings,
            fetcher: None,
            sink: None,
            renderer: None,
        }
    }

    /// Use a custom fetcher instead of the claude.ai client
    pub fn with_fetcher(mut self, fetcher: Arc<dyn UsageFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Set the notification sink (defaults to the log sink)
    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Set the status renderer (defaults to the log renderer)
    pub fn with_renderer(mut self, renderer: Arc<dyn StatusRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Build the `MonitorCore` instance
    ///
    /// Without a custom fetcher, a [`ClaudeUsageClient`] is created from the
    /// settings, which requires both credentials.
    pub fn build(self) -> Result<MonitorCore> {
        let settings = self.settings;

        let fetcher: Arc<dyn UsageFetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => {
                if !settings.is_configured() {
                    bail!("organization_id and session_cookie must be set in the config file");
                }
                Arc::new(ClaudeUsageClient::new(
                    &settings.api.base_url,
                    &settings.organization_id,
                    &settings.session_cookie,
                    Duration::from_secs(settings.api.timeout_secs),
                )?)
            }
        };

        let notifier = Arc::new(Mutex::new(
            ThresholdNotifier::new(settings.notification_thresholds.clone())
                .with_periods(settings.notification_periods.iter().cloned()),
        ));

        let mut poller = Poller::new(
            fetcher,
            notifier.clone(),
            Duration::from_secs(settings.poll_interval_seconds),
        );
        if let Some(sink) = self.sink {
            poller = poller.with_sink(sink);
        }
        if let Some(renderer) = self.renderer {
            poller = poller.with_renderer(renderer);
        }

        Ok(MonitorCore::new(settings, Arc::new(poller), notifier))
    }
}
