//! Status presentation: icon descriptors and tooltip text.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::backoff::ErrorState;
use super::status::MonitorStatus;
use crate::notify::format_relative_time;
use crate::usage::Period;

/// Consumer of published status, invoked after every poll outcome
pub trait StatusRenderer: Send + Sync {
    fn render(&self, status: &MonitorStatus);
}

/// Renderer that writes the tooltip to the debug log
#[derive(Debug, Default)]
pub struct LogRenderer {
    view: TrayView,
}

impl StatusRenderer for LogRenderer {
    fn render(&self, status: &MonitorStatus) {
        debug!(
            error = status.error.as_str(),
            "Status: {}",
            self.view.tooltip(status, Utc::now()).replace('\n', " | ")
        );
    }
}

/// RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const GREEN: Rgb = Rgb(76, 175, 80);
    pub const YELLOW: Rgb = Rgb(255, 193, 7);
    pub const ORANGE: Rgb = Rgb(255, 152, 0);
    pub const RED: Rgb = Rgb(244, 67, 54);
    pub const GRAY: Rgb = Rgb(158, 158, 158);
    pub const BLUE: Rgb = Rgb(33, 150, 243);

    /// Color band for a utilization percentage
    pub fn for_percentage(percentage: f64) -> Rgb {
        if percentage < 50.0 {
            Rgb::GREEN
        } else if percentage < 75.0 {
            Rgb::YELLOW
        } else if percentage < 90.0 {
            Rgb::ORANGE
        } else {
            Rgb::RED
        }
    }
}

/// What the status icon should show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconSpec {
    /// No data yet
    Loading,
    /// Progress ring with the peak percentage in the center
    Usage { percent: u8, color: Rgb },
    /// Filled circle with a glyph
    Error { symbol: char, color: Rgb },
}

impl IconSpec {
    /// Short text form for terminals and logs
    pub fn label(&self) -> String {
        match self {
            IconSpec::Loading => "...".to_string(),
            IconSpec::Usage { percent, .. } => format!("{}%", percent),
            IconSpec::Error { symbol, .. } => symbol.to_string(),
        }
    }
}

/// Severity label shown next to a period in the tooltip
fn severity(percentage: f64) -> &'static str {
    if percentage < 75.0 {
        "OK"
    } else if percentage < 90.0 {
        "HIGH"
    } else {
        "CRITICAL"
    }
}

/// Pure model computing icon and tooltip from a [`MonitorStatus`]
#[derive(Debug, Clone)]
pub struct TrayView {
    periods: Vec<Period>,
}

impl Default for TrayView {
    fn default() -> Self {
        Self::new([Period::FiveHour, Period::SevenDay])
    }
}

impl TrayView {
    /// Show the given periods, in order
    pub fn new<I>(periods: I) -> Self
    where
        I: IntoIterator<Item = Period>,
    {
        Self {
            periods: periods.into_iter().collect(),
        }
    }

    /// Icon descriptor; errors take priority over data
    pub fn icon(&self, status: &MonitorStatus) -> IconSpec {
        match status.error {
            ErrorState::AuthExpired => {
                return IconSpec::Error {
                    symbol: '!',
                    color: Rgb::BLUE,
                }
            }
            ErrorState::NetworkError => {
                return IconSpec::Error {
                    symbol: '?',
                    color: Rgb::GRAY,
                }
            }
            ErrorState::RateLimited | ErrorState::GenericError => {
                return IconSpec::Error {
                    symbol: 'X',
                    color: Rgb::GRAY,
                }
            }
            ErrorState::None => {}
        }

        match status.snapshot {
            Some(ref snapshot) => {
                let peak = snapshot.peak_utilization(&self.periods);
                IconSpec::Usage {
                    percent: peak.clamp(0.0, 100.0) as u8,
                    color: Rgb::for_percentage(peak),
                }
            }
            None => IconSpec::Loading,
        }
    }

    /// Multi-line tooltip text
    pub fn tooltip(&self, status: &MonitorStatus, now: DateTime<Utc>) -> String {
        match status.error {
            ErrorState::AuthExpired => {
                return "Claude Monitor\n\nAuth Error: Cookie expired\nUpdate config and restart"
                    .to_string()
            }
            ErrorState::NetworkError => {
                return "Claude Monitor\n\nConnection Error\nCheck internet connection".to_string()
            }
            ErrorState::RateLimited => {
                return "Claude Monitor\n\nRate Limited\nWaiting to retry...".to_string()
            }
            ErrorState::GenericError => return "Claude Monitor\n\nError occurred".to_string(),
            ErrorState::None => {}
        }

        let Some(ref snapshot) = status.snapshot else {
            return "Claude Monitor\nLoading...".to_string();
        };

        let mut lines = vec!["Claude Usage Monitor".to_string(), String::new()];
        for period in &self.periods {
            let Some(usage) = snapshot.get(period) else {
                continue;
            };
            lines.push(format!(
                "{}:  {:.0}% [{}]",
                period.display_name(),
                usage.utilization,
                severity(usage.utilization)
            ));
            lines.push(format!(
                "  Resets {}",
                format_relative_time(usage.resets_at, now)
            ));
        }
        lines.join("\n")
    }
}
