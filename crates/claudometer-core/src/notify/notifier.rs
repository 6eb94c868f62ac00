//! Threshold-crossing deduplication.
//!
//! Each period carries the set of thresholds already announced in the current
//! crossing episode. A threshold fires once when utilization reaches it, and
//! the whole set re-arms only after utilization drops below the lowest
//! configured threshold.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::thresholds::{is_urgent, Thresholds};
use crate::usage::{Period, UsageSnapshot};

/// A newly crossed `(period, threshold)` pair
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdCrossing {
    pub period: Period,
    pub threshold: u8,
    pub utilization: f64,
    pub resets_at: Option<DateTime<Utc>>,
}

impl ThresholdCrossing {
    /// Urgent crossings get sound and a longer display
    pub fn is_urgent(&self) -> bool {
        is_urgent(self.threshold)
    }
}

/// Stateful engine deciding which thresholds were newly crossed
#[derive(Debug, Clone, Default)]
pub struct ThresholdNotifier {
    thresholds: Thresholds,
    /// Restrict evaluation to these periods (`None` = every period present)
    watched: Option<BTreeSet<Period>>,
    notified: HashMap<Period, BTreeSet<u8>>,
}

impl ThresholdNotifier {
    /// Create a notifier evaluating every period in a snapshot
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            watched: None,
            notified: HashMap::new(),
        }
    }

    /// Only evaluate the given periods; an empty list means all periods
    pub fn with_periods<I>(mut self, periods: I) -> Self
    where
        I: IntoIterator<Item = Period>,
    {
        let set: BTreeSet<Period> = periods.into_iter().collect();
        self.watched = if set.is_empty() { None } else { Some(set) };
        self
    }

    /// Current thresholds
    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Thresholds already notified for a period in the current episode
    pub fn notified_for(&self, period: &Period) -> Vec<u8> {
        self.notified
            .get(period)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Decide which thresholds were newly crossed by this snapshot.
    ///
    /// Crossings are returned grouped by period, ascending by threshold
    /// within each period. Periods absent or null in the snapshot are left
    /// untouched.
    pub fn evaluate(&mut self, snapshot: &UsageSnapshot) -> Vec<ThresholdCrossing> {
        let mut crossings = Vec::new();
        let min = self.thresholds.min();

        for (period, usage) in snapshot.present() {
            if let Some(ref watched) = self.watched {
                if !watched.contains(period) {
                    continue;
                }
            }

            let utilization = usage.utilization;
            let notified = self.notified.entry(period.clone()).or_default();

            for threshold in self.thresholds.iter() {
                if utilization >= f64::from(threshold) && notified.insert(threshold) {
                    crossings.push(ThresholdCrossing {
                        period: period.clone(),
                        threshold,
                        utilization,
                        resets_at: usage.resets_at,
                    });
                }
            }

            if utilization < f64::from(min) && !notified.is_empty() {
                info!(period = %period, utilization, "Usage dropped below {}%, re-arming thresholds", min);
                notified.clear();
            }
        }

        if !crossings.is_empty() {
            debug!(count = crossings.len(), "Threshold crossings detected");
        }
        crossings
    }

    /// Replace the thresholds and forget every period's crossing history
    pub fn update_thresholds(&mut self, thresholds: Thresholds) {
        self.thresholds = thresholds;
        self.notified.clear();
        info!(thresholds = ?self.thresholds.as_slice(), "Updated notification thresholds");
    }

    /// Clear crossing history for one period, or all periods with `None`
    pub fn reset(&mut self, period: Option<&Period>) {
        match period {
            Some(p) => {
                self.notified.remove(p);
                info!(period = %p, "Reset notifications");
            }
            None => {
                self.notified.clear();
                info!("Reset notifications for all periods");
            }
        }
    }
}
