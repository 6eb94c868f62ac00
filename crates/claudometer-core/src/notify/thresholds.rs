//! Normalized threshold sets.

use serde::{Deserialize, Serialize};

/// Thresholds used when none are configured
pub const DEFAULT_THRESHOLDS: [u8; 3] = [50, 75, 90];

/// Thresholds at or above this value produce urgent notifications
pub const URGENT_THRESHOLD: u8 = 90;

/// Ascending, deduplicated percentages in 0..=100.
///
/// Never empty: normalizing an empty or fully out-of-range list yields
/// [`DEFAULT_THRESHOLDS`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<u32>", into = "Vec<u8>")]
pub struct Thresholds(Vec<u8>);

impl Thresholds {
    /// Normalize a raw list: drop values above 100, sort, dedup
    pub fn new<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<u32>,
    {
        let mut list: Vec<u8> = values
            .into_iter()
            .map(Into::into)
            .filter(|v| *v <= 100)
            .map(|v| v as u8)
            .collect();
        list.sort_unstable();
        list.dedup();

        if list.is_empty() {
            return Self::default();
        }
        Self(list)
    }

    /// Lowest threshold; utilization below it re-arms a period
    pub fn min(&self) -> u8 {
        self.0[0]
    }

    /// Thresholds in ascending order
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Iterate in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.iter().copied()
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self(DEFAULT_THRESHOLDS.to_vec())
    }
}

impl From<Vec<u32>> for Thresholds {
    fn from(values: Vec<u32>) -> Self {
        Self::new(values)
    }
}

impl From<Thresholds> for Vec<u8> {
    fn from(thresholds: Thresholds) -> Self {
        thresholds.0
    }
}

/// Whether crossing `threshold` warrants a louder, longer notification
pub fn is_urgent(threshold: u8) -> bool {
    threshold >= URGENT_THRESHOLD
}
