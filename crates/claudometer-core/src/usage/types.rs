//! Usage data types decoded from the claude.ai usage endpoint.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A rolling usage window reported by the endpoint
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Period {
    /// Rolling 5-hour session window
    FiveHour,
    /// Rolling 7-day window (all models)
    SevenDay,
    /// Rolling 7-day window for Opus models
    SevenDayOpus,
    /// Rolling 7-day window for Sonnet models
    SevenDaySonnet,
    /// Rolling 7-day window for OAuth applications
    SevenDayOauthApps,
    /// Any window label not known to this build
    Other(String),
}

impl Period {
    /// Parse a period from its endpoint key (e.g. `five_hour`)
    pub fn from_key(key: &str) -> Self {
        match key {
            "five_hour" => Period::FiveHour,
            "seven_day" => Period::SevenDay,
            "seven_day_opus" => Period::SevenDayOpus,
            "seven_day_sonnet" => Period::SevenDaySonnet,
            "seven_day_oauth_apps" => Period::SevenDayOauthApps,
            other => Period::Other(other.to_string()),
        }
    }

    /// Endpoint key for this period
    pub fn key(&self) -> &str {
        match self {
            Period::FiveHour => "five_hour",
            Period::SevenDay => "seven_day",
            Period::SevenDayOpus => "seven_day_opus",
            Period::SevenDaySonnet => "seven_day_sonnet",
            Period::SevenDayOauthApps => "seven_day_oauth_apps",
            Period::Other(key) => key,
        }
    }

    /// Human-readable name used in notifications and tooltips
    pub fn display_name(&self) -> &str {
        match self {
            Period::FiveHour => "5-hour",
            Period::SevenDay => "Weekly",
            Period::SevenDayOpus => "Weekly (Opus)",
            Period::SevenDaySonnet => "Weekly (Sonnet)",
            Period::SevenDayOauthApps => "Weekly (OAuth apps)",
            Period::Other(key) => key,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let key = String::deserialize(deserializer)?;
        Ok(Period::from_key(&key))
    }
}

/// Utilization of a single period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodUsage {
    /// Percentage of quota consumed (0-100)
    pub utilization: f64,
    /// When the window resets, if the endpoint reported it
    #[serde(default)]
    pub resets_at: Option<DateTime<Utc>>,
}

impl PeriodUsage {
    /// Create a usage entry
    pub fn new(utilization: f64, resets_at: Option<DateTime<Utc>>) -> Self {
        Self {
            utilization,
            resets_at,
        }
    }
}

/// One poll's worth of usage data.
///
/// A period mapped to `None` was reported as `null`; a period missing from
/// the map was not reported at all. Neither means 0% utilization.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageSnapshot {
    /// Per-period utilization
    pub periods: BTreeMap<Period, Option<PeriodUsage>>,
    /// When this snapshot was fetched
    pub fetched_at: Option<DateTime<Utc>>,
}

impl UsageSnapshot {
    /// Build a snapshot from `(period, usage)` pairs
    pub fn from_periods<I>(periods: I) -> Self
    where
        I: IntoIterator<Item = (Period, Option<PeriodUsage>)>,
    {
        Self {
            periods: periods.into_iter().collect(),
            fetched_at: None,
        }
    }

    /// Decode the endpoint's JSON object.
    ///
    /// Keys holding `null` become empty periods. Keys holding an object with a
    /// numeric `utilization` become periods. Anything else is not a usage
    /// window and is skipped.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        let object = match value.as_object() {
            Some(o) => o,
            None => {
                return Err(serde::de::Error::custom(
                    "usage response is not a JSON object",
                ))
            }
        };

        let mut periods = BTreeMap::new();
        for (key, entry) in object {
            if entry.is_null() {
                periods.insert(Period::from_key(key), None);
                continue;
            }
            let is_window = entry
                .get("utilization")
                .map(|u| u.is_number())
                .unwrap_or(false);
            if !is_window {
                continue;
            }
            let usage: PeriodUsage = serde_json::from_value(entry.clone())?;
            periods.insert(Period::from_key(key), Some(usage));
        }

        Ok(Self {
            periods,
            fetched_at: Some(Utc::now()),
        })
    }

    /// Usage for a period, `None` if absent or null
    pub fn get(&self, period: &Period) -> Option<&PeriodUsage> {
        self.periods.get(period).and_then(|u| u.as_ref())
    }

    /// Iterate over periods that carry data
    pub fn present(&self) -> impl Iterator<Item = (&Period, &PeriodUsage)> {
        self.periods
            .iter()
            .filter_map(|(period, usage)| usage.as_ref().map(|u| (period, u)))
    }

    /// Highest utilization across the given periods (0 when none carry data)
    pub fn peak_utilization(&self, periods: &[Period]) -> f64 {
        periods
            .iter()
            .filter_map(|p| self.get(p))
            .map(|u| u.utilization)
            .fold(0.0, f64::max)
    }
}
