use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::GlucoseError;
use crate::models::GlucoseReading;

/// Trailing date range used to scope statistics and charts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Window {
    AllTime,
    #[default]
    Last7,
    Last14,
    Last30,
}

impl Window {
    pub const ALL: [Self; 4] = [Self::AllTime, Self::Last7, Self::Last14, Self::Last30];

    /// Day count of a trailing window, `None` for all time.
    #[must_use]
    pub fn days(self) -> Option<i64> {
        match self {
            Self::AllTime => None,
            Self::Last7 => Some(7),
            Self::Last14 => Some(14),
            Self::Last30 => Some(30),
        }
    }

    /// Earliest date still inside the window.
    #[must_use]
    pub fn cutoff(self, today: NaiveDate) -> Option<NaiveDate> {
        self.days().map(|d| today - Duration::days(d))
    }

    #[must_use]
    pub fn includes(self, reading: &GlucoseReading, today: NaiveDate) -> bool {
        self.cutoff(today).is_none_or(|cutoff| reading.date >= cutoff)
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::AllTime => "All Time",
            Self::Last7 => "Last 7 Days",
            Self::Last14 => "Last 14 Days",
            Self::Last30 => "Last 30 Days",
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Window {
    type Err = GlucoseError;

    /// Accepts `all`, `7`, `7d`, `last7`, `last-7`, `Last 7 Days`, `All Time`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .to_lowercase()
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .collect();
        let key = key.trim_start_matches("last");
        let key = key.trim_end_matches("days").trim_end_matches('d');
        match key {
            "all" | "alltime" => Ok(Self::AllTime),
            "7" => Ok(Self::Last7),
            "14" => Ok(Self::Last14),
            "30" => Ok(Self::Last30),
            _ => Err(GlucoseError::validation(format!(
                "Invalid window '{s}'. Use all, 7, 14, or 30"
            ))),
        }
    }
}

/// Readings dated on or after `today - days`. Time of day is ignored.
#[must_use]
pub fn filter(
    readings: &[GlucoseReading],
    window: Window,
    today: NaiveDate,
) -> Vec<GlucoseReading> {
    match window.cutoff(today) {
        None => readings.to_vec(),
        Some(cutoff) => readings
            .iter()
            .filter(|r| r.date >= cutoff)
            .cloned()
            .collect(),
    }
}
