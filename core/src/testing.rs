use chrono::{NaiveDate, NaiveTime};

use crate::models::GlucoseReading;

/// Build a reading from `YYYY-MM-DD` / `HH:MM` literals.
pub(crate) fn reading(date: &str, time: &str, value: i64, period: &str) -> GlucoseReading {
    GlucoseReading {
        date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        time: NaiveTime::parse_from_str(time, "%H:%M").unwrap(),
        value,
        period: period.to_string(),
        notes: None,
    }
}

pub(crate) fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}
