use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::GlucoseReading;
use crate::period::{Period, classify};
use crate::stats;
use crate::store::most_recent;

/// Readings of one classified period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodAggregate {
    /// Raw values, oldest first (box-plot input).
    pub values: Vec<i64>,
    pub mean: f64,
    pub latest: GlucoseReading,
}

/// Group readings by classified period. `Other` readings are left out, and a
/// period with no readings has no entry.
#[must_use]
pub fn by_period(readings: &[GlucoseReading]) -> BTreeMap<Period, PeriodAggregate> {
    group(readings)
        .into_iter()
        .filter_map(|(period, members)| {
            let mut values: Vec<(chrono::NaiveDateTime, i64)> =
                members.iter().map(|r| (r.timestamp(), r.value)).collect();
            values.sort_by_key(|(ts, _)| *ts);
            let values: Vec<i64> = values.into_iter().map(|(_, v)| v).collect();

            let mean = stats::mean(&values)?;
            let latest = most_recent(members.iter().copied())?.clone();
            Some((period, PeriodAggregate { values, mean, latest }))
        })
        .collect()
}

/// Most recent reading per period, ordered by `(date, time)`.
#[must_use]
pub fn latest_by_period(readings: &[GlucoseReading]) -> BTreeMap<Period, GlucoseReading> {
    by_period(readings)
        .into_iter()
        .map(|(period, agg)| (period, agg.latest))
        .collect()
}

#[must_use]
pub fn mean_by_period(readings: &[GlucoseReading]) -> BTreeMap<Period, f64> {
    by_period(readings)
        .into_iter()
        .map(|(period, agg)| (period, agg.mean))
        .collect()
}

#[must_use]
pub fn values_by_period(readings: &[GlucoseReading]) -> BTreeMap<Period, Vec<i64>> {
    by_period(readings)
        .into_iter()
        .map(|(period, agg)| (period, agg.values))
        .collect()
}

fn group(readings: &[GlucoseReading]) -> BTreeMap<Period, Vec<&GlucoseReading>> {
    let mut groups: BTreeMap<Period, Vec<&GlucoseReading>> = BTreeMap::new();
    for reading in readings {
        let period = classify(&reading.period);
        if period != Period::Other {
            groups.entry(period).or_default().push(reading);
        }
    }
    groups
}
