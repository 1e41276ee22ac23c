use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::debug;

use crate::by_period::{PeriodAggregate, by_period};
use crate::models::{GlucoseReading, RecommendationEntry, TargetRange};
use crate::period::{Period, classify};
use crate::recommendation::RecommendationLog;
use crate::stats::{self, Statistics, summarize};
use crate::store::{ReadingStore, sort_by_recency};
use crate::window::{self, Window};

/// Readings shown in the "recent" list.
pub const RECENT_LIMIT: usize = 5;

/// Summary cards for the landing view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub last_reading: Option<GlucoseReading>,
    /// Mean over the last 7 days.
    pub average_7d: Option<f64>,
    pub average_all_time: Option<f64>,
    /// Time in range over all readings.
    pub in_range_count: usize,
    pub total: usize,
    pub in_range_percentage: f64,
    pub target: TargetRange,
    pub recent: Vec<GlucoseReading>,
    pub latest_recommendation: Option<RecommendationEntry>,
}

impl Dashboard {
    #[must_use]
    pub fn build(
        store: &ReadingStore,
        target: &TargetRange,
        recommendations: &RecommendationLog,
        today: NaiveDate,
    ) -> Self {
        let all = stats::summarize(store.all(), target);
        let last_week = window::filter(store.all(), Window::Last7, today);
        let average_7d = stats::mean(&last_week.iter().map(|r| r.value).collect::<Vec<_>>());

        let mut recent = store.sorted_by_recency();
        recent.truncate(RECENT_LIMIT);

        Self {
            last_reading: store.most_recent().cloned(),
            average_7d,
            average_all_time: all.mean,
            in_range_count: all.in_range_count,
            total: all.count,
            in_range_percentage: all.in_range_percentage,
            target: *target,
            recent,
            latest_recommendation: recommendations.current().cloned(),
        }
    }
}

/// One point of the glucose trend chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendPoint {
    pub timestamp: NaiveDateTime,
    pub value: i64,
    pub period: Period,
    pub in_range: bool,
}

/// Chronological chart series.
#[must_use]
pub fn trend_series(readings: &[GlucoseReading], target: &TargetRange) -> Vec<TrendPoint> {
    let mut points: Vec<TrendPoint> = readings
        .iter()
        .map(|r| TrendPoint {
            timestamp: r.timestamp(),
            value: r.value,
            period: classify(&r.period),
            in_range: target.contains(r.value),
        })
        .collect();
    points.sort_by_key(|p| p.timestamp);
    points
}

/// Everything the analysis view shows for one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub window: Window,
    pub statistics: Statistics,
    pub periods: BTreeMap<Period, PeriodAggregate>,
    pub trend: Vec<TrendPoint>,
    pub target: TargetRange,
    /// Reference line for the per-period bar chart.
    pub target_midpoint: f64,
    /// Window subset, newest first.
    pub readings: Vec<GlucoseReading>,
}

impl Analysis {
    #[must_use]
    pub fn build(
        readings: &[GlucoseReading],
        window: Window,
        target: &TargetRange,
        today: NaiveDate,
    ) -> Self {
        let subset = window::filter(readings, window, today);
        debug!(window = %window, total = readings.len(), selected = subset.len(), "analysis");

        Self {
            window,
            statistics: summarize(&subset, target),
            periods: by_period(&subset),
            trend: trend_series(&subset, target),
            target: *target,
            target_midpoint: target.midpoint(),
            readings: sort_by_recency(&subset),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statistics.is_empty()
    }
}
