use serde::Serialize;

use crate::models::{GlucoseReading, TargetRange};

/// Summary statistics over a set of readings.
///
/// Fields that cannot be computed for the input size are `None` rather than
/// NaN: everything but the counts on empty input, and `std_dev` below two
/// readings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub count: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    /// Sample standard deviation (n - 1).
    pub std_dev: Option<f64>,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub in_range_count: usize,
    /// 0 when there are no readings.
    pub in_range_percentage: f64,
}

impl Statistics {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[must_use]
pub fn summarize(readings: &[GlucoseReading], target: &TargetRange) -> Statistics {
    let values: Vec<i64> = readings.iter().map(|r| r.value).collect();
    let in_range_count = values.iter().filter(|v| target.contains(**v)).count();

    Statistics {
        count: values.len(),
        mean: mean(&values),
        median: median(&values),
        std_dev: sample_std_dev(&values),
        min: values.iter().copied().min(),
        max: values.iter().copied().max(),
        in_range_count,
        in_range_percentage: percentage(in_range_count, values.len()),
    }
}

#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean(values: &[i64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sum: i64 = values.iter().sum();
    Some(sum as f64 / values.len() as f64)
}

#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn median(values: &[i64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) as f64 / 2.0)
    } else {
        Some(sorted[mid] as f64)
    }
}

#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn sample_std_dev(values: &[i64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = mean(values)?;
    let sum_sq: f64 = values
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum();
    Some((sum_sq / (values.len() - 1) as f64).sqrt())
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}
