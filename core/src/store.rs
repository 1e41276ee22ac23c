use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::GlucoseError;
use crate::models::{GlucoseReading, validate_reading_value};

/// Append-only log of glucose readings, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<GlucoseReading>", into = "Vec<GlucoseReading>")]
pub struct ReadingStore {
    readings: Vec<GlucoseReading>,
}

impl TryFrom<Vec<GlucoseReading>> for ReadingStore {
    type Error = GlucoseError;

    fn try_from(readings: Vec<GlucoseReading>) -> Result<Self, Self::Error> {
        let mut store = Self::new();
        for reading in readings {
            store.append(reading)?;
        }
        Ok(store)
    }
}

impl From<ReadingStore> for Vec<GlucoseReading> {
    fn from(store: ReadingStore) -> Self {
        store.readings
    }
}

impl ReadingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects values outside 40-500 mg/dL without touching the store.
    pub fn append(&mut self, reading: GlucoseReading) -> Result<(), GlucoseError> {
        validate_reading_value(reading.value)?;
        debug!(
            date = %reading.date,
            time = %reading.time,
            value = reading.value,
            period = %reading.period,
            "reading appended"
        );
        self.readings.push(reading);
        Ok(())
    }

    #[must_use]
    pub fn all(&self) -> &[GlucoseReading] {
        &self.readings
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Newest first by `(date, time)`; equal timestamps keep insertion order.
    #[must_use]
    pub fn sorted_by_recency(&self) -> Vec<GlucoseReading> {
        sort_by_recency(&self.readings)
    }

    /// Oldest first by `(date, time)`; equal timestamps keep insertion order.
    #[must_use]
    pub fn sorted_chronologically(&self) -> Vec<GlucoseReading> {
        let mut sorted = self.readings.clone();
        sorted.sort_by_key(GlucoseReading::timestamp);
        sorted
    }

    /// The reading with the latest `(date, time)`, first-inserted on ties.
    #[must_use]
    pub fn most_recent(&self) -> Option<&GlucoseReading> {
        most_recent(&self.readings)
    }
}

pub(crate) fn sort_by_recency(readings: &[GlucoseReading]) -> Vec<GlucoseReading> {
    let mut sorted = readings.to_vec();
    sorted.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
    sorted
}

pub(crate) fn most_recent<'a, I>(readings: I) -> Option<&'a GlucoseReading>
where
    I: IntoIterator<Item = &'a GlucoseReading>,
{
    readings.into_iter().fold(None, |best, r| match best {
        Some(b) if b.timestamp() >= r.timestamp() => Some(b),
        _ => Some(r),
    })
}
