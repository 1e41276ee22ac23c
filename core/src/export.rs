use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::GlucoseError;
use crate::models::{GlucoseReading, hhmm, parse_date, parse_time, validate_reading_value};
use crate::store::ReadingStore;

pub const CSV_HEADER: [&str; 5] = ["Date", "Time", "Reading", "Period", "Notes"];

/// Row order of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportOrder {
    #[default]
    Newest,
    Oldest,
    Insertion,
}

impl ExportOrder {
    #[must_use]
    pub fn apply(self, store: &ReadingStore) -> Vec<GlucoseReading> {
        match self {
            Self::Newest => store.sorted_by_recency(),
            Self::Oldest => store.sorted_chronologically(),
            Self::Insertion => store.all().to_vec(),
        }
    }
}

impl fmt::Display for ExportOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Newest => "newest",
            Self::Oldest => "oldest",
            Self::Insertion => "insertion",
        })
    }
}

impl FromStr for ExportOrder {
    type Err = GlucoseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "newest" | "recent" => Ok(Self::Newest),
            "oldest" | "chronological" => Ok(Self::Oldest),
            "insertion" | "logged" => Ok(Self::Insertion),
            _ => Err(GlucoseError::validation(format!(
                "Invalid order '{s}'. Use newest, oldest, or insertion"
            ))),
        }
    }
}

/// Dated file name for a download, e.g. `glucose_readings_20240630.csv`.
#[must_use]
pub fn default_file_name(today: NaiveDate) -> String {
    format!("glucose_readings_{}.csv", today.format("%Y%m%d"))
}

/// Write readings as CSV in the order given.
pub fn write_csv<W: Write>(writer: W, readings: &[GlucoseReading]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(CSV_HEADER)
        .context("Failed to write CSV header")?;
    for r in readings {
        let time = r.time.format(hhmm::FORMAT).to_string();
        let value = r.value.to_string();
        wtr.write_record([
            r.date.to_string().as_str(),
            time.as_str(),
            value.as_str(),
            r.period.as_str(),
            r.notes.as_deref().unwrap_or(""),
        ])
        .context("Failed to write CSV row")?;
    }
    wtr.flush().context("Failed to flush CSV output")?;
    Ok(())
}

pub fn to_csv(readings: &[GlucoseReading]) -> Result<String> {
    let mut buf = Vec::new();
    write_csv(&mut buf, readings)?;
    String::from_utf8(buf).context("CSV output is not valid UTF-8")
}

/// Parse a CSV export from any reader.
///
/// Columns are matched by name, case-insensitively; `Notes` is optional.
/// Every value is re-validated.
pub fn parse_csv<R: Read>(reader: R) -> Result<Vec<GlucoseReading>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().context("Failed to read CSV headers")?.clone();
    let col = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));

    let idx_date = col("Date").context("Missing required column: Date")?;
    let idx_time = col("Time").context("Missing required column: Time")?;
    let idx_value = col("Reading").context("Missing required column: Reading")?;
    let idx_period = col("Period").context("Missing required column: Period")?;
    let idx_notes = col("Notes");

    let mut readings = Vec::new();
    for (line_num, result) in rdr.records().enumerate() {
        let row = line_num + 2;
        let record = result.with_context(|| format!("Failed to parse CSV row {row}"))?;
        let field = |idx: usize| record.get(idx).unwrap_or("");

        if record.iter().all(str::is_empty) {
            continue;
        }

        let date = parse_date(field(idx_date)).with_context(|| format!("Row {row}"))?;
        let time = parse_time(field(idx_time)).with_context(|| format!("Row {row}"))?;
        let Ok(value) = field(idx_value).parse::<i64>() else {
            bail!("Row {row}: invalid reading '{}'", field(idx_value));
        };
        validate_reading_value(value).with_context(|| format!("Row {row}"))?;

        let notes = idx_notes
            .map(field)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        readings.push(GlucoseReading {
            date,
            time,
            value,
            period: field(idx_period).to_string(),
            notes,
        });
    }

    Ok(readings)
}
