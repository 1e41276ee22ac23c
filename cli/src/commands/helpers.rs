use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, NaiveTime, Timelike};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use gluco_core::models::GlucoseReading;
use gluco_core::period::classify;

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            _ => Ok(gluco_core::models::parse_date(&s)?),
        },
    }
}

/// `HH:MM`, or the current minute for `None`/`now`.
pub(crate) fn parse_time(time_str: Option<String>) -> Result<NaiveTime> {
    match time_str.as_deref() {
        None | Some("now") => {
            let now = Local::now().time();
            NaiveTime::from_hms_opt(now.hour(), now.minute(), 0)
                .context("Failed to read the current time")
        }
        Some(s) => Ok(gluco_core::models::parse_time(s)?),
    }
}

pub(crate) fn print_readings_table(readings: &[GlucoseReading]) {
    #[derive(Tabled)]
    struct ReadingRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Time")]
        time: String,
        #[tabled(rename = "mg/dL")]
        value: i64,
        #[tabled(rename = "Period")]
        period: String,
        #[tabled(rename = "Group")]
        group: String,
        #[tabled(rename = "Notes")]
        notes: String,
    }

    let rows: Vec<ReadingRow> = readings
        .iter()
        .map(|r| ReadingRow {
            date: r.date.format("%Y-%m-%d").to_string(),
            time: r.time.format("%H:%M").to_string(),
            value: r.value,
            period: r.period.clone(),
            group: classify(&r.period).to_string(),
            notes: r.notes.as_deref().map(|n| truncate(n, 30)).unwrap_or_default(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

/// One-decimal figure, `-` when unavailable.
pub(crate) fn fmt_opt(v: Option<f64>) -> String {
    v.map_or_else(|| "-".to_string(), |v| format!("{:.1}", no_neg_zero(v)))
}

/// Report an empty view: JSON error object on stdout, or a note on stderr.
pub(crate) fn print_no_data(message: &str, json: bool) {
    if json {
        println!("{}", json_error(message));
    } else {
        eprintln!("{message}");
    }
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
