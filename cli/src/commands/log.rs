use anyhow::Result;

use gluco_core::Session;
use gluco_core::models::NewReading;

use super::helpers::{parse_date, parse_time, print_readings_table};

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_log(
    session: &mut Session,
    value: i64,
    period: &str,
    date: Option<String>,
    time: Option<String>,
    notes: Option<String>,
    json: bool,
) -> Result<()> {
    let reading = session.log_reading(NewReading {
        date: parse_date(date)?,
        time: parse_time(time)?,
        value,
        period: period.to_string(),
        notes,
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&reading)?);
    } else {
        let target = session.target();
        let status = if target.contains(reading.value) {
            "in range"
        } else if reading.value < target.min {
            "below range"
        } else {
            "above range"
        };
        println!(
            "Logged {} mg/dL for {} {} ({}, {status})",
            reading.value,
            reading.date.format("%Y-%m-%d"),
            reading.time.format("%H:%M"),
            reading.period,
        );
        if let Some(ref n) = reading.notes {
            println!("  Notes: {n}");
        }
    }

    Ok(())
}

pub(crate) fn cmd_recent(session: &Session, limit: usize, json: bool) -> Result<()> {
    let mut readings = session.readings().sorted_by_recency();
    readings.truncate(limit);

    if json {
        println!("{}", serde_json::to_string_pretty(&readings)?);
    } else if readings.is_empty() {
        eprintln!("No readings yet. Use `gluco log <value>` to record one.");
    } else {
        print_readings_table(&readings);
    }

    Ok(())
}
