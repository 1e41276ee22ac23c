use anyhow::Result;
use chrono::Local;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use gluco_core::Session;
use gluco_core::window::Window;

use super::helpers::{fmt_opt, print_readings_table};

pub(crate) fn cmd_dashboard(session: &Session, json: bool) -> Result<()> {
    let dash = session.dashboard(Local::now().date_naive());

    if json {
        println!("{}", serde_json::to_string_pretty(&dash)?);
        return Ok(());
    }

    println!("=== Dashboard ===\n");
    match &dash.last_reading {
        Some(r) => println!(
            "  Most recent:    {} mg/dL ({} {}, {})",
            r.value,
            r.date.format("%Y-%m-%d"),
            r.time.format("%H:%M"),
            r.period
        ),
        None => println!("  Most recent:    No data"),
    }
    match dash.average_7d {
        Some(avg) => println!("  7-day average:  {avg:.1} mg/dL"),
        None => println!("  7-day average:  No data"),
    }
    println!(
        "  Time in range:  {:.1}% ({}/{} readings, target {})",
        dash.in_range_percentage, dash.in_range_count, dash.total, dash.target
    );

    if !dash.recent.is_empty() {
        println!("\n  Recent readings:");
        print_readings_table(&dash.recent);
    }

    match &dash.latest_recommendation {
        Some(entry) => {
            println!("\n**{}**\n", entry.heading());
            println!("{}", entry.text);
        }
        None => {
            eprintln!("\nNo recommendations yet. Use `gluco recommend --meal <type>` to get one.");
        }
    }

    Ok(())
}

pub(crate) fn cmd_stats(session: &Session, window: &str, json: bool) -> Result<()> {
    let window: Window = window.parse()?;
    let analysis = session.analysis(window, Local::now().date_naive());

    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(());
    }

    if analysis.is_empty() {
        eprintln!("No readings in {window}");
        return Ok(());
    }

    let s = &analysis.statistics;
    println!("=== {window} ({} readings) ===\n", s.count);
    println!(
        "  Mean: {}  Median: {}  Std dev: {}",
        fmt_opt(s.mean),
        fmt_opt(s.median),
        fmt_opt(s.std_dev)
    );
    if let (Some(min), Some(max)) = (s.min, s.max) {
        println!("  Min: {min}  Max: {max}");
    }
    println!(
        "  In range ({}): {}/{} ({:.1}%)\n",
        analysis.target, s.in_range_count, s.count, s.in_range_percentage
    );

    if analysis.periods.is_empty() {
        eprintln!("No readings in the morning, afternoon or evening periods");
        return Ok(());
    }

    #[derive(Tabled)]
    struct PeriodRow {
        #[tabled(rename = "Period")]
        period: String,
        #[tabled(rename = "Readings")]
        count: usize,
        #[tabled(rename = "Mean")]
        mean: String,
        #[tabled(rename = "vs target mid")]
        delta: String,
        #[tabled(rename = "Latest")]
        latest: String,
    }

    let rows: Vec<PeriodRow> = analysis
        .periods
        .iter()
        .map(|(period, agg)| PeriodRow {
            period: period.to_string(),
            count: agg.values.len(),
            mean: fmt_opt(Some(agg.mean)),
            delta: format!("{:+.1}", agg.mean - analysis.target_midpoint),
            latest: format!(
                "{} ({} {})",
                agg.latest.value,
                agg.latest.date.format("%Y-%m-%d"),
                agg.latest.time.format("%H:%M")
            ),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}
