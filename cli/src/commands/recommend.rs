use std::collections::BTreeMap;

use anyhow::Result;
use chrono::Local;

use gluco_core::models::{DIETARY_RESTRICTIONS, MealRequest};
use gluco_core::period::Period;
use gluco_core::recommendation::RecommendationProvider;
use gluco_core::{GlucoseError, Session};

use super::helpers::print_no_data;

/// Period readings given on the command line, overriding the logged ones.
pub(crate) struct PlannerOverrides {
    pub morning: Option<i64>,
    pub afternoon: Option<i64>,
    pub evening: Option<i64>,
}

impl PlannerOverrides {
    fn to_map(&self) -> BTreeMap<Period, i64> {
        [
            (Period::Morning, self.morning),
            (Period::Afternoon, self.afternoon),
            (Period::Evening, self.evening),
        ]
        .into_iter()
        .filter_map(|(p, v)| v.map(|v| (p, v)))
        .collect()
    }
}

/// Known restrictions are normalised to their canonical spelling; anything
/// else passes through as typed.
fn canonical_restriction(r: &str) -> String {
    DIETARY_RESTRICTIONS
        .iter()
        .find(|known| known.eq_ignore_ascii_case(r.trim()))
        .map_or_else(|| r.trim().to_string(), |known| (*known).to_string())
}

pub(crate) fn cmd_recommend(
    session: &mut Session,
    provider: &dyn RecommendationProvider,
    request: MealRequest,
    overrides: &PlannerOverrides,
    json: bool,
) -> Result<()> {
    let request = MealRequest {
        restrictions: request
            .restrictions
            .iter()
            .map(|r| canonical_restriction(r))
            .collect(),
        ..request
    };

    if !json {
        eprintln!("Generating personalized recommendations...");
    }
    let result = session.request_recommendation(
        provider,
        &request,
        &overrides.to_map(),
        Local::now().naive_local(),
    );

    match result {
        Ok(entry) => {
            if json {
                println!("{}", serde_json::to_string_pretty(entry)?);
            } else {
                println!("**{}**\n", entry.heading());
                println!("{}", entry.text);
            }
            Ok(())
        }
        Err(e) => {
            print_failure(&e, json);
            Err(e.into())
        }
    }
}

fn print_failure(err: &GlucoseError, json: bool) {
    let tips = err.troubleshooting();
    if json {
        println!(
            "{}",
            serde_json::json!({ "error": err.to_string(), "troubleshooting": tips })
        );
    } else if !tips.is_empty() {
        eprintln!("Troubleshooting:");
        for tip in tips {
            eprintln!("  - {tip}");
        }
    }
}

pub(crate) fn cmd_recommendations(session: &Session, all: bool, json: bool) -> Result<()> {
    let log = session.recommendations();

    if log.is_empty() {
        print_no_data(
            "No recommendations yet. Use `gluco recommend --meal <type>` to get one.",
            json,
        );
        return Ok(());
    }

    let entries = if all {
        log.history()
    } else {
        &log.history()[log.len() - 1..]
    };

    if json {
        println!("{}", serde_json::to_string_pretty(entries)?);
        return Ok(());
    }

    for (i, entry) in entries.iter().rev().enumerate() {
        if i > 0 {
            println!("\n---\n");
        }
        println!("**{}**\n", entry.heading());
        println!("{}", entry.text);
    }

    Ok(())
}
