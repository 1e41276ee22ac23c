use anyhow::Result;

use gluco_core::Session;
use gluco_core::models::{DiabetesType, UserProfile};

pub(crate) fn cmd_target_set(session: &mut Session, min: i64, max: i64, json: bool) -> Result<()> {
    let target = session.set_target_range(min, max)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&target)?);
    } else {
        println!("Target range set to {target}");
    }

    Ok(())
}

pub(crate) fn cmd_target_show(session: &Session, json: bool) -> Result<()> {
    let target = session.target();

    if json {
        println!("{}", serde_json::to_string_pretty(&target)?);
    } else {
        println!("Target range: {target}");
    }

    Ok(())
}

pub(crate) fn cmd_profile_set(
    session: &mut Session,
    name: Option<String>,
    diabetes_type: Option<&str>,
    json: bool,
) -> Result<()> {
    let current = session.profile().clone();
    let diabetes_type = match diabetes_type {
        None => current.diabetes_type,
        Some(t) if t.eq_ignore_ascii_case("none") => None,
        Some(t) => Some(t.parse::<DiabetesType>()?),
    };
    session.set_profile(UserProfile {
        name: name.unwrap_or(current.name),
        diabetes_type,
    });

    print_profile(session.profile(), json)
}

pub(crate) fn cmd_profile_show(session: &Session, json: bool) -> Result<()> {
    print_profile(session.profile(), json)
}

fn print_profile(profile: &UserProfile, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(profile)?);
        return Ok(());
    }

    let name = if profile.name.is_empty() {
        "(not set)"
    } else {
        profile.name.as_str()
    };
    let diabetes_type = profile
        .diabetes_type
        .map_or("(not set)", DiabetesType::label);
    println!("Name:          {name}");
    println!("Diabetes type: {diabetes_type}");

    Ok(())
}
