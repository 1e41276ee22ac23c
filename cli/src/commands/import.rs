use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;

use gluco_core::Session;
use gluco_core::export::{ExportOrder, default_file_name, parse_csv, to_csv, write_csv};

/// Where to write an export: the explicit path, the dated default name in
/// `dir` when saving, or stdout (`None`).
pub(crate) fn export_path(output: Option<PathBuf>, save: bool, dir: &Path) -> Option<PathBuf> {
    output.or_else(|| save.then(|| dir.join(default_file_name(Local::now().date_naive()))))
}

pub fn cmd_export(session: &Session, output: Option<&Path>, order: &str) -> Result<()> {
    let order: ExportOrder = order.parse()?;
    let readings = order.apply(session.readings());

    match output {
        None => print!("{}", to_csv(&readings)?),
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create file: {}", path.display()))?;
            write_csv(file, &readings)?;
            eprintln!(
                "Exported {} readings ({order} first) to {}",
                readings.len(),
                path.display()
            );
        }
    }

    Ok(())
}

pub fn cmd_import(session: &mut Session, path: &Path, json: bool) -> Result<()> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;

    let readings = parse_csv(file)?;

    if readings.is_empty() {
        if json {
            println!(
                "{}",
                serde_json::json!({ "error": "No rows found in CSV file" })
            );
        } else {
            eprintln!("No rows found in CSV file.");
        }
        return Ok(());
    }

    let imported = session.import_readings(readings)?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "imported": imported,
                "total": session.readings().len(),
            })
        );
    } else {
        println!("Import complete.\n");
        println!("  Readings imported: {imported}");
        println!("  Total readings:    {}", session.readings().len());
    }

    Ok(())
}
