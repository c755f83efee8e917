//! Dry-run validation of a roster file.

use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};

use rosterbulk_core::names::INVALID_NAME;
use rosterbulk_core::processor::RosterProcessor;
use rosterbulk_core::store::TomlStore;

use super::read_upload;
use crate::style;

/// Decode, validate and filter `path`, then show what would be generated.
pub fn run_check(store: TomlStore, path: &Path, mime: Option<&str>, json: bool) -> Result<()> {
    let upload = read_upload(path, mime)?;
    let mut processor = RosterProcessor::new(store);

    let report = match processor.check(&upload) {
        Ok(report) => report,
        Err(e) => {
            println!("{}", style::error(&e.user_message()));
            anyhow::bail!("{} did not pass validation", path.display());
        }
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to serialize report")?
        );
        return Ok(());
    }

    println!();
    println!(
        "{}",
        style::header(&format!("{} ({} rows)", path.display(), report.total))
    );
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["#", "Display name", "Username", "Opco"]);

    for (i, (name, username, opco)) in report.rows.iter().enumerate() {
        let name_cell = if name == INVALID_NAME {
            Cell::new(name).fg(Color::Yellow)
        } else {
            Cell::new(name)
        };
        table.add_row(vec![
            Cell::new(i + 1),
            name_cell,
            Cell::new(username),
            Cell::new(opco),
        ]);
    }
    println!("{}", table);
    println!();

    if report.dropped() > 0 {
        println!(
            "{}",
            style::warn(&format!(
                "{} of {} row(s) would be dropped ({} without a name, {} without an opco)",
                report.dropped(),
                report.total,
                report.dropped_names,
                report.dropped_affiliations
            ))
        );
    }
    if report.invalid_names > 0 {
        println!(
            "{}",
            style::warn(&format!(
                "{} name(s) have no usable parts and would be written as '{}'",
                report.invalid_names, INVALID_NAME
            ))
        );
    }
    println!(
        "{}",
        style::success(&format!("{} row(s) ready", report.rows.len()))
    );
    println!();
    Ok(())
}
