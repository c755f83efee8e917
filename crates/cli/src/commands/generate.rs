//! Provisioning file generation from roster files and manual entries.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use tracing::{error, info};

use rosterbulk_core::config::AppConfig;
use rosterbulk_core::models::Status;
use rosterbulk_core::processor::{ManualEntry, RosterProcessor, RunReport, TemplateOutcome};
use rosterbulk_core::store::TomlStore;
use rosterbulk_core::Response;

use super::read_upload;
use crate::style;

/// Options of the `generate` subcommand.
pub struct GenerateOptions {
    pub files: Vec<PathBuf>,
    pub flatten: bool,
    pub upload_id: Option<String>,
    pub mime: Option<String>,
    pub json: bool,
}

/// Outcome of one input; the error is the message shown to the user.
type FileResult = (String, Result<RunReport, String>);

/// Process every roster file in order.
///
/// With flattening on, every file after the first appends to the file the
/// first one created. A file that cannot be read or processed is reported
/// and the remaining files are still processed.
pub fn run_generate(store: TomlStore, opts: GenerateOptions) -> Result<()> {
    let loaded = AppConfig::from_store(&store).context("failed to read configuration")?;
    let flatten = opts.flatten || loaded.config.settings.flatten_csv;
    info!(files = opts.files.len(), flatten, "generating provisioning files");

    let mut processor = RosterProcessor::new(store);
    let mut run_key = opts.upload_id.clone();
    let mut results: Vec<FileResult> = Vec::with_capacity(opts.files.len());

    for path in &opts.files {
        let input = path.display().to_string();
        let upload = match read_upload(path, opts.mime.as_deref()) {
            Ok(upload) => upload,
            Err(e) => {
                error!(path = %input, error = %format!("{:#}", e), "skipping unreadable roster");
                results.push((input, Err(format!("{:#}", e))));
                continue;
            }
        };

        let result = processor.process_upload(&upload, run_key.as_deref());
        if flatten && run_key.is_none() {
            if let Ok(report) = &result {
                run_key = report.run_key.clone();
            }
        }
        results.push((input, result.map_err(|e| e.user_message())));
    }

    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    if opts.json {
        print_json(results)?;
    } else {
        print_summary(results);
    }

    if failed > 0 {
        anyhow::bail!("{} of {} file(s) failed", failed, opts.files.len());
    }
    Ok(())
}

/// Generate a provisioning file from `name=opco` entries.
pub fn run_manual(store: TomlStore, entries: &[String], json: bool) -> Result<()> {
    let entries: Vec<ManualEntry> = entries
        .iter()
        .map(|raw| {
            raw.parse::<ManualEntry>()
                .with_context(|| format!("invalid entry '{}', expected NAME=OPCO", raw))
        })
        .collect::<Result<_>>()?;

    let mut processor = RosterProcessor::new(store);
    let result = processor
        .process_manual(&entries)
        .map_err(|e| e.user_message());
    let failed = result.is_err();

    let results = vec![("manual".to_string(), result)];
    if json {
        print_json(results)?;
    } else {
        print_summary(results);
    }

    if failed {
        anyhow::bail!("manual generation failed");
    }
    Ok(())
}

fn to_response(result: Result<RunReport, String>) -> Response {
    match result {
        Ok(report) => report.into(),
        Err(message) => Response::error(message),
    }
}

fn print_json(results: Vec<FileResult>) -> Result<()> {
    for (_, result) in results {
        let response = to_response(result);
        println!(
            "{}",
            serde_json::to_string(&response).context("failed to serialize response")?
        );
    }
    Ok(())
}

fn template_cell(outcome: &TemplateOutcome) -> Cell {
    match outcome {
        TemplateOutcome::Disabled => Cell::new("—"),
        TemplateOutcome::Written(report) if report.failed > 0 => Cell::new(format!(
            "{} created, {} failed",
            report.created, report.failed
        ))
        .fg(Color::Yellow),
        TemplateOutcome::Written(report) => Cell::new(format!("{} created", report.created)),
        TemplateOutcome::Failed(_) => Cell::new("✗ failed").fg(Color::Red),
    }
}

fn print_summary(results: Vec<FileResult>) {
    println!();
    println!("{}", style::header("Provisioning Files"));
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Input", "Status", "Rows", "Dropped", "Templates", "Output"]);

    let mut messages = Vec::with_capacity(results.len());
    for (input, result) in results {
        let row = match &result {
            Ok(report) => {
                let label = if report.appended { "appended" } else { "created" };
                let status = match report.status() {
                    Status::Success => Cell::new(format!("✓ {label}")).fg(Color::Green),
                    Status::Warning => Cell::new(format!("⚠ {label}")).fg(Color::Yellow),
                    Status::Error => Cell::new(format!("✗ {label}")).fg(Color::Red),
                };
                vec![
                    Cell::new(&input),
                    status,
                    Cell::new(report.rows_written),
                    Cell::new(format!("{}/{}", report.dropped, report.total)),
                    template_cell(&report.template),
                    Cell::new(report.output_file.display()),
                ]
            }
            Err(_) => vec![
                Cell::new(&input),
                Cell::new("✗ failed").fg(Color::Red),
                Cell::new("—"),
                Cell::new("—"),
                Cell::new("—"),
                Cell::new("—"),
            ],
        };
        table.add_row(row);
        messages.push((input, to_response(result)));
    }

    println!("{}", table);
    println!();
    for (input, response) in &messages {
        println!("  {} {}", style::dim(input), style::response(response));
    }
    println!();
}
