//! End-to-end tests for the roster -> provisioning CSV pipeline.
//!
//! These tests drive the public API the way the CLI does:
//! - A real TOML configuration store in a temp directory
//! - CSV uploads as raw bytes and as data URLs
//! - Real output files read back with the `csv` crate
//!
//! No network I/O and no fixtures outside the temp directory.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tempfile::TempDir;

use rosterbulk_core::config::AppConfig;
use rosterbulk_core::errors::{CoreError, TemplateError, ValidationError};
use rosterbulk_core::models::Status;
use rosterbulk_core::processor::{RosterProcessor, TemplateOutcome};
use rosterbulk_core::store::{ConfigStore, TomlStore};
use rosterbulk_core::table::{Cell, Table, Upload};
use rosterbulk_core::template::{TemplateWriter, MAX_TEMPLATE_CHARS};
use rosterbulk_core::writer::VERSION_MARKER;
use rosterbulk_core::Response;

// ===========================================================================
// Helpers
// ===========================================================================

struct Env {
    dir: TempDir,
    processor: RosterProcessor<TomlStore>,
}

impl Env {
    fn new(extra_settings: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config").join("config.toml");
        std::fs::create_dir_all(config_path.parent().unwrap()).unwrap();
        std::fs::write(
            &config_path,
            format!(
                "[settings]\noutput_dir = {:?}\n{extra_settings}\n\n[opco]\na = \"x.com\"\nb = \"y.com\"\ndefault = \"z.com\"\n",
                dir.path().join("out").display().to_string()
            ),
        )
        .unwrap();

        let store = TomlStore::open(&config_path, AppConfig::default_table().unwrap()).unwrap();
        Self {
            dir,
            processor: RosterProcessor::new(store),
        }
    }

    fn out_dir(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    fn csv_files(&self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(self.out_dir()) else {
            return Vec::new();
        };
        entries
            .map(|e| e.unwrap().path())
            .filter(|p| p.extension().is_some_and(|e| e == "csv"))
            .collect()
    }
}

fn csv_upload(body: &str) -> Upload {
    Upload::new("roster.csv", "text/csv", body.as_bytes().to_vec())
}

/// Returns (version line, header row, data rows).
fn read_output(path: &Path) -> (String, Vec<String>, Vec<Vec<String>>) {
    let text = std::fs::read_to_string(path).unwrap();
    let (version, rest) = text.split_once('\n').unwrap();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(rest.as_bytes());
    let header = reader
        .headers()
        .unwrap()
        .iter()
        .map(str::to_string)
        .collect();
    let rows = reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect();
    (version.to_string(), header, rows)
}

// ===========================================================================
// Round trip
// ===========================================================================

#[test]
fn test_round_trip_usernames_match() {
    let mut env = Env::new("");
    let body = "Full Name,Operating Company\nJohn Doe,A\nJohn Doe,a\nJane Lee,b\nMary-Jane Smith-Jones,unknown\n";
    let report = env.processor.process_upload(&csv_upload(body), None).unwrap();

    assert_eq!(report.rows_written, 4);
    let (version, header, rows) = read_output(&report.output_file);
    assert_eq!(version, VERSION_MARKER);
    assert_eq!(header.len(), 6);
    assert_eq!(header[0], "Name [displayName] Required");

    let usernames: Vec<&str> = rows.iter().map(|r| r[1].as_str()).collect();
    assert_eq!(
        usernames,
        vec![
            "John.Doe@x.com",
            "John.Doe1@x.com",
            "Jane.Lee@y.com",
            "Mary.Jones@z.com"
        ]
    );

    // Display names are never suffixed.
    assert_eq!(rows[0][0], "John Doe");
    assert_eq!(rows[1][0], "John Doe");
    assert_eq!(rows[3][0], "Mary-Jane Smith-Jones");
    assert_eq!(rows[3][4], "Mary-Jane");
    assert_eq!(rows[3][5], "Smith-Jones");

    for row in &rows {
        assert_eq!(row[2].chars().count(), 16);
        assert_eq!(row[3], "No");
    }
}

#[test]
fn test_data_url_upload() {
    let mut env = Env::new("");
    let payload = BASE64.encode("full name,operating company\nJohn Doe,a\n");
    let upload = Upload::from_data_url(
        "roster.csv",
        &format!("data:text/csv;base64,{payload}"),
    )
    .unwrap();
    let report = env.processor.process_upload(&upload, None).unwrap();
    let (_, _, rows) = read_output(&report.output_file);
    assert_eq!(rows.len(), 1);
}

// ===========================================================================
// Flatten
// ===========================================================================

#[test]
fn test_flatten_same_run_key_single_file() {
    let mut env = Env::new("");
    let first = env
        .processor
        .process_upload(
            &csv_upload("full name,operating company\nJohn Doe,a\nJane Lee,b\n"),
            Some("batch-1"),
        )
        .unwrap();
    let second = env
        .processor
        .process_upload(
            &csv_upload("full name,operating company\nAnn Kim,a\n"),
            Some("batch-1"),
        )
        .unwrap();

    assert_eq!(first.output_file, second.output_file);
    assert!(second.appended);
    assert_eq!(env.csv_files().len(), 1);

    let text = std::fs::read_to_string(&first.output_file).unwrap();
    assert_eq!(text.matches(VERSION_MARKER).count(), 1);
    assert_eq!(
        text.matches("User name [userPrincipalName] Required").count(),
        1
    );
    let (_, _, rows) = read_output(&first.output_file);
    assert_eq!(rows.len(), 3);
}

#[test]
fn test_returned_run_key_continues_file() {
    let mut env = Env::new("");
    let first = env
        .processor
        .process_upload(&csv_upload("full name,operating company\nJohn Doe,a\n"), None)
        .unwrap();
    let key = first.run_key.clone().unwrap();
    let second = env
        .processor
        .process_upload(
            &csv_upload("full name,operating company\nJane Lee,b\n"),
            Some(&key),
        )
        .unwrap();
    assert_eq!(first.output_file, second.output_file);

    let third = env
        .processor
        .process_upload(&csv_upload("full name,operating company\nAnn Kim,a\n"), None)
        .unwrap();
    assert_ne!(first.output_file, third.output_file);
    assert_eq!(env.csv_files().len(), 2);
}

// ===========================================================================
// Validation and filtering
// ===========================================================================

#[test]
fn test_missing_full_name_column() {
    let mut env = Env::new("");
    let err = env
        .processor
        .process_upload(&csv_upload("operating company,name\na,John Doe\n"), None)
        .unwrap_err();
    match &err {
        CoreError::Validation(ValidationError::MissingColumns { columns }) => {
            assert_eq!(columns, &vec!["full name".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(Response::from(&err).message.contains("full name"));
    assert!(env.csv_files().is_empty());
}

#[test]
fn test_numeric_cells_are_dropped() {
    let mut env = Env::new("");
    let report = env
        .processor
        .process_upload(
            &csv_upload("full name,operating company\nJohn Doe,a\n12345,a\nJane Lee,42\n"),
            None,
        )
        .unwrap();
    assert_eq!(report.rows_written, 1);
    assert_eq!(report.dropped, 2);
    assert!(report.message().contains("dropped 2/3 rows"));
}

#[test]
fn test_two_name_columns() {
    let mut env = Env::new("two_name_column_support = true");
    let body = "First Name,Last Name,Operating Company\nJohn,Doe,a\nJane,,b\n  Ann , Kim ,b\n";
    let report = env.processor.process_upload(&csv_upload(body), None).unwrap();

    assert_eq!(report.rows_written, 2);
    assert_eq!(report.dropped, 1);
    let (_, _, rows) = read_output(&report.output_file);
    assert_eq!(rows[0][1], "John.Doe@x.com");
    assert_eq!(rows[1][1], "Ann.Kim@y.com");
}

#[test]
fn test_format_settings_apply() {
    let mut env = Env::new("\n[settings.format]\ncase = \"lower\"\nstyle = \"f-last\"\nseparator = \"none\"\n");
    let report = env
        .processor
        .process_table(
            Table::new(
                vec!["full name".into(), "operating company".into()],
                vec![vec![Cell::from("John Doe"), Cell::from("a")]],
            ),
            None,
        )
        .unwrap();
    let (_, _, rows) = read_output(&report.output_file);
    assert_eq!(rows[0][1], "jdoe@x.com");
}

// ===========================================================================
// Templates
// ===========================================================================

#[test]
fn test_templates_generated() {
    let mut env = Env::new("\n[settings.template]\nenabled = true\ntext = \"Welcome [NAME], sign in as [USERNAME] with [PASSWORD]\"\n");
    let report = env
        .processor
        .process_upload(
            &csv_upload("full name,operating company\njohn doe,a\nJane Lee,b\n"),
            None,
        )
        .unwrap();

    assert_eq!(report.status(), Status::Success);
    assert!(report
        .message()
        .ends_with(" and generated template files (created 2, failed 0)"));
    let TemplateOutcome::Written(templates) = &report.template else {
        panic!("templates not written: {:?}", report.template);
    };
    assert_eq!(templates.created, 2);

    let (_, _, rows) = read_output(&report.output_file);
    let mut contents: Vec<String> = std::fs::read_dir(&templates.output_dir)
        .unwrap()
        .map(|e| std::fs::read_to_string(e.unwrap().path()).unwrap())
        .collect();
    contents.sort();
    let expected = format!(
        "Welcome John Doe, sign in as John.Doe@x.com with {}",
        rows[0][2]
    );
    assert!(contents.contains(&expected), "{contents:?}");
}

#[test]
fn test_template_row_failure_is_a_warning() {
    let mut env = Env::new("\n[settings.template]\nenabled = true\ntext = \"Hi [NAME]\"\n");
    let long_last = "d".repeat(300);
    let report = env
        .processor
        .process_upload(
            &csv_upload(&format!(
                "full name,operating company\nJane Lee,a\nJohn {long_last},b\n"
            )),
            None,
        )
        .unwrap();

    let (_, _, rows) = read_output(&report.output_file);
    assert_eq!(rows.len(), 2);

    let TemplateOutcome::Written(templates) = &report.template else {
        panic!("templates not written: {:?}", report.template);
    };
    assert_eq!((templates.created, templates.failed), (1, 1));
    assert_eq!(report.status(), Status::Warning);
    assert_eq!(
        report.message(),
        "CSV generated and generated template files (created 1, failed 1)"
    );

    let response = Response::from(report);
    assert_eq!(response.status, Status::Warning);
    assert!(!response.is_success());
}

#[test]
fn test_template_too_long_writes_no_files() {
    let dir = tempfile::tempdir().unwrap();
    let names = vec!["John Doe".to_string()];
    let text = "y".repeat(MAX_TEMPLATE_CHARS + 1);
    let err = TemplateWriter
        .write(dir.path(), &names, &names, &names, &text, "run")
        .unwrap_err();
    assert!(matches!(err, TemplateError::TextTooLong { .. }));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_long_template_is_trimmed_in_store() {
    let text = "z".repeat(MAX_TEMPLATE_CHARS + 1);
    let mut env = Env::new(&format!(
        "\n[settings.template]\nenabled = true\ntext = \"{text}\"\n"
    ));
    let report = env
        .processor
        .process_upload(&csv_upload("full name,operating company\nJohn Doe,a\n"), None)
        .unwrap();

    assert_eq!(report.status(), Status::Error);
    assert_eq!(
        report.message(),
        "CSV generated, failed to generate template files"
    );
    assert!(report.output_file.exists());
    assert!(!env.out_dir().join("templates").exists());

    let stored = env
        .processor
        .store()
        .get_in("text", Some("template"))
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string();
    assert_eq!(stored.chars().count(), MAX_TEMPLATE_CHARS);
}
