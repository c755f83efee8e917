//! End-to-end roster processing.
//!
//! [`RosterProcessor`] owns the configuration store and the provisioning
//! file writer. Each call reads the current configuration, so settings
//! changed between uploads take effect on the next one, while the writer's
//! run-key state persists across calls for the lifetime of the processor.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::errors::{CoreError, DatasetError, InputError, TemplateError, ValidationError};
use crate::models::{log_value, random_id, NormalizedPerson, ProvisioningRecord, Response, Status};
use crate::names::{normalize, INVALID_NAME};
use crate::password;
use crate::store::ConfigStore;
use crate::table::{Table, Upload};
use crate::template::{self, TemplateReport, TemplateWriter};
use crate::username::generate_usernames;
use crate::validator;
use crate::writer::{block_sign_in, ProvisioningFileWriter};

/// Pipeline stage of the most recent call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Stage {
    #[default]
    Idle,
    Decoding,
    Validating,
    Filtering,
    Generating,
    Writing,
    Done,
    Errored(String),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Decoding => write!(f, "decoding"),
            Self::Validating => write!(f, "validating"),
            Self::Filtering => write!(f, "filtering"),
            Self::Generating => write!(f, "generating"),
            Self::Writing => write!(f, "writing"),
            Self::Done => write!(f, "done"),
            Self::Errored(reason) => write!(f, "errored: {reason}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// What happened to the template files of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateOutcome {
    Disabled,
    Written(TemplateReport),
    Failed(String),
}

/// Where the rows of a run came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunSource {
    Upload,
    Manual,
}

/// Summary of a successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub source: RunSource,
    /// Key to pass back in to append to the same file.
    pub run_key: Option<String>,
    pub output_file: PathBuf,
    pub output_dir: PathBuf,
    pub rows_written: usize,
    pub dropped: usize,
    pub total: usize,
    pub appended: bool,
    pub template: TemplateOutcome,
}

impl RunReport {
    /// A failed template batch turns the whole run into an error, even
    /// though the CSV was written. Individual template files that failed
    /// make it a warning.
    pub fn status(&self) -> Status {
        match &self.template {
            TemplateOutcome::Failed(_) => Status::Error,
            TemplateOutcome::Written(report) if report.failed > 0 => Status::Warning,
            _ => Status::Success,
        }
    }

    pub fn message(&self) -> String {
        let mut message = match self.source {
            RunSource::Upload => "CSV generated".to_string(),
            RunSource::Manual => "Generated manual CSV".to_string(),
        };
        if self.dropped > 0 {
            let rows = if self.dropped == 1 { "row" } else { "rows" };
            message.push_str(&format!(
                ", dropped {}/{} {rows} from file due to missing values",
                self.dropped, self.total
            ));
        }
        match &self.template {
            TemplateOutcome::Disabled => {}
            TemplateOutcome::Written(report) => message.push_str(&format!(
                " and generated template files (created {}, failed {})",
                report.created, report.failed
            )),
            TemplateOutcome::Failed(_) => message.push_str(", failed to generate template files"),
        }
        message
    }
}

impl From<RunReport> for Response {
    fn from(report: RunReport) -> Self {
        Self {
            status: report.status(),
            message: report.message(),
            output_file: Some(report.output_file),
            output_dir: Some(report.output_dir),
        }
    }
}

/// Result of a dry run.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub total: usize,
    pub dropped_names: usize,
    pub dropped_affiliations: usize,
    /// `(display name, username, affiliation)` per surviving row.
    pub rows: Vec<(String, String, String)>,
    pub invalid_names: usize,
}

impl CheckReport {
    pub fn dropped(&self) -> usize {
        self.dropped_names + self.dropped_affiliations
    }
}

// ---------------------------------------------------------------------------
// Manual entries
// ---------------------------------------------------------------------------

/// One hand-entered person.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualEntry {
    pub name: String,
    pub opco: String,
}

impl ManualEntry {
    pub fn new(name: impl Into<String>, opco: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            opco: opco.into(),
        }
    }
}

impl FromStr for ManualEntry {
    type Err = InputError;

    /// Parse `"<name>=<opco>"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, opco) = s
            .rsplit_once('=')
            .ok_or_else(|| InputError::MalformedPayload(s.to_string()))?;
        Ok(Self::new(name.trim(), opco.trim()))
    }
}

// ---------------------------------------------------------------------------
// Processor
// ---------------------------------------------------------------------------

/// Rows that survived filtering.
struct Prepared {
    people: Vec<NormalizedPerson>,
    total: usize,
    dropped_names: usize,
    dropped_affiliations: usize,
}

impl Prepared {
    fn dropped(&self) -> usize {
        self.dropped_names + self.dropped_affiliations
    }
}

/// Turns rosters into provisioning files.
pub struct RosterProcessor<S: ConfigStore> {
    store: S,
    writer: ProvisioningFileWriter,
    templates: TemplateWriter,
    stage: Stage,
}

impl<S: ConfigStore> RosterProcessor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            writer: ProvisioningFileWriter::default(),
            templates: TemplateWriter,
            stage: Stage::Idle,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn last_stage(&self) -> &Stage {
        &self.stage
    }

    /// Decode an upload and process it.
    ///
    /// Without a `run_key` a fresh one is generated and returned in the
    /// report; passing it back on the next call appends to the same file.
    pub fn process_upload(
        &mut self,
        upload: &Upload,
        run_key: Option<&str>,
    ) -> Result<RunReport, CoreError> {
        self.stage = Stage::Decoding;
        let result = upload
            .decode()
            .map_err(CoreError::from)
            .and_then(|table| self.run_table(table, run_key));
        self.finish(result)
    }

    /// Process an already decoded table.
    pub fn process_table(
        &mut self,
        table: Table,
        run_key: Option<&str>,
    ) -> Result<RunReport, CoreError> {
        let result = self.run_table(table, run_key);
        self.finish(result)
    }

    /// Process hand-entered people. Always writes a new file.
    pub fn process_manual(&mut self, entries: &[ManualEntry]) -> Result<RunReport, CoreError> {
        let result = self.run_manual(entries);
        self.finish(result)
    }

    /// Decode, validate and filter without writing anything.
    pub fn check(&mut self, upload: &Upload) -> Result<CheckReport, CoreError> {
        self.stage = Stage::Decoding;
        let result = upload
            .decode()
            .map_err(CoreError::from)
            .and_then(|table| self.run_check(table));
        self.finish(result)
    }

    fn finish<T>(&mut self, result: Result<T, CoreError>) -> Result<T, CoreError> {
        match &result {
            Ok(_) => self.stage = Stage::Done,
            Err(e) => {
                error!(stage = %self.stage, error = %e, "roster processing failed");
                self.stage = Stage::Errored(e.user_message());
            }
        }
        result
    }

    fn run_check(&mut self, table: Table) -> Result<CheckReport, CoreError> {
        let config = AppConfig::load(&mut self.store)?;
        let prepared = self.prepare(table, &config)?;
        let usernames =
            generate_usernames(&prepared.people, &config.opco, &config.settings.format);

        let invalid_names = prepared
            .people
            .iter()
            .filter(|p| p.short_name() == INVALID_NAME)
            .count();
        let rows = prepared
            .people
            .iter()
            .zip(usernames)
            .map(|(p, u)| (p.full_name.clone(), u, p.affiliation.clone()))
            .collect();

        Ok(CheckReport {
            total: prepared.total,
            dropped_names: prepared.dropped_names,
            dropped_affiliations: prepared.dropped_affiliations,
            rows,
            invalid_names,
        })
    }

    fn run_table(&mut self, table: Table, run_key: Option<&str>) -> Result<RunReport, CoreError> {
        let config = AppConfig::load(&mut self.store)?;
        let prepared = self.prepare(table, &config)?;

        let run_key = run_key.map(str::to_string).unwrap_or_else(|| random_id(16));
        debug!(run_key = %run_key, "processing roster");

        let records = self.generate(&prepared.people, &config);
        self.commit(
            &config,
            records,
            Some(run_key),
            RunSource::Upload,
            prepared.total,
            prepared.dropped(),
        )
    }

    fn run_manual(&mut self, entries: &[ManualEntry]) -> Result<RunReport, CoreError> {
        self.stage = Stage::Validating;
        let config = AppConfig::load(&mut self.store)?;
        if entries.is_empty() {
            return Err(DatasetError::Empty.into());
        }
        debug!(entries = entries.len(), "manual generation");

        self.stage = Stage::Filtering;
        let total = entries.len();
        let people: Vec<NormalizedPerson> = entries
            .iter()
            .filter(|e| !e.name.trim().is_empty() && !e.opco.trim().is_empty())
            .map(|e| person(&e.name, &e.opco))
            .collect();
        let dropped = total - people.len();
        if people.is_empty() {
            return Err(DatasetError::EmptyAfterFiltering { dropped, total }.into());
        }

        let records = self.generate(&people, &config);
        self.commit(&config, records, None, RunSource::Manual, total, dropped)
    }

    /// Validate and filter a table into people.
    fn prepare(&mut self, mut table: Table, config: &AppConfig) -> Result<Prepared, CoreError> {
        self.stage = Stage::Validating;
        let total = table.len();
        if total == 0 {
            return Err(DatasetError::Empty.into());
        }

        let headers = &config.headers;
        let two_names = config.settings.two_name_column_support;
        validator::validate(&table, headers, two_names)?;
        if two_names {
            validator::synthesize_full_name(&mut table, headers);
        }

        self.stage = Stage::Filtering;
        let missing = |column: &str| ValidationError::MissingColumns {
            columns: vec![column.to_string()],
        };
        let name_idx = table
            .column_index(&headers.name)
            .ok_or_else(|| missing(&headers.name))?;
        let opco_idx = table
            .column_index(&headers.opco)
            .ok_or_else(|| missing(&headers.opco))?;

        table.retain_rows(|row| row[name_idx].non_blank_text().is_some());
        let dropped_names = total - table.len();
        let after_names = table.len();
        table.retain_rows(|row| row[opco_idx].non_blank_text().is_some());
        let dropped_affiliations = after_names - table.len();

        debug!(dropped_names, total, "dropped rows without a name");
        debug!(dropped_affiliations, total, "dropped rows without an affiliation");

        if table.is_empty() {
            let dropped = dropped_names + dropped_affiliations;
            warn!(dropped, total, "no rows left after filtering");
            return Err(DatasetError::EmptyAfterFiltering { dropped, total }.into());
        }

        let people = table
            .rows()
            .iter()
            .filter_map(|row| {
                let name = row[name_idx].as_text()?;
                let opco = row[opco_idx].as_text()?;
                Some(person(name, opco))
            })
            .collect();

        Ok(Prepared {
            people,
            total,
            dropped_names,
            dropped_affiliations,
        })
    }

    fn generate(
        &mut self,
        people: &[NormalizedPerson],
        config: &AppConfig,
    ) -> Vec<ProvisioningRecord> {
        self.stage = Stage::Generating;
        let usernames = generate_usernames(people, &config.opco, &config.settings.format);
        let blocks = block_sign_in(people.len(), &[]);
        let policy = config.settings.password;

        people
            .iter()
            .zip(usernames)
            .zip(blocks)
            .map(|((p, username), block)| ProvisioningRecord {
                display_name: p.full_name.clone(),
                username,
                password: password::generate(Some(&policy)),
                block_sign_in: block,
                first_name: p.first_name.clone(),
                last_name: p.last_name.clone(),
            })
            .collect()
    }

    fn commit(
        &mut self,
        config: &AppConfig,
        records: Vec<ProvisioningRecord>,
        run_key: Option<String>,
        source: RunSource,
        total: usize,
        dropped: usize,
    ) -> Result<RunReport, CoreError> {
        self.stage = Stage::Writing;
        let output_dir = config.settings.output_dir.clone();

        self.writer.set_labels(config.output_headers.clone());
        let receipt = self
            .writer
            .write(&output_dir, &records, run_key.as_deref())?;

        let template = if config.settings.template.enabled {
            self.write_templates(config, &records, &receipt.template_key)
        } else {
            TemplateOutcome::Disabled
        };

        info!(
            path = %receipt.path.display(),
            rows = receipt.rows_written,
            dropped,
            total,
            "roster processed"
        );

        Ok(RunReport {
            source,
            run_key,
            output_file: receipt.path,
            output_dir,
            rows_written: receipt.rows_written,
            dropped,
            total,
            appended: receipt.appended,
            template,
        })
    }

    fn write_templates(
        &mut self,
        config: &AppConfig,
        records: &[ProvisioningRecord],
        template_key: &str,
    ) -> TemplateOutcome {
        let text = &config.settings.template.text;
        let names: Vec<String> = records.iter().map(|r| r.display_name.clone()).collect();
        let usernames: Vec<String> = records.iter().map(|r| r.username.clone()).collect();
        let passwords: Vec<String> = records.iter().map(|r| r.password.clone()).collect();

        match self.templates.write(
            &config.settings.output_dir,
            &names,
            &usernames,
            &passwords,
            text,
            template_key,
        ) {
            Ok(report) => TemplateOutcome::Written(report),
            Err(e @ TemplateError::TextTooLong { .. }) => {
                warn!(
                    len = text.chars().count(),
                    "template text too long, trimming the stored text to {} characters",
                    template::MAX_TEMPLATE_CHARS
                );
                let trimmed = toml::Value::String(template::truncate(text));
                if let Err(update_err) = self.store.update_in("text", trimmed, Some("template")) {
                    error!(error = %update_err, "failed to store the trimmed template text");
                }
                TemplateOutcome::Failed(e.to_string())
            }
            Err(e) => {
                error!(error = %e, "template generation failed");
                TemplateOutcome::Failed(e.to_string())
            }
        }
    }
}

fn person(raw_name: &str, affiliation: &str) -> NormalizedPerson {
    let full_name = normalize(raw_name, true);
    let short = normalize(raw_name, false);
    if short == INVALID_NAME {
        warn!(name = %log_value(raw_name), "name has no usable parts");
    }
    let (first_name, last_name) = short
        .split_once(' ')
        .map(|(f, l)| (f.to_string(), l.to_string()))
        .unwrap_or_else(|| (short.clone(), short.clone()));

    NormalizedPerson {
        full_name,
        first_name,
        last_name,
        affiliation: affiliation.trim().to_lowercase(),
    }
}
