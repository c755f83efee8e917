//! The provisioning CSV and its append ("flatten") state machine.
//!
//! Each output file starts with [`VERSION_MARKER`] on line 1 and the header
//! row on line 2. Writes that share a run key accumulate into the same file;
//! every write rebuilds the whole file and commits it with an atomic replace.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, error, info, warn};

use crate::atomic::write_atomic;
use crate::config::OutputHeaders;
use crate::errors::WriteError;
use crate::models::{random_id, BlockSignIn, ProvisioningRecord};

/// First line of every provisioning file.
pub const VERSION_MARKER: &str = "version:v1.0";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H%M%S";

/// Per-run-key output state.
#[derive(Debug, Clone)]
struct RunState {
    output_path: PathBuf,
    template_key: String,
    header_written: bool,
}

/// What a write produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    pub path: PathBuf,
    /// `<timestamp>-<id>` of the output file, shared by the run's template
    /// folder.
    pub template_key: String,
    pub rows_written: usize,
    /// Rows were appended to a file created by an earlier write.
    pub appended: bool,
}

/// Writes provisioning CSV files and remembers which run keys own which file.
#[derive(Debug, Default)]
pub struct ProvisioningFileWriter {
    runs: HashMap<String, RunState>,
    labels: OutputHeaders,
}

impl ProvisioningFileWriter {
    pub fn new(labels: OutputHeaders) -> Self {
        Self {
            runs: HashMap::new(),
            labels,
        }
    }

    /// Labels used for header rows written from now on.
    pub fn set_labels(&mut self, labels: OutputHeaders) {
        self.labels = labels;
    }

    /// Output file owned by `run_key`, if any.
    pub fn output_path(&self, run_key: &str) -> Option<&Path> {
        self.runs.get(run_key).map(|s| s.output_path.as_path())
    }

    /// Forget a run key so its next write starts a new file.
    pub fn forget(&mut self, run_key: &str) -> bool {
        self.runs.remove(run_key).is_some()
    }

    /// Write `records` for `run_key`.
    ///
    /// The first write for a key (or any write without a key) creates a new
    /// file in `output_dir`. Later writes for the same key append data rows
    /// to that file, whatever `output_dir` is at that point.
    pub fn write(
        &mut self,
        output_dir: &Path,
        records: &[ProvisioningRecord],
        run_key: Option<&str>,
    ) -> Result<WriteReceipt, WriteError> {
        let known = run_key.and_then(|key| self.runs.get(key)).cloned();
        let appended = known.is_some();

        let state = match known {
            Some(state) => state,
            None => {
                let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
                let id = random_id(8);
                RunState {
                    output_path: output_dir.join(format!("{timestamp}-bulk-{id}.csv")),
                    template_key: format!("{timestamp}-{id}"),
                    header_written: false,
                }
            }
        };
        let path = state.output_path.clone();

        let mut content = if state.header_written {
            match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(path = %path.display(), "output file disappeared, starting it again");
                    Vec::new()
                }
                Err(source) => {
                    error!(path = %path.display(), error = %source, "failed to read output file");
                    return Err(WriteError::Io { path, source });
                }
            }
        } else {
            Vec::new()
        };

        let needs_header = content.is_empty();
        if needs_header {
            content.extend_from_slice(VERSION_MARKER.as_bytes());
            content.push(b'\n');
        } else if !content.ends_with(b"\n") {
            content.push(b'\n');
        }

        let content = self.encode(content, records, needs_header, &path)?;

        if let Err(e) = write_atomic(&path, &content) {
            error!(path = %path.display(), error = %e, "failed to write provisioning file");
            return Err(e);
        }

        if let Some(key) = run_key {
            self.runs.insert(
                key.to_string(),
                RunState {
                    header_written: true,
                    ..state.clone()
                },
            );
        }

        info!(
            path = %path.display(),
            rows = records.len(),
            appended,
            "provisioning file written"
        );

        Ok(WriteReceipt {
            path,
            template_key: state.template_key,
            rows_written: records.len(),
            appended,
        })
    }

    fn encode(
        &self,
        buffer: Vec<u8>,
        records: &[ProvisioningRecord],
        with_header: bool,
        path: &Path,
    ) -> Result<Vec<u8>, WriteError> {
        let mut wtr = csv::Writer::from_writer(buffer);
        if with_header {
            wtr.write_record(self.labels.labels())?;
        }
        for record in records {
            let block = record.block_sign_in.to_string();
            wtr.write_record([
                record.display_name.as_str(),
                record.username.as_str(),
                record.password.as_str(),
                block.as_str(),
                record.first_name.as_str(),
                record.last_name.as_str(),
            ])?;
        }
        debug!(rows = records.len(), with_header, "records encoded");
        wtr.into_inner().map_err(|e| WriteError::Io {
            path: path.to_path_buf(),
            source: e.into_error(),
        })
    }
}

/// A block sign-in column of `count` rows: `overrides` first, `No` after.
///
/// Always returns a new vector; overrides beyond `count` are ignored.
pub fn block_sign_in(count: usize, overrides: &[BlockSignIn]) -> Vec<BlockSignIn> {
    let mut column = vec![BlockSignIn::No; count];
    for (slot, value) in column.iter_mut().zip(overrides) {
        *slot = *value;
    }
    column
}
