//! Domain model types shared by the pipeline stages and the outer surfaces.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

// ---------------------------------------------------------------------------
// People
// ---------------------------------------------------------------------------

/// One surviving roster row after filtering and name normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPerson {
    /// `normalize(raw, keep_full = true)`: used for the display name column.
    pub full_name: String,
    /// First token of `normalize(raw, keep_full = false)`.
    pub first_name: String,
    /// Last token of `normalize(raw, keep_full = false)`.
    pub last_name: String,
    /// Lower-cased affiliation key.
    pub affiliation: String,
}

impl NormalizedPerson {
    /// The two-token `"First Last"` form used for username generation.
    pub fn short_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Per-row value for the block sign-in column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockSignIn {
    Yes,
    #[default]
    No,
}

impl fmt::Display for BlockSignIn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yes => write!(f, "Yes"),
            Self::No => write!(f, "No"),
        }
    }
}

/// A fully generated output row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningRecord {
    pub display_name: String,
    pub username: String,
    pub password: String,
    pub block_sign_in: BlockSignIn,
    pub first_name: String,
    pub last_name: String,
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// Outcome flag carried by every [`Response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    /// The main output was written but part of the run failed.
    Warning,
    Error,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Flat status + message value handed to outer surfaces (CLI, JSON output).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

impl Response {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: Status::Success,
            message: message.into(),
            output_file: None,
            output_dir: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: message.into(),
            output_file: None,
            output_dir: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Flatten an operation result into a response.
    pub fn from_result<T: Into<Response>>(result: Result<T, CoreError>) -> Self {
        match result {
            Ok(value) => value.into(),
            Err(e) => Self::from(&e),
        }
    }
}

impl From<&CoreError> for Response {
    fn from(err: &CoreError) -> Self {
        Self::error(err.user_message())
    }
}

/// Random lowercase hex id of at most 32 characters.
pub fn random_id(len: usize) -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(len);
    id
}

/// Truncate long values before they go into a log line.
pub fn log_value(value: &str) -> String {
    const MAX: usize = 200;
    match value.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &value[..idx]),
        None => value.to_string(),
    }
}
