//! Error types for the rosterbulk core library.
//!
//! Each stage of the pipeline has its own error type derived with `thiserror`,
//! and a top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl CoreError {
    /// Message suitable for showing to the person who uploaded the roster.
    ///
    /// Filesystem failures are collapsed into a generic message; the full
    /// context is logged where the failure happens.
    pub fn user_message(&self) -> String {
        match self {
            Self::Write(_) => "Failed to write the output file, the issue has been logged".into(),
            other => other.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Input decoding errors
// ---------------------------------------------------------------------------

/// Errors raised while turning an upload into a [`crate::table::Table`].
#[derive(Debug, Error)]
pub enum InputError {
    /// The MIME hint names neither a spreadsheet nor a CSV file.
    #[error("Invalid file entered, only .csv and .xlsx are allowed")]
    UnsupportedType { mime: String },

    /// A data URL was missing its `,` separator or base64 payload.
    #[error("Invalid file entered, the upload payload is malformed")]
    MalformedPayload(String),

    /// The bytes could not be decoded as the announced format.
    #[error("An unknown error occurred while parsing {file_name}")]
    Decode { file_name: String, detail: String },
}

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

/// Structural problems with a roster found before any generation work.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Two logical columns point at the same roster column.
    #[error(
        "Duplicate {} \"{}\" found, cannot have duplicate values: header values must be updated",
        plural(.values.len(), "value", "values"),
        .values.join(", ")
    )]
    DuplicateHeaderMapping { values: Vec<String> },

    /// The roster itself repeats a column name.
    #[error(
        "Duplicate {}: {}",
        plural(.columns.len(), "column found in the file", "columns found in the file"),
        .columns.join(", ")
    )]
    DuplicateColumns { columns: Vec<String> },

    /// Mapped columns that the roster does not have.
    #[error(
        "File is missing {}: {}",
        plural(.columns.len(), "column header", "column headers"),
        .columns.join(", ")
    )]
    MissingColumns { columns: Vec<String> },
}

// ---------------------------------------------------------------------------
// Dataset errors
// ---------------------------------------------------------------------------

/// The roster has no usable rows.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DatasetError {
    #[error("File is empty")]
    Empty,

    #[error("File is empty after validation ({dropped}/{total} dropped rows), please correct the data")]
    EmptyAfterFiltering { dropped: usize, total: usize },
}

// ---------------------------------------------------------------------------
// Template errors
// ---------------------------------------------------------------------------

/// Whole-operation failures of the template writer. Per-row failures are
/// counted instead of raised.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Cannot have a text of over {max} characters (got {len})")]
    TextTooLong { len: usize, max: usize },

    #[error("Template data mismatch: {0}")]
    DataMismatch(String),

    #[error("failed to create template folder '{}': {source}", .path.display())]
    Folder {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Write errors
// ---------------------------------------------------------------------------

/// Filesystem failures while committing an output file.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("I/O error at '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to replace '{}': {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV encoding error: {0}")]
    Csv(#[from] csv::Error),

    #[error("output path '{}' has no parent directory", .0.display())]
    NoParent(PathBuf),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from loading, validating, and updating the configuration store.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// TOML serialization error.
    #[error("configuration serialize error: {0}")]
    SerializeError(String),

    /// The requested key is not present in the store.
    #[error("configuration key '{0}' does not exist")]
    KeyNotFound(String),

    /// An insert targeted a key that already exists.
    #[error("configuration key '{0}' already exists")]
    KeyExists(String),

    /// The key is a protected default and cannot be removed.
    #[error("configuration key '{0}' is required and cannot be removed")]
    ProtectedKey(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Failure while atomically replacing the config file.
    #[error("configuration write error: {0}")]
    Write(#[from] WriteError),

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

fn plural(count: usize, one: &'static str, many: &'static str) -> &'static str {
    if count == 1 {
        one
    } else {
        many
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = ValidationError::MissingColumns {
            columns: vec!["full name".into()],
        };
        assert_eq!(err.to_string(), "File is missing column header: full name");

        let err = ValidationError::MissingColumns {
            columns: vec!["full name".into(), "operating company".into()],
        };
        assert_eq!(
            err.to_string(),
            "File is missing column headers: full name, operating company"
        );

        let err = DatasetError::EmptyAfterFiltering {
            dropped: 3,
            total: 3,
        };
        assert!(err.to_string().contains("(3/3 dropped rows)"));

        let err = TemplateError::TextTooLong { len: 1251, max: 1250 };
        assert!(err.to_string().contains("1250"));
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let core_err: CoreError = DatasetError::Empty.into();
        assert!(matches!(core_err, CoreError::Dataset(_)));
        assert_eq!(core_err.user_message(), "File is empty");

        let write_err = WriteError::NoParent(PathBuf::from("/"));
        let core_err: CoreError = write_err.into();
        assert!(matches!(core_err, CoreError::Write(_)));
        assert!(!core_err.user_message().contains('/'));
    }
}
