//! Structural checks on a decoded roster.

use tracing::{debug, warn};

use crate::config::HeaderMap;
use crate::errors::ValidationError;
use crate::table::{Cell, Table};

/// Check `table` against the active part of `headers`.
///
/// Checks run in order and the first failure is returned: duplicate header
/// mapping, duplicate roster columns, missing roster columns.
pub fn validate(
    table: &Table,
    headers: &HeaderMap,
    two_name_columns: bool,
) -> Result<(), ValidationError> {
    let active = headers.active(two_name_columns);
    HeaderMap::check_distinct(&active)?;

    let duplicates = duplicate_columns(table.columns());
    if !duplicates.is_empty() {
        warn!(columns = ?duplicates, "duplicate columns in roster");
        return Err(ValidationError::DuplicateColumns {
            columns: duplicates,
        });
    }

    let missing: Vec<String> = active
        .iter()
        .filter(|(_, column)| table.column_index(column).is_none())
        .map(|(_, column)| column.to_string())
        .collect();
    if !missing.is_empty() {
        warn!(columns = ?missing, "roster is missing mapped columns");
        return Err(ValidationError::MissingColumns { columns: missing });
    }

    debug!(two_name_columns, "roster structure validated");
    Ok(())
}

/// Column names that appear more than once, compared exactly.
fn duplicate_columns(columns: &[String]) -> Vec<String> {
    let mut duplicates: Vec<String> = Vec::new();
    for (i, column) in columns.iter().enumerate() {
        if columns[..i].contains(column) && !duplicates.contains(column) {
            duplicates.push(column.clone());
        }
    }
    duplicates
}

/// Build the combined name column from the first and last name columns.
///
/// Rows where either side is not text or is blank get an empty name, which
/// the row filter later drops.
pub fn synthesize_full_name(table: &mut Table, headers: &HeaderMap) {
    let (Some(first), Some(last)) = (
        table.column_index(&headers.first_name),
        table.column_index(&headers.last_name),
    ) else {
        return;
    };

    let combined: Vec<Cell> = table
        .rows()
        .iter()
        .map(|row| match (row[first].non_blank_text(), row[last].non_blank_text()) {
            (Some(f), Some(l)) => Cell::Text(format!("{} {}", f.trim(), l.trim())),
            _ => Cell::Empty,
        })
        .collect();

    table.set_column(&headers.name, combined);
    debug!(column = %headers.name, "combined name column built");
}
