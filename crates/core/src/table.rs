//! In-memory roster tables and upload decoding.
//!
//! A [`Table`] is a rectangular grid of [`Cell`]s with named columns. Column
//! lookups are case-insensitive; the names themselves are kept as they were
//! in the file so duplicate detection can work on the raw headers.

use std::fmt;
use std::io::Cursor;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use calamine::{Data, Reader, Xlsx};
use tracing::{debug, error, info};

use crate::errors::InputError;

/// UTF-8 BOM bytes.
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

// ---------------------------------------------------------------------------
// Cells
// ---------------------------------------------------------------------------

/// One raw value from a roster.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Bool(bool),
    Empty,
}

impl Cell {
    /// Build a cell from a CSV field, typing numeric-looking fields as
    /// numbers the way spreadsheet readers do.
    pub fn from_field(field: &str) -> Self {
        let trimmed = field.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        if trimmed.chars().any(|c| c.is_ascii_digit()) {
            if let Ok(n) = trimmed.parse::<f64>() {
                return Self::Number(n);
            }
        }
        Self::Text(field.to_string())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Text content that is not blank.
    pub fn non_blank_text(&self) -> Option<&str> {
        self.as_text().filter(|s| !s.trim().is_empty())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Empty => Ok(()),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// A decoded roster.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Build a table, padding short rows with [`Cell::Empty`] and truncating
    /// long ones so every row matches the column count.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Cell::Empty);
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the first column whose name matches case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let wanted = name.to_lowercase();
        self.columns.iter().position(|c| c.to_lowercase() == wanted)
    }

    /// All cells of a column, in row order.
    pub fn column(&self, name: &str) -> Option<Vec<&Cell>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// Replace (or append) a column with the given cells.
    pub fn set_column(&mut self, name: &str, cells: Vec<Cell>) {
        let idx = match self.column_index(name) {
            Some(idx) => idx,
            None => {
                self.columns.push(name.to_string());
                for row in &mut self.rows {
                    row.push(Cell::Empty);
                }
                self.columns.len() - 1
            }
        };
        for (row, cell) in self.rows.iter_mut().zip(cells) {
            row[idx] = cell;
        }
    }

    /// Keep only the rows for which `keep` returns true.
    pub fn retain_rows<F: FnMut(&[Cell]) -> bool>(&mut self, mut keep: F) {
        self.rows.retain(|row| keep(row));
    }
}

// ---------------------------------------------------------------------------
// Uploads
// ---------------------------------------------------------------------------

/// Supported upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Spreadsheet,
    Csv,
}

impl UploadKind {
    /// Detect the format from a MIME hint by case-insensitive substring.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let lower = mime.to_lowercase();
        if lower.contains("spreadsheet") {
            Some(Self::Spreadsheet)
        } else if lower.contains("csv") {
            Some(Self::Csv)
        } else {
            None
        }
    }
}

/// A raw roster upload: file name, MIME hint, and bytes.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime: mime.into(),
            bytes,
        }
    }

    /// Parse a `data:<mime>;base64,<payload>` URL.
    pub fn from_data_url(file_name: impl Into<String>, data_url: &str) -> Result<Self, InputError> {
        let file_name = file_name.into();
        let (meta, payload) = data_url
            .split_once(',')
            .ok_or_else(|| InputError::MalformedPayload(file_name.clone()))?;

        let mime = meta
            .strip_prefix("data:")
            .unwrap_or(meta)
            .trim_end_matches(";base64")
            .to_string();

        let bytes = BASE64
            .decode(payload.trim())
            .map_err(|e| InputError::Decode {
                file_name: file_name.clone(),
                detail: e.to_string(),
            })?;

        Ok(Self {
            file_name,
            mime,
            bytes,
        })
    }

    /// Decode the upload into a [`Table`].
    pub fn decode(&self) -> Result<Table, InputError> {
        info!(file = %self.file_name, mime = %self.mime, "received file");

        let kind = UploadKind::from_mime(&self.mime).ok_or_else(|| InputError::UnsupportedType {
            mime: self.mime.clone(),
        })?;

        let result = match kind {
            UploadKind::Spreadsheet => decode_xlsx(&self.bytes),
            UploadKind::Csv => decode_csv(&self.bytes),
        };

        match result {
            Ok(table) => {
                info!(columns = ?table.columns(), rows = table.len(), "file decoded");
                Ok(table)
            }
            Err(detail) => {
                error!(file = %self.file_name, mime = %self.mime, %detail, "failed to parse file");
                Err(InputError::Decode {
                    file_name: self.file_name.clone(),
                    detail,
                })
            }
        }
    }
}

/// Decode delimited text with a header row.
pub fn decode_csv(data: &[u8]) -> Result<Table, String> {
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data);

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| format!("failed to read CSV headers: {e}"))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if columns.iter().all(String::is_empty) {
        return Err("CSV file has no header row".to_string());
    }

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|e| format!("failed to parse CSV row {}: {e}", idx + 2))?;
        rows.push(record.iter().map(Cell::from_field).collect());
    }

    debug!(rows = rows.len(), "CSV decoded");
    Ok(Table::new(columns, rows))
}

/// Decode the first worksheet of an `.xlsx` workbook; the first row is the
/// header.
pub fn decode_xlsx(data: &[u8]) -> Result<Table, String> {
    let mut workbook: Xlsx<_> =
        Xlsx::new(Cursor::new(data)).map_err(|e| format!("failed to open workbook: {e}"))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| "workbook has no worksheets".to_string())?
        .map_err(|e| format!("failed to read worksheet: {e}"))?;

    let mut grid = range.rows();
    let Some(header) = grid.next() else {
        return Ok(Table::default());
    };

    let columns: Vec<String> = header
        .iter()
        .enumerate()
        .map(|(i, cell)| match cell_from_data(cell) {
            Cell::Empty => format!("Unnamed: {i}"),
            other => other.to_string().trim().to_string(),
        })
        .collect();

    let rows: Vec<Vec<Cell>> = grid
        .map(|row| row.iter().map(cell_from_data).collect())
        .filter(|row: &Vec<Cell>| !row.iter().all(Cell::is_empty))
        .collect();

    debug!(rows = rows.len(), "worksheet decoded");
    Ok(Table::new(columns, rows))
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) if s.trim().is_empty() => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Bool(*b),
        other => Cell::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_from_field() {
        assert_eq!(Cell::from_field(""), Cell::Empty);
        assert_eq!(Cell::from_field("   "), Cell::Empty);
        assert_eq!(Cell::from_field("42"), Cell::Number(42.0));
        assert_eq!(Cell::from_field("John"), Cell::Text("John".into()));
        // Words that f64 would parse are still text.
        assert_eq!(Cell::from_field("Nan"), Cell::Text("Nan".into()));
        assert_eq!(Cell::from_field("inf"), Cell::Text("inf".into()));
    }

    #[test]
    fn test_table_pads_rows() {
        let table = Table::new(
            vec!["a".into(), "b".into()],
            vec![vec![Cell::from("1")], vec!["x".into(), "y".into(), "z".into()]],
        );
        assert_eq!(table.rows()[0].len(), 2);
        assert_eq!(table.rows()[0][1], Cell::Empty);
        assert_eq!(table.rows()[1].len(), 2);
    }

    #[test]
    fn test_column_lookup_is_case_insensitive() {
        let table = Table::new(
            vec!["Full Name".into(), "OPCO".into()],
            vec![vec!["John Doe".into(), "a".into()]],
        );
        assert_eq!(table.column_index("full name"), Some(0));
        assert_eq!(table.column_index("opco"), Some(1));
        assert!(table.column("missing").is_none());
        assert_eq!(table.column("Opco").unwrap()[0], &Cell::from("a"));
    }

    #[test]
    fn test_set_column_appends() {
        let mut table = Table::new(vec!["a".into()], vec![vec!["1".into()], vec!["2".into()]]);
        table.set_column("b", vec!["x".into(), "y".into()]);
        assert_eq!(table.columns(), &["a".to_string(), "b".to_string()]);
        assert_eq!(table.rows()[1][1], Cell::from("y"));
    }

    #[test]
    fn test_decode_csv() {
        let data = "\u{feff}Full Name,Operating Company\nJohn Doe,ACME\n\"Lee, Jane\",beta\n,\n";
        let table = decode_csv(data.as_bytes()).unwrap();
        assert_eq!(table.columns(), &["Full Name", "Operating Company"]);
        assert_eq!(table.len(), 3);
        assert_eq!(table.rows()[1][0], Cell::from("Lee, Jane"));
        assert_eq!(table.rows()[2][0], Cell::Empty);
    }

    #[test]
    fn test_decode_csv_keeps_duplicate_headers() {
        let table = decode_csv(b"name,name\na,b\n").unwrap();
        assert_eq!(table.columns(), &["name", "name"]);
    }

    #[test]
    fn test_upload_kind_from_mime() {
        assert_eq!(
            UploadKind::from_mime(
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            ),
            Some(UploadKind::Spreadsheet)
        );
        assert_eq!(UploadKind::from_mime("text/CSV"), Some(UploadKind::Csv));
        assert_eq!(UploadKind::from_mime("application/pdf"), None);
    }

    #[test]
    fn test_unsupported_upload() {
        let upload = Upload::new("roster.pdf", "application/pdf", b"%PDF".to_vec());
        assert!(matches!(
            upload.decode(),
            Err(InputError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_corrupt_spreadsheet() {
        let upload = Upload::new(
            "roster.xlsx",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            b"not a zip".to_vec(),
        );
        assert!(matches!(upload.decode(), Err(InputError::Decode { .. })));
    }

    #[test]
    fn test_data_url_upload() {
        let payload = BASE64.encode("full name,operating company\nJohn Doe,a\n");
        let url = format!("data:text/csv;base64,{payload}");
        let upload = Upload::from_data_url("roster.csv", &url).unwrap();
        assert_eq!(upload.mime, "text/csv");

        let table = upload.decode().unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0][0], Cell::from("John Doe"));
    }

    #[test]
    fn test_malformed_data_url() {
        assert!(matches!(
            Upload::from_data_url("x.csv", "no comma here"),
            Err(InputError::MalformedPayload(_))
        ));
        assert!(matches!(
            Upload::from_data_url("x.csv", "data:text/csv;base64,@@@"),
            Err(InputError::Decode { .. })
        ));
    }
}
