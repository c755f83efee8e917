//! Subcommand implementations.
//!
//! generate, manual, check, config, opco.

pub mod check;
pub mod generate;
pub mod opco;
pub mod settings;

use std::path::Path;

use anyhow::{Context, Result};

use rosterbulk_core::config::AppConfig;
use rosterbulk_core::store::TomlStore;
use rosterbulk_core::table::Upload;

/// MIME hint sent for `.xlsx` files.
pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Open (and create if needed) the configuration store.
pub fn open_store(path: &Path) -> Result<TomlStore> {
    let defaults = AppConfig::default_table().context("failed to build default configuration")?;
    TomlStore::open(path, defaults)
        .with_context(|| format!("failed to open configuration at {}", path.display()))
}

/// MIME hint for a roster file, from its extension.
pub fn infer_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .as_deref()
    {
        Some("xlsx") => XLSX_MIME,
        Some("csv") => "text/csv",
        _ => "application/octet-stream",
    }
}

/// Read a roster file into an [`Upload`].
pub fn read_upload(path: &Path, mime: Option<&str>) -> Result<Upload> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    let mime = mime.unwrap_or_else(|| infer_mime(path));
    Ok(Upload::new(file_name, mime, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_mime() {
        assert_eq!(infer_mime(Path::new("roster.XLSX")), XLSX_MIME);
        assert_eq!(infer_mime(Path::new("a/b/roster.csv")), "text/csv");
        assert_eq!(infer_mime(Path::new("roster.pdf")), "application/octet-stream");
        assert_eq!(infer_mime(Path::new("roster")), "application/octet-stream");
    }

    #[test]
    fn test_read_upload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("people.csv");
        std::fs::write(&path, "full name\n").unwrap();

        let upload = read_upload(&path, None).unwrap();
        assert_eq!(upload.file_name, "people.csv");
        assert_eq!(upload.mime, "text/csv");

        let upload = read_upload(&path, Some("text/plain")).unwrap();
        assert_eq!(upload.mime, "text/plain");

        assert!(read_upload(&dir.path().join("missing.csv"), None).is_err());
    }

    #[test]
    fn test_open_store_creates_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rosterbulk").join("config.toml");
        open_store(&path).unwrap();
        assert!(path.exists());
    }
}
