//! Per-person onboarding text files.

use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::atomic::write_atomic;
use crate::errors::TemplateError;
use crate::models::random_id;
use crate::names::title_case;

/// Longest accepted template text, in characters after trimming.
pub const MAX_TEMPLATE_CHARS: usize = 1250;

pub const NAME_PLACEHOLDER: &str = "[NAME]";
pub const USERNAME_PLACEHOLDER: &str = "[USERNAME]";
pub const PASSWORD_PLACEHOLDER: &str = "[PASSWORD]";

/// Outcome of a template batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateReport {
    pub created: usize,
    pub failed: usize,
    pub output_dir: PathBuf,
}

/// Substitute the placeholders of `text` for one person. Surrounding
/// whitespace is dropped from the result.
pub fn render(text: &str, name: &str, username: &str, password: &str) -> String {
    text.trim()
        .replace(NAME_PLACEHOLDER, &title_case(name))
        .replace(USERNAME_PLACEHOLDER, username)
        .replace(PASSWORD_PLACEHOLDER, password)
        .trim()
        .to_string()
}

/// Check a template text against [`MAX_TEMPLATE_CHARS`].
pub fn check_length(text: &str) -> Result<(), TemplateError> {
    let len = text.trim().chars().count();
    if len > MAX_TEMPLATE_CHARS {
        return Err(TemplateError::TextTooLong {
            len,
            max: MAX_TEMPLATE_CHARS,
        });
    }
    Ok(())
}

/// Cut `text` down to [`MAX_TEMPLATE_CHARS`] characters.
pub fn truncate(text: &str) -> String {
    text.chars().take(MAX_TEMPLATE_CHARS).collect()
}

/// Writes one text file per person under `<output_dir>/templates/`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateWriter;

impl TemplateWriter {
    /// Render `text` for every person into
    /// `<output_dir>/templates/templates-<run_key>/`.
    ///
    /// Nothing is written when the text is too long or the three sequences
    /// differ in length or are empty. A file that fails to write is counted
    /// in [`TemplateReport::failed`] and the batch carries on.
    pub fn write(
        &self,
        output_dir: &Path,
        names: &[String],
        usernames: &[String],
        passwords: &[String],
        text: &str,
        run_key: &str,
    ) -> Result<TemplateReport, TemplateError> {
        check_length(text)?;

        if names.is_empty() || names.len() != usernames.len() || names.len() != passwords.len() {
            return Err(TemplateError::DataMismatch(format!(
                "{} names, {} usernames, {} passwords",
                names.len(),
                usernames.len(),
                passwords.len()
            )));
        }

        let folder = output_dir
            .join("templates")
            .join(format!("templates-{run_key}"));
        std::fs::create_dir_all(&folder).map_err(|source| TemplateError::Folder {
            path: folder.clone(),
            source,
        })?;

        let mut created = 0;
        let mut failed = 0;
        for ((name, username), password) in names.iter().zip(usernames).zip(passwords) {
            let path = folder.join(format!("{}-{}.txt", file_stem(name), random_id(8)));
            let content = render(text, name, username, password);
            match write_atomic(&path, content.as_bytes()) {
                Ok(()) => created += 1,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "failed to write template file");
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            warn!(created, failed, "some template files could not be written");
        }
        info!(folder = %folder.display(), created, "template files written");
        debug!(run_key, "template batch complete");

        Ok(TemplateReport {
            created,
            failed,
            output_dir: folder,
        })
    }
}

/// File-system friendly version of a display name.
fn file_stem(name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "unnamed".into()
    } else {
        stem
    }
}
