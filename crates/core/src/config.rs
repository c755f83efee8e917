//! Typed views over the configuration store.
//!
//! The store itself is an untyped TOML tree (see [`crate::store`]); this
//! module deserializes it into [`AppConfig`] with serde defaults for every
//! field, validates it, and produces the default tree used to seed a new
//! store.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{ConfigError, ValidationError};
use crate::password::PasswordPolicy;
use crate::store::ConfigStore;
use crate::template::MAX_TEMPLATE_CHARS;
use crate::username::{FormatSettings, OpcoMap};

/// Domain of the `default` opco entry in a fresh configuration.
pub const DEFAULT_DOMAIN: &str = "placeholder.com";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// The complete application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub settings: Settings,

    /// Logical column -> roster column.
    #[serde(default)]
    pub headers: HeaderMap,

    /// Affiliation -> email domain.
    #[serde(default = "default_opco")]
    pub opco: OpcoMap,

    /// Labels of the output CSV columns.
    #[serde(default)]
    pub output_headers: OutputHeaders,
}

fn default_opco() -> OpcoMap {
    OpcoMap::with_default(DEFAULT_DOMAIN)
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            headers: HeaderMap::default(),
            opco: default_opco(),
            output_headers: OutputHeaders::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// General behaviour settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Directory receiving generated CSV and template files.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Append consecutive uploads to a single output file.
    #[serde(default)]
    pub flatten_csv: bool,

    /// Read first and last names from two separate columns.
    #[serde(default)]
    pub two_name_column_support: bool,

    #[serde(default)]
    pub template: TemplateSettings,

    #[serde(default)]
    pub format: FormatSettings,

    #[serde(default)]
    pub password: PasswordPolicy,
}

fn default_output_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            flatten_csv: false,
            two_name_column_support: false,
            template: TemplateSettings::default(),
            format: FormatSettings::default(),
            password: PasswordPolicy::default(),
        }
    }
}

/// Per-person onboarding text settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub text: String,
}

// ---------------------------------------------------------------------------
// Header mapping
// ---------------------------------------------------------------------------

/// Mapping from logical column names to the labels used in the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderMap {
    #[serde(default = "default_opco_header")]
    pub opco: String,
    #[serde(default = "default_name_header")]
    pub name: String,
    #[serde(default = "default_first_name_header")]
    pub first_name: String,
    #[serde(default = "default_last_name_header")]
    pub last_name: String,
}

fn default_opco_header() -> String {
    "operating company".into()
}
fn default_name_header() -> String {
    "full name".into()
}
fn default_first_name_header() -> String {
    "first name".into()
}
fn default_last_name_header() -> String {
    "last name".into()
}

impl Default for HeaderMap {
    fn default() -> Self {
        Self {
            opco: default_opco_header(),
            name: default_name_header(),
            first_name: default_first_name_header(),
            last_name: default_last_name_header(),
        }
    }
}

impl HeaderMap {
    pub const LOGICAL_NAMES: [&'static str; 4] = ["opco", "name", "first_name", "last_name"];

    /// `(logical, column)` pairs for every key.
    pub fn all(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("opco", self.opco.as_str()),
            ("name", self.name.as_str()),
            ("first_name", self.first_name.as_str()),
            ("last_name", self.last_name.as_str()),
        ]
    }

    /// The pairs a roster must provide in the given name mode.
    pub fn active(&self, two_name_columns: bool) -> Vec<(&'static str, &str)> {
        self.all()
            .into_iter()
            .filter(|(logical, _)| match *logical {
                "name" => !two_name_columns,
                "first_name" | "last_name" => two_name_columns,
                _ => true,
            })
            .collect()
    }

    /// Replace the column of one logical name.
    pub fn set(&mut self, logical: &str, column: impl Into<String>) -> Result<(), ConfigError> {
        let slot = match logical {
            "opco" => &mut self.opco,
            "name" => &mut self.name,
            "first_name" => &mut self.first_name,
            "last_name" => &mut self.last_name,
            other => return Err(ConfigError::KeyNotFound(other.to_string())),
        };
        *slot = column.into();
        Ok(())
    }

    /// Fail when two of the given pairs point at the same column
    /// (case-insensitive). Every repeated column is reported once.
    pub fn check_distinct(pairs: &[(&str, &str)]) -> Result<(), ValidationError> {
        let mut seen: Vec<String> = Vec::with_capacity(pairs.len());
        let mut duplicates: Vec<String> = Vec::new();
        for (_, column) in pairs {
            let lower = column.trim().to_lowercase();
            if seen.contains(&lower) {
                if !duplicates.contains(&lower) {
                    duplicates.push(lower);
                }
            } else {
                seen.push(lower);
            }
        }
        if duplicates.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::DuplicateHeaderMapping { values: duplicates })
        }
    }
}

// ---------------------------------------------------------------------------
// Output header labels
// ---------------------------------------------------------------------------

/// Labels written in the header row of the provisioning CSV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputHeaders {
    #[serde(default = "default_name_label")]
    pub name: String,
    #[serde(default = "default_username_label")]
    pub username: String,
    #[serde(default = "default_password_label")]
    pub password: String,
    #[serde(default = "default_block_sign_in_label")]
    pub block_sign_in: String,
    #[serde(default = "default_first_name_label")]
    pub first_name: String,
    #[serde(default = "default_last_name_label")]
    pub last_name: String,
}

fn default_name_label() -> String {
    "Name [displayName] Required".into()
}
fn default_username_label() -> String {
    "User name [userPrincipalName] Required".into()
}
fn default_password_label() -> String {
    "Initial password [passwordProfile] Required".into()
}
fn default_block_sign_in_label() -> String {
    "Block sign in (Yes/No) [accountEnabled] Required".into()
}
fn default_first_name_label() -> String {
    "First name [givenName]".into()
}
fn default_last_name_label() -> String {
    "Last name [surname]".into()
}

impl Default for OutputHeaders {
    fn default() -> Self {
        Self {
            name: default_name_label(),
            username: default_username_label(),
            password: default_password_label(),
            block_sign_in: default_block_sign_in_label(),
            first_name: default_first_name_label(),
            last_name: default_last_name_label(),
        }
    }
}

impl OutputHeaders {
    /// Labels in column order.
    pub fn labels(&self) -> [&str; 6] {
        [
            &self.name,
            &self.username,
            &self.password,
            &self.block_sign_in,
            &self.first_name,
            &self.last_name,
        ]
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

/// Result of reading the typed configuration out of a store.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: AppConfig,
    /// The stored password policy was unusable and the default was used.
    pub password_reset: bool,
}

impl AppConfig {
    /// Deserialize the store contents.
    ///
    /// A password section that is missing, malformed or shorter than the
    /// minimum length is replaced by [`PasswordPolicy::default`] and the
    /// replacement is flagged in the returned [`LoadedConfig`].
    pub fn from_store(store: &dyn ConfigStore) -> Result<LoadedConfig, ConfigError> {
        let mut table = store.get_all().clone();

        let raw_policy = table
            .get_mut("settings")
            .and_then(toml::Value::as_table_mut)
            .and_then(|settings| settings.remove("password"));

        let mut config: AppConfig = toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError(e.to_string()))?;

        let policy = raw_policy
            .and_then(|value| value.try_into::<PasswordPolicy>().ok())
            .filter(PasswordPolicy::is_valid);

        let password_reset = policy.is_none();
        if password_reset {
            warn!("password settings are invalid or missing, using the default policy");
        }
        config.settings.password = policy.unwrap_or_default();

        debug!("configuration read from store");
        Ok(LoadedConfig {
            config,
            password_reset,
        })
    }

    /// Read the configuration, writing the default password policy back to
    /// the store when the stored one had to be replaced.
    pub fn load(store: &mut dyn ConfigStore) -> Result<Self, ConfigError> {
        let loaded = Self::from_store(store)?;
        if loaded.password_reset {
            let policy = toml::Value::try_from(PasswordPolicy::default())
                .map_err(|e| ConfigError::SerializeError(e.to_string()))?;
            match store.update_in("password", policy, Some("settings")) {
                Ok(()) => info!("password settings reset to defaults"),
                Err(ConfigError::KeyNotFound(_)) => {
                    warn!("no password section in the store to reset")
                }
                Err(e) => return Err(e),
            }
        }
        Ok(loaded.config)
    }

    /// Validate that all fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.settings.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "settings.output_dir".into(),
                detail: "output directory must not be empty".into(),
            });
        }
        if !self.settings.password.is_valid() {
            return Err(ConfigError::InvalidValue {
                field: "settings.password.length".into(),
                detail: format!(
                    "password length must be at least {}",
                    crate::password::MIN_LENGTH
                ),
            });
        }
        HeaderMap::check_distinct(&self.headers.all()).map_err(|e| {
            ConfigError::InvalidValue {
                field: "headers".into(),
                detail: e.to_string(),
            }
        })?;
        if !self.opco.has_default() {
            return Err(ConfigError::InvalidValue {
                field: "opco.default".into(),
                detail: "a default domain is required".into(),
            });
        }
        let text_len = self.settings.template.text.trim().chars().count();
        if text_len > MAX_TEMPLATE_CHARS {
            return Err(ConfigError::InvalidValue {
                field: "settings.template.text".into(),
                detail: format!("template text is {text_len} characters, the limit is {MAX_TEMPLATE_CHARS}"),
            });
        }
        Ok(())
    }

    /// The default configuration as a TOML tree, used to seed a new store.
    pub fn default_table() -> Result<toml::Table, ConfigError> {
        match toml::Value::try_from(AppConfig::default()) {
            Ok(toml::Value::Table(table)) => Ok(table),
            Ok(other) => Err(ConfigError::SerializeError(format!(
                "expected a table, got {}",
                other.type_str()
            ))),
            Err(e) => Err(ConfigError::SerializeError(e.to_string())),
        }
    }
}

/// Point a logical column at a new roster column, rejecting the change when
/// it would make two logical columns share a roster column.
pub fn update_header(
    store: &mut dyn ConfigStore,
    logical: &str,
    column: &str,
) -> Result<(), ConfigError> {
    let logical = logical.to_lowercase();
    let mut headers = AppConfig::from_store(store)?.config.headers;
    headers.set(&logical, column)?;
    HeaderMap::check_distinct(&headers.all()).map_err(|e| ConfigError::InvalidValue {
        field: format!("headers.{logical}"),
        detail: e.to_string(),
    })?;
    store.update_in(
        &logical,
        toml::Value::String(column.to_string()),
        Some("headers"),
    )
}

/// Default location of the configuration file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rosterbulk")
        .join("config.toml")
}
