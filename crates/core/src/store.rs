//! TOML-backed key/value configuration store.
//!
//! The pipeline only needs a small capability ([`ConfigStore`]): look a key
//! up somewhere in a nested tree, list everything, and replace a value.
//! [`TomlStore`] provides that over a single TOML file, restoring missing
//! defaults on open and persisting every change with an atomic replace.

use std::path::{Path, PathBuf};

use toml::{Table, Value};
use tracing::{debug, info, warn};

use crate::atomic::write_atomic;
use crate::errors::ConfigError;

/// Key/value configuration capability consumed by the pipeline.
pub trait ConfigStore {
    /// First value stored under `key`, optionally only inside `parent`.
    fn get_in(&self, key: &str, parent: Option<&str>) -> Option<&Value>;

    /// The whole configuration tree.
    fn get_all(&self) -> &Table;

    /// Replace the first value stored under `key`. Updating a key that does
    /// not exist is an error.
    fn update_in(&mut self, key: &str, value: Value, parent: Option<&str>)
        -> Result<(), ConfigError>;

    fn get(&self, key: &str) -> Option<&Value> {
        self.get_in(key, None)
    }

    fn update(&mut self, key: &str, value: Value) -> Result<(), ConfigError> {
        self.update_in(key, value, None)
    }
}

// ---------------------------------------------------------------------------
// Tree traversal
// ---------------------------------------------------------------------------

/// Depth-first search for `key`.
///
/// Entries are visited in file order and a table's own entry is checked
/// before descending into it, so the result is the first match in iteration
/// order rather than the shallowest one. With `parent` set, only keys whose
/// immediate parent table is named `parent` match.
pub fn find<'a>(table: &'a Table, key: &str, parent: Option<&str>) -> Option<&'a Value> {
    find_under(table, key, parent, None)
}

fn find_under<'a>(
    table: &'a Table,
    key: &str,
    parent: Option<&str>,
    current: Option<&str>,
) -> Option<&'a Value> {
    for (k, v) in table {
        if k == key && (parent.is_none() || parent == current) {
            return Some(v);
        }
        if let Value::Table(child) = v {
            if let Some(found) = find_under(child, key, parent, Some(k.as_str())) {
                return Some(found);
            }
        }
    }
    None
}

/// Mutable counterpart of [`find`] with the same tie-break.
pub fn find_mut<'a>(table: &'a mut Table, key: &str, parent: Option<&str>) -> Option<&'a mut Value> {
    find_under_mut(table, key, parent, None)
}

fn find_under_mut<'a>(
    table: &'a mut Table,
    key: &str,
    parent: Option<&str>,
    current: Option<&str>,
) -> Option<&'a mut Value> {
    for (k, v) in table.iter_mut() {
        if k == key && (parent.is_none() || parent == current) {
            return Some(v);
        }
        if let Value::Table(child) = v {
            if let Some(found) = find_under_mut(child, key, parent, Some(k.as_str())) {
                return Some(found);
            }
        }
    }
    None
}

/// Parse a command-line string into a value shaped like `like`.
pub fn coerce(raw: &str, like: &Value) -> Result<Value, ConfigError> {
    let invalid = |detail: String| ConfigError::InvalidValue {
        field: raw.to_string(),
        detail,
    };
    match like {
        Value::String(_) => Ok(Value::String(raw.to_string())),
        Value::Boolean(_) => raw
            .trim()
            .to_lowercase()
            .parse::<bool>()
            .map(Value::Boolean)
            .map_err(|_| invalid("expected true or false".into())),
        Value::Integer(_) => raw
            .trim()
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| invalid("expected an integer".into())),
        Value::Float(_) => raw
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| invalid("expected a number".into())),
        other => Err(invalid(format!("cannot set a {} from the command line", other.type_str()))),
    }
}

/// Lower-case every key in the tree. Returns true when anything changed.
fn lowercase_keys(table: &mut Table) -> bool {
    let mut changed = false;
    let entries: Vec<(String, Value)> = std::mem::take(table).into_iter().collect();
    for (key, mut value) in entries {
        if let Value::Table(child) = &mut value {
            changed |= lowercase_keys(child);
        }
        let lower = key.to_lowercase();
        if lower != key {
            changed = true;
        }
        table.insert(lower, value);
    }
    changed
}

/// Restore keys that are missing from `table` or hold a value of the wrong
/// type. Extra keys are left alone. Returns true when anything changed.
fn restore_defaults(table: &mut Table, defaults: &Table, path: &str) -> bool {
    let mut changed = false;
    for (key, default) in defaults {
        let full_key = if path.is_empty() {
            key.clone()
        } else {
            format!("{path}.{key}")
        };
        match table.get_mut(key) {
            None => {
                warn!(key = %full_key, "configuration key missing, restoring default");
                table.insert(key.clone(), default.clone());
                changed = true;
            }
            Some(current) if current.type_str() != default.type_str() => {
                warn!(
                    key = %full_key,
                    found = current.type_str(),
                    expected = default.type_str(),
                    "configuration value has the wrong type, restoring default"
                );
                *current = default.clone();
                changed = true;
            }
            Some(Value::Table(child)) => {
                if let Value::Table(default_child) = default {
                    changed |= restore_defaults(child, default_child, &full_key);
                }
            }
            Some(_) => {}
        }
    }
    changed
}

// ---------------------------------------------------------------------------
// TomlStore
// ---------------------------------------------------------------------------

/// A [`ConfigStore`] persisted as a TOML file.
#[derive(Debug, Clone)]
pub struct TomlStore {
    path: PathBuf,
    table: Table,
    defaults: Table,
}

impl TomlStore {
    /// Open the store at `path`, creating it from `defaults` when missing.
    pub fn open<P: AsRef<Path>>(path: P, defaults: Table) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        info!(path = %path.display(), "opening configuration store");

        if !path.exists() {
            info!(path = %path.display(), "configuration file not found, creating defaults");
            let store = Self {
                path,
                table: defaults.clone(),
                defaults,
            };
            store.save()?;
            return Ok(store);
        }

        let contents = std::fs::read_to_string(&path)?;
        let mut table: Table =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        let mut changed = lowercase_keys(&mut table);
        changed |= restore_defaults(&mut table, &defaults, "");

        let store = Self {
            path,
            table,
            defaults,
        };
        if changed {
            store.save()?;
        }
        debug!("configuration store loaded");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add `key` to the top-level table named `section`.
    pub fn insert(&mut self, section: &str, key: &str, value: Value) -> Result<(), ConfigError> {
        let key = key.to_lowercase();
        let table = self.section_mut(section)?;
        if table.contains_key(&key) {
            return Err(ConfigError::KeyExists(key));
        }
        table.insert(key.clone(), value);
        self.save()?;
        info!(section, key = %key, "configuration key added");
        Ok(())
    }

    /// Remove `key` from the top-level table named `section`. Keys that have
    /// a default cannot be removed.
    pub fn remove(&mut self, section: &str, key: &str) -> Result<Value, ConfigError> {
        let key = key.to_lowercase();
        let protected = self
            .defaults
            .get(section)
            .and_then(Value::as_table)
            .is_some_and(|t| t.contains_key(&key));
        if protected {
            return Err(ConfigError::ProtectedKey(key));
        }

        let removed = self
            .section_mut(section)?
            .remove(&key)
            .ok_or_else(|| ConfigError::KeyNotFound(key.clone()))?;
        self.save()?;
        info!(section, key = %key, "configuration key removed");
        Ok(removed)
    }

    /// Sections are addressed by their top-level name. A depth-first lookup
    /// would stop at `headers.opco` before reaching `[opco]`.
    fn section_mut(&mut self, section: &str) -> Result<&mut Table, ConfigError> {
        self.table
            .get_mut(section)
            .and_then(Value::as_table_mut)
            .ok_or_else(|| ConfigError::KeyNotFound(section.to_string()))
    }

    fn save(&self) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(&self.table).map_err(|e| ConfigError::SerializeError(e.to_string()))?;
        write_atomic(&self.path, contents.as_bytes())?;
        debug!(path = %self.path.display(), "configuration saved");
        Ok(())
    }
}

impl ConfigStore for TomlStore {
    fn get_in(&self, key: &str, parent: Option<&str>) -> Option<&Value> {
        find(&self.table, &key.to_lowercase(), parent)
    }

    fn get_all(&self) -> &Table {
        &self.table
    }

    fn update_in(
        &mut self,
        key: &str,
        value: Value,
        parent: Option<&str>,
    ) -> Result<(), ConfigError> {
        let key = key.to_lowercase();
        let slot = find_mut(&mut self.table, &key, parent)
            .ok_or_else(|| ConfigError::KeyNotFound(key.clone()))?;
        *slot = value;
        self.save()?;
        info!(key = %key, parent = ?parent, "configuration updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Table {
        toml::from_str(
            r#"
[settings]
output_dir = "/tmp/out"
flatten_csv = false

[settings.password]
length = 16

[headers]
name = "full name"
opco = "operating company"

[opco]
default = "placeholder.com"

[output_headers]
name = "Name [displayName] Required"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_open_creates_file_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let store = TomlStore::open(&path, defaults()).unwrap();
        assert!(path.exists());
        assert_eq!(store.get("flatten_csv"), Some(&Value::Boolean(false)));

        let reopened = TomlStore::open(&path, defaults()).unwrap();
        assert_eq!(reopened.get_all(), store.get_all());
    }

    #[test]
    fn test_open_restores_missing_and_mistyped_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[Settings]\nOutput_Dir = \"/data\"\nflatten_csv = \"yes\"\n\n[opco]\nacme = \"acme.com\"\n",
        )
        .unwrap();

        let store = TomlStore::open(&path, defaults()).unwrap();
        assert_eq!(
            store.get("output_dir"),
            Some(&Value::String("/data".into()))
        );
        assert_eq!(store.get("flatten_csv"), Some(&Value::Boolean(false)));
        assert_eq!(store.get_in("length", Some("password")), Some(&Value::Integer(16)));
        assert_eq!(
            store.get_in("default", Some("opco")),
            Some(&Value::String("placeholder.com".into()))
        );
        assert_eq!(
            store.get_in("acme", Some("opco")),
            Some(&Value::String("acme.com".into()))
        );

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("[settings]"));
        assert!(!written.contains("Output_Dir"));
    }

    #[test]
    fn test_invalid_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[settings\n").unwrap();
        assert!(matches!(
            TomlStore::open(&path, defaults()),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_get_respects_parent_and_order() {
        let table = defaults();
        // `name` exists under both headers and output_headers; headers comes first.
        assert_eq!(
            find(&table, "name", None),
            Some(&Value::String("full name".into()))
        );
        assert_eq!(
            find(&table, "name", Some("output_headers")),
            Some(&Value::String("Name [displayName] Required".into()))
        );
        assert!(find(&table, "name", Some("opco")).is_none());
        assert!(find(&table, "missing", None).is_none());
    }

    #[test]
    fn test_first_match_wins_over_shallow_match() {
        let table: Table = toml::from_str("[a]\nkey = 1\n\n[b]\n\n[key]\nx = 2\n").unwrap();
        assert_eq!(find(&table, "key", None), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_update_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut store = TomlStore::open(&path, defaults()).unwrap();

        store.update("flatten_csv", Value::Boolean(true)).unwrap();
        store
            .update_in("name", Value::String("employee".into()), Some("headers"))
            .unwrap();

        let reopened = TomlStore::open(&path, defaults()).unwrap();
        assert_eq!(reopened.get("flatten_csv"), Some(&Value::Boolean(true)));
        assert_eq!(
            reopened.get_in("name", Some("headers")),
            Some(&Value::String("employee".into()))
        );
        assert_eq!(
            reopened.get_in("name", Some("output_headers")),
            Some(&Value::String("Name [displayName] Required".into()))
        );
    }

    #[test]
    fn test_update_missing_key_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TomlStore::open(dir.path().join("c.toml"), defaults()).unwrap();
        assert!(matches!(
            store.update("nope", Value::Boolean(true)),
            Err(ConfigError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_insert_and_remove_opco() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TomlStore::open(dir.path().join("c.toml"), defaults()).unwrap();

        store
            .insert("opco", "ACME", Value::String("acme.com".into()))
            .unwrap();
        assert_eq!(
            store.get_in("acme", Some("opco")),
            Some(&Value::String("acme.com".into()))
        );
        assert!(matches!(
            store.insert("opco", "acme", Value::String("x.com".into())),
            Err(ConfigError::KeyExists(_))
        ));

        store.remove("opco", "acme").unwrap();
        assert!(store.get_in("acme", Some("opco")).is_none());

        assert!(matches!(
            store.remove("opco", "default"),
            Err(ConfigError::ProtectedKey(_))
        ));
        assert!(matches!(
            store.remove("opco", "ghost"),
            Err(ConfigError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_opco_sections_on_default_layout() {
        let dir = tempfile::tempdir().unwrap();
        let defaults = crate::config::AppConfig::default_table().unwrap();
        let mut store = TomlStore::open(dir.path().join("c.toml"), defaults.clone()).unwrap();

        store
            .insert("opco", "ACME", Value::String("acme.com".into()))
            .unwrap();
        assert_eq!(
            store.get_in("acme", Some("opco")),
            Some(&Value::String("acme.com".into()))
        );
        assert_eq!(
            store.get_in("opco", Some("headers")),
            defaults["headers"].get("opco")
        );

        assert!(matches!(
            store.remove("opco", "default"),
            Err(ConfigError::ProtectedKey(_))
        ));
        assert_eq!(store.remove("opco", "acme").unwrap(), Value::String("acme.com".into()));

        let reopened = TomlStore::open(store.path(), defaults).unwrap();
        assert!(reopened.get_in("acme", Some("opco")).is_none());
        assert!(reopened.get_in("default", Some("opco")).is_some());
    }

    #[test]
    fn test_coerce() {
        assert_eq!(
            coerce("TRUE", &Value::Boolean(false)).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(coerce("20", &Value::Integer(16)).unwrap(), Value::Integer(20));
        assert_eq!(
            coerce("lower", &Value::String("title".into())).unwrap(),
            Value::String("lower".into())
        );
        assert!(coerce("abc", &Value::Integer(1)).is_err());
        assert!(coerce("x", &Value::Table(Table::new())).is_err());
    }
}
