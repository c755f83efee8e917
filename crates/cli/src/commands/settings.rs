//! `config` subcommands: show, set, headers.

use anyhow::{Context, Result};

use rosterbulk_core::config::{self, AppConfig, HeaderMap};
use rosterbulk_core::errors::ConfigError;
use rosterbulk_core::password::MIN_LENGTH;
use rosterbulk_core::store::{self as config_store, ConfigStore, TomlStore};

use crate::style;

/// Print the stored configuration and whether it validates.
pub fn run_show(store: &TomlStore) -> Result<()> {
    let rendered = toml::to_string_pretty(store.get_all()).context("failed to render configuration")?;

    println!("{}", style::dim(&format!("# {}", store.path().display())));
    println!("{}", rendered);

    let loaded = AppConfig::from_store(store).context("failed to read configuration")?;
    if loaded.password_reset {
        println!(
            "{}",
            style::warn("password settings are invalid and will be reset to defaults on next use")
        );
    }
    match loaded.config.validate() {
        Ok(()) => println!("{}", style::success("Configuration is valid")),
        Err(e) => println!("{}", style::error(&e.to_string())),
    }
    Ok(())
}

/// Set a single value, coercing the input to the stored value's type.
///
/// The change is rolled back when the resulting configuration does not
/// validate.
pub fn run_set(store: &mut TomlStore, key: &str, raw: &str, parent: Option<&str>) -> Result<()> {
    let previous = store
        .get_in(key, parent)
        .cloned()
        .with_context(|| format!("unknown configuration key '{}'", key))?;
    let value = config_store::coerce(raw, &previous)?;

    store
        .update_in(key, value, parent)
        .with_context(|| format!("failed to update '{}'", key))?;

    let check = AppConfig::from_store(&*store).and_then(|loaded| {
        if loaded.password_reset {
            return Err(ConfigError::InvalidValue {
                field: "settings.password".into(),
                detail: format!("password length must be at least {}", MIN_LENGTH),
            });
        }
        loaded.config.validate()
    });
    if let Err(e) = check {
        store
            .update_in(key, previous, parent)
            .context("failed to roll back configuration change")?;
        anyhow::bail!("rejected '{}' = '{}': {}", key, raw, e);
    }

    println!("{}", style::success(&format!("{} = {}", key, raw)));
    Ok(())
}

/// Point a logical column at a roster column.
pub fn run_headers(store: &mut TomlStore, logical: &str, column: &str) -> Result<()> {
    if !HeaderMap::LOGICAL_NAMES.contains(&logical.to_lowercase().as_str()) {
        anyhow::bail!(
            "unknown column '{}', expected one of: {}",
            logical,
            HeaderMap::LOGICAL_NAMES.join(", ")
        );
    }
    config::update_header(store, logical, column)
        .with_context(|| format!("failed to update header '{}'", logical))?;
    println!(
        "{}",
        style::success(&format!("{} -> \"{}\"", logical.to_lowercase(), column))
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::open_store;

    #[test]
    fn test_set_coerces_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir.path().join("config.toml")).unwrap();

        run_set(&mut store, "flatten_csv", "true", None).unwrap();
        assert_eq!(store.get("flatten_csv"), Some(&toml::Value::Boolean(true)));

        run_set(&mut store, "length", "24", Some("password")).unwrap();
        assert!(run_set(&mut store, "length", "2", Some("password")).is_err());
        assert_eq!(
            store.get_in("length", Some("password")),
            Some(&toml::Value::Integer(24))
        );

        assert!(run_set(&mut store, "case", "shouting", Some("format")).is_err());
        assert!(run_set(&mut store, "nope", "1", None).is_err());
    }

    #[test]
    fn test_headers() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir.path().join("config.toml")).unwrap();

        run_headers(&mut store, "NAME", "Employee").unwrap();
        assert!(run_headers(&mut store, "opco", "employee").is_err());
        assert!(run_headers(&mut store, "nickname", "x").is_err());
    }
}
