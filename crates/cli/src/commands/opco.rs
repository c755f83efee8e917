//! Operating company -> domain mapping management.

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

use rosterbulk_core::config::AppConfig;
use rosterbulk_core::store::TomlStore;
use rosterbulk_core::username::DEFAULT_OPCO_KEY;

use crate::style;

/// List every mapping.
pub fn run_list(store: &TomlStore) -> Result<()> {
    let config = AppConfig::from_store(store)
        .context("failed to read configuration")?
        .config;

    println!();
    println!(
        "{}",
        style::header(&format!("Operating Companies ({})", config.opco.len()))
    );
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Opco", "Domain"]);
    for (key, domain) in config.opco.entries() {
        let key_cell = if key == DEFAULT_OPCO_KEY {
            Cell::new(format!("{key} (fallback)"))
        } else {
            Cell::new(key)
        };
        table.add_row(vec![key_cell, Cell::new(domain)]);
    }

    println!("{}", table);
    println!();
    Ok(())
}

/// Add a mapping; keys are stored lower-case.
pub fn run_add(store: &mut TomlStore, key: &str, domain: &str) -> Result<()> {
    let domain = domain.trim().trim_start_matches('@');
    if domain.is_empty() {
        anyhow::bail!("domain must not be empty");
    }
    store
        .insert("opco", key, toml::Value::String(domain.to_string()))
        .with_context(|| format!("failed to add opco '{}'", key))?;
    println!(
        "{}",
        style::success(&format!("{} -> {}", key.to_lowercase(), domain))
    );
    Ok(())
}

/// Remove a mapping. The fallback entry cannot be removed.
pub fn run_remove(store: &mut TomlStore, key: &str) -> Result<()> {
    store
        .remove("opco", key)
        .with_context(|| format!("failed to remove opco '{}'", key))?;
    println!(
        "{}",
        style::success(&format!("Removed {}", key.to_lowercase()))
    );
    Ok(())
}
