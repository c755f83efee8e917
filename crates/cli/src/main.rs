//! rosterbulk command-line tool.
//!
//! Turns roster files (CSV or XLSX) into bulk user provisioning CSV files,
//! and manages the settings, column mapping, and operating company domains
//! that drive the generation.

mod commands;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use rosterbulk_core::atomic::write_atomic;
use rosterbulk_core::config::{default_config_path, AppConfig};
use rosterbulk_core::password;

use commands::generate::GenerateOptions;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// rosterbulk command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "rosterbulk",
    version,
    about = "Generate bulk user provisioning CSV files from rosters"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print info-level logs to stderr as well as the log file.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default configuration file.
    Init {
        /// Overwrite an existing configuration file.
        #[arg(long)]
        force: bool,
    },

    /// Generate provisioning files from roster files.
    Generate {
        /// Roster files (.csv or .xlsx).
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Append every file to a single output file.
        #[arg(long)]
        flatten: bool,

        /// Run key; calls sharing it append to the same output file.
        #[arg(long)]
        upload_id: Option<String>,

        /// MIME hint, overriding detection from the file extension.
        #[arg(long)]
        mime: Option<String>,

        /// Print one JSON response per file.
        #[arg(long)]
        json: bool,
    },

    /// Generate a provisioning file from hand-entered people.
    Manual {
        /// Person as NAME=OPCO. Repeat for more people.
        #[arg(short, long = "entry", required = true)]
        entries: Vec<String>,

        /// Print a JSON response.
        #[arg(long)]
        json: bool,
    },

    /// Validate a roster file without writing anything.
    Check {
        /// Roster file (.csv or .xlsx).
        file: PathBuf,

        /// MIME hint, overriding detection from the file extension.
        #[arg(long)]
        mime: Option<String>,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print passwords generated from the configured policy.
    Password {
        /// Number of passwords.
        #[arg(short = 'n', long, default_value = "1")]
        count: u32,
    },

    /// Inspect and change settings.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Manage operating company domains.
    Opco {
        #[command(subcommand)]
        action: OpcoAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show the configuration file.
    Show,
    /// Set a value.
    Set {
        /// Key name, e.g. flatten_csv or length.
        key: String,
        /// New value.
        value: String,
        /// Only match the key inside this table, e.g. password.
        #[arg(long)]
        parent: Option<String>,
    },
    /// Map a logical column (opco, name, first_name, last_name) to a roster column.
    Headers {
        /// Logical column.
        logical: String,
        /// Column label as it appears in rosters.
        column: String,
    },
}

#[derive(Subcommand, Debug)]
enum OpcoAction {
    /// List all mappings.
    List,
    /// Add a mapping.
    Add {
        /// Operating company as it appears in rosters.
        key: String,
        /// Email domain, e.g. example.com.
        domain: String,
    },
    /// Remove a mapping.
    Remove {
        /// Operating company.
        key: String,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "command failed");
            eprintln!("{}", style::error(&format!("{:#}", e)));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let open_store = || commands::open_store(&config_path);

    match cli.command {
        Commands::Init { force } => cmd_init(&config_path, force),
        Commands::Generate {
            files,
            flatten,
            upload_id,
            mime,
            json,
        } => commands::generate::run_generate(
            open_store()?,
            GenerateOptions {
                files,
                flatten,
                upload_id,
                mime,
                json,
            },
        ),
        Commands::Manual { entries, json } => {
            commands::generate::run_manual(open_store()?, &entries, json)
        }
        Commands::Check { file, mime, json } => {
            commands::check::run_check(open_store()?, &file, mime.as_deref(), json)
        }
        Commands::Password { count } => cmd_password(&mut open_store()?, count),
        Commands::Config { action } => {
            let mut store = open_store()?;
            match action {
                ConfigAction::Show => commands::settings::run_show(&store),
                ConfigAction::Set { key, value, parent } => {
                    commands::settings::run_set(&mut store, &key, &value, parent.as_deref())
                }
                ConfigAction::Headers { logical, column } => {
                    commands::settings::run_headers(&mut store, &logical, &column)
                }
            }
        }
        Commands::Opco { action } => {
            let mut store = open_store()?;
            match action {
                OpcoAction::List => commands::opco::run_list(&store),
                OpcoAction::Add { key, domain } => {
                    commands::opco::run_add(&mut store, &key, &domain)
                }
                OpcoAction::Remove { key } => commands::opco::run_remove(&mut store, &key),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Set up an env-filtered subscriber with a quiet stderr layer and a daily
/// log file. The returned guard flushes the file writer on drop.
fn init_logging(verbose: bool) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_level = if verbose {
        LevelFilter::INFO
    } else {
        LevelFilter::WARN
    };
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .compact()
        .with_filter(stderr_level);

    let (file_layer, guard) = match log_appender() {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}

fn log_appender() -> Option<RollingFileAppender> {
    let dir = dirs::data_dir()?.join("rosterbulk").join("logs");
    std::fs::create_dir_all(&dir).ok()?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("rosterbulk")
        .filename_suffix("log")
        .build(&dir)
        .ok()
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "file already exists: {}. Use --force to overwrite it with defaults.",
            path.display()
        );
    }

    let defaults = AppConfig::default_table().context("failed to build default configuration")?;
    let contents = toml::to_string_pretty(&defaults).context("failed to render configuration")?;
    write_atomic(path, contents.as_bytes()).context("failed to write config file")?;

    // Re-open to make sure the written file loads cleanly.
    commands::open_store(path)?;

    println!(
        "{}",
        style::success(&format!("Default configuration written to {}", path.display()))
    );
    println!();
    println!("Next steps:");
    println!("  1. Map your operating companies: rosterbulk opco add <opco> <domain>");
    println!("  2. Match your roster columns:    rosterbulk config headers name \"<column>\"");
    println!("  3. Set the output directory:     rosterbulk config set output_dir <dir>");
    println!("  4. Dry run a roster:             rosterbulk check <file>");

    Ok(())
}

fn cmd_password(store: &mut rosterbulk_core::TomlStore, count: u32) -> Result<()> {
    let config = AppConfig::load(store).context("failed to read configuration")?;
    let policy = config.settings.password;
    for _ in 0..count {
        println!("{}", password::generate(Some(&policy)));
    }
    Ok(())
}
