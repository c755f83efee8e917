//! rosterbulk core library.
//!
//! This crate turns a roster of people and their operating companies into a
//! bulk user provisioning CSV: upload decoding, roster validation, name and
//! username normalization, password generation, crash-safe output writing
//! with multi-upload append ("flatten") support, and per-person onboarding
//! text files.

pub mod atomic;
pub mod config;
pub mod errors;
pub mod models;
pub mod names;
pub mod password;
pub mod processor;
pub mod store;
pub mod table;
pub mod template;
pub mod username;
pub mod validator;
pub mod writer;

// Re-exports for convenience.
pub use config::AppConfig;
pub use errors::CoreError;
pub use models::Response;
pub use processor::{ManualEntry, RosterProcessor, RunReport};
pub use store::{ConfigStore, TomlStore};
pub use table::{Cell, Table, Upload};
pub use writer::ProvisioningFileWriter;
