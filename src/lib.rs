// PEPPOL PDF - extracts the PDF embedded in PEPPOL/UBL invoice documents
//
// This is the library crate containing the conversion pipeline.
// The binary crate (main.rs) is a command-line driver for it.

pub mod config;
pub mod input;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::{ConfigError, ConfigManager};
pub use metrics::Metrics;
pub use models::{AppState, SettingKey, SettingValue, Settings, SettingsForm};
pub use services::{
    Actor, AuditLogger, BatchResult, BatchRunner, ConversionService, DirectoryTracker,
};
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
