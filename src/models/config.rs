use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default audit log size cap in megabytes.
pub const DEFAULT_LOG_MAX_SIZE_MB: f64 = 10.0;

/// Default audit log record cap.
pub const DEFAULT_LOG_MAX_LINES: u64 = 10_000;

/// Persisted application settings from `config.yaml`.
///
/// Contains exactly the seven settings the converter understands. Empty
/// directory values mean "not configured" and are resolved to defaults by the
/// components that use them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub input_directory: String,
    pub output_directory: String,
    pub failed_directory: String,
    pub log_directory: String,
    pub log_max_size_mb: f64,
    pub log_max_lines: u64,
    pub log_successful_files: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input_directory: String::new(),
            output_directory: String::new(),
            failed_directory: String::new(),
            log_directory: String::new(),
            log_max_size_mb: DEFAULT_LOG_MAX_SIZE_MB,
            log_max_lines: DEFAULT_LOG_MAX_LINES,
            log_successful_files: false,
        }
    }
}

impl Settings {
    /// Configured directory for a key, or `None` when unset.
    pub fn directory(&self, key: SettingKey) -> Option<&Utf8Path> {
        let value = match key {
            SettingKey::InputDirectory => &self.input_directory,
            SettingKey::OutputDirectory => &self.output_directory,
            SettingKey::FailedDirectory => &self.failed_directory,
            SettingKey::LogDirectory => &self.log_directory,
            _ => return None,
        };

        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Utf8Path::new(trimmed))
        }
    }

    pub fn output_directory(&self) -> Option<&Utf8Path> {
        self.directory(SettingKey::OutputDirectory)
    }

    pub fn failed_directory(&self) -> Option<&Utf8Path> {
        self.directory(SettingKey::FailedDirectory)
    }

    /// Log directory to use for the audit log.
    ///
    /// Falls back to a `logs` directory next to the running executable, or a
    /// relative `logs` directory if the executable location is unknown.
    pub fn resolved_log_directory(&self) -> Utf8PathBuf {
        if let Some(dir) = self.directory(SettingKey::LogDirectory) {
            return dir.to_path_buf();
        }

        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
            .and_then(|dir| Utf8PathBuf::try_from(dir).ok())
            .map(|dir| dir.join("logs"))
            .unwrap_or_else(|| Utf8PathBuf::from("logs"))
    }

    /// Log size cap in bytes.
    pub fn log_max_bytes(&self) -> u64 {
        (self.log_max_size_mb * 1024.0 * 1024.0) as u64
    }

    pub fn get(&self, key: SettingKey) -> SettingValue {
        match key {
            SettingKey::InputDirectory => SettingValue::Path(self.input_directory.clone()),
            SettingKey::OutputDirectory => SettingValue::Path(self.output_directory.clone()),
            SettingKey::FailedDirectory => SettingValue::Path(self.failed_directory.clone()),
            SettingKey::LogDirectory => SettingValue::Path(self.log_directory.clone()),
            SettingKey::LogMaxSizeMb => SettingValue::Real(self.log_max_size_mb),
            SettingKey::LogMaxLines => SettingValue::Integer(self.log_max_lines),
            SettingKey::LogSuccessfulFiles => SettingValue::Flag(self.log_successful_files),
        }
    }
}

/// Names of the persisted settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    InputDirectory,
    OutputDirectory,
    FailedDirectory,
    LogDirectory,
    LogMaxSizeMb,
    LogMaxLines,
    LogSuccessfulFiles,
}

impl SettingKey {
    pub const ALL: [SettingKey; 7] = [
        SettingKey::InputDirectory,
        SettingKey::OutputDirectory,
        SettingKey::FailedDirectory,
        SettingKey::LogDirectory,
        SettingKey::LogMaxSizeMb,
        SettingKey::LogMaxLines,
        SettingKey::LogSuccessfulFiles,
    ];

    /// Key name as written in the configuration file.
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::InputDirectory => "input_directory",
            SettingKey::OutputDirectory => "output_directory",
            SettingKey::FailedDirectory => "failed_directory",
            SettingKey::LogDirectory => "log_directory",
            SettingKey::LogMaxSizeMb => "log_max_size_mb",
            SettingKey::LogMaxLines => "log_max_lines",
            SettingKey::LogSuccessfulFiles => "log_successful_files",
        }
    }

    /// Whether the key holds a directory path.
    pub fn is_directory(&self) -> bool {
        self.as_str().ends_with("_directory")
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SettingKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// A single setting value.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Path(String),
    Real(f64),
    Integer(u64),
    Flag(bool),
}

impl SettingValue {
    pub fn kind(&self) -> &'static str {
        match self {
            SettingValue::Path(_) => "path",
            SettingValue::Real(_) => "real",
            SettingValue::Integer(_) => "integer",
            SettingValue::Flag(_) => "flag",
        }
    }
}

/// Settings as entered on a configuration form.
///
/// Numeric fields are kept as raw text so that validation happens in one
/// place, [`crate::config::ConfigManager::save_form`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsForm {
    pub input_directory: String,
    pub output_directory: String,
    pub failed_directory: String,
    pub log_directory: String,
    pub log_max_size_mb: String,
    pub log_max_lines: String,
    pub log_successful_files: bool,
}

impl From<&Settings> for SettingsForm {
    fn from(settings: &Settings) -> Self {
        Self {
            input_directory: settings.input_directory.clone(),
            output_directory: settings.output_directory.clone(),
            failed_directory: settings.failed_directory.clone(),
            log_directory: settings.log_directory.clone(),
            log_max_size_mb: settings.log_max_size_mb.to_string(),
            log_max_lines: settings.log_max_lines.to_string(),
            log_successful_files: settings.log_successful_files,
        }
    }
}

impl SettingsForm {
    /// Overwrite one field with raw text.
    ///
    /// Numeric text is only checked on save. Flags accept
    /// `true/false`, `yes/no`, `on/off` and `1/0`.
    pub fn set_field(&mut self, key: SettingKey, raw: &str) -> Result<(), String> {
        let raw = raw.to_string();
        match key {
            SettingKey::InputDirectory => self.input_directory = raw,
            SettingKey::OutputDirectory => self.output_directory = raw,
            SettingKey::FailedDirectory => self.failed_directory = raw,
            SettingKey::LogDirectory => self.log_directory = raw,
            SettingKey::LogMaxSizeMb => self.log_max_size_mb = raw,
            SettingKey::LogMaxLines => self.log_max_lines = raw,
            SettingKey::LogSuccessfulFiles => {
                self.log_successful_files = match raw.trim().to_ascii_lowercase().as_str() {
                    "true" | "yes" | "on" | "1" => true,
                    "false" | "no" | "off" | "0" => false,
                    _ => return Err(format!("Invalid value for {}: {}", key, raw)),
                };
            }
        }
        Ok(())
    }
}
