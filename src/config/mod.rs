use crate::models::{SettingKey, SettingValue, Settings, SettingsForm};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use thiserror::Error;

/// File name of the persisted settings inside the configuration directory.
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Errors raised while changing settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Setting {key} expects a {expected} value, got {actual}")]
    KindMismatch {
        key: SettingKey,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Log size limit must be a positive number, got '{0}'")]
    InvalidLogSize(String),

    #[error("Log record limit must be a positive whole number, got '{0}'")]
    InvalidLogLines(String),

    #[error("Failed to resolve absolute path for {0}")]
    InvalidPath(String),

    #[error("Failed to save configuration: {0}")]
    Persist(#[source] anyhow::Error),
}

/// Configuration manager for the persisted converter settings.
///
/// Holds the in-memory [`Settings`] and rewrites `config.yaml` wholesale on
/// every change.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
    settings: Settings,
}

impl ConfigManager {
    /// Create a new ConfigManager and load the settings from `config_dir`.
    ///
    /// # Arguments
    /// * `config_dir` - Directory containing `config.yaml`
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        let mut manager = Self {
            config_path: config_dir.join(CONFIG_FILE_NAME),
            config_dir,
            settings: Settings::default(),
        };
        manager.settings = manager.load();

        Ok(manager)
    }

    /// Load settings from disk.
    ///
    /// Returns defaults when the file is absent or cannot be parsed; parse
    /// failures are logged.
    pub fn load(&self) -> Settings {
        if !self.config_path.exists() {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                self.config_path
            );
            return Settings::default();
        }

        let parsed = fs::read_to_string(&self.config_path)
            .with_context(|| format!("Failed to read config: {}", self.config_path))
            .and_then(|contents| {
                serde_yaml_ng::from_str::<Option<Settings>>(&contents)
                    .with_context(|| format!("Failed to parse config: {}", self.config_path))
            });

        match parsed {
            Ok(settings) => {
                tracing::info!("Loaded config from {}", self.config_path);
                settings.unwrap_or_default()
            }
            Err(e) => {
                tracing::error!("Error loading config: {:#}", e);
                Settings::default()
            }
        }
    }

    /// Current in-memory settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn get(&self, key: SettingKey) -> SettingValue {
        self.settings.get(key)
    }

    /// Value of `key`, or `default` when the key holds an empty directory.
    pub fn get_or(&self, key: SettingKey, default: SettingValue) -> SettingValue {
        match self.settings.get(key) {
            SettingValue::Path(path) if path.trim().is_empty() => default,
            value => value,
        }
    }

    /// Set one value and persist the full settings map.
    ///
    /// Directory values are normalized to absolute paths. Returns whether the
    /// value was accepted and the file was written.
    pub fn set(&mut self, key: SettingKey, value: SettingValue) -> bool {
        match self.try_set(key, value) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Error saving config: {}", e);
                false
            }
        }
    }

    fn try_set(&mut self, key: SettingKey, value: SettingValue) -> Result<(), ConfigError> {
        let mut updated = self.settings.clone();

        match (key, value) {
            (key, SettingValue::Path(path)) if key.is_directory() => {
                let path = normalize_directory(&path)?;
                match key {
                    SettingKey::InputDirectory => updated.input_directory = path,
                    SettingKey::OutputDirectory => updated.output_directory = path,
                    SettingKey::FailedDirectory => updated.failed_directory = path,
                    _ => updated.log_directory = path,
                }
            }
            (SettingKey::LogMaxSizeMb, SettingValue::Real(size)) => {
                updated.log_max_size_mb = validate_log_size(size, &size.to_string())?;
            }
            (SettingKey::LogMaxLines, SettingValue::Integer(lines)) => {
                updated.log_max_lines = validate_log_lines(lines, &lines.to_string())?;
            }
            (SettingKey::LogSuccessfulFiles, SettingValue::Flag(flag)) => {
                updated.log_successful_files = flag;
            }
            (key, value) => {
                return Err(ConfigError::KindMismatch {
                    key,
                    expected: self.settings.get(key).kind(),
                    actual: value.kind(),
                });
            }
        }

        self.persist(&updated)?;
        self.settings = updated;
        Ok(())
    }

    /// Validate a configuration form and persist it in one write.
    ///
    /// Nothing is saved if either numeric field is invalid.
    pub fn save_form(&mut self, form: &SettingsForm) -> Result<Settings, ConfigError> {
        let size_text = form.log_max_size_mb.trim();
        let size = size_text
            .parse::<f64>()
            .map_err(|_| ConfigError::InvalidLogSize(size_text.to_string()))?;
        let lines_text = form.log_max_lines.trim();
        let lines = lines_text
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidLogLines(lines_text.to_string()))?;

        let updated = Settings {
            input_directory: normalize_directory(&form.input_directory)?,
            output_directory: normalize_directory(&form.output_directory)?,
            failed_directory: normalize_directory(&form.failed_directory)?,
            log_directory: normalize_directory(&form.log_directory)?,
            log_max_size_mb: validate_log_size(size, size_text)?,
            log_max_lines: validate_log_lines(lines, lines_text)?,
            log_successful_files: form.log_successful_files,
        };

        self.persist(&updated)?;
        self.settings = updated.clone();

        tracing::info!(
            "Saved directories: input='{}', output='{}', failed='{}', log='{}'",
            updated.input_directory,
            updated.output_directory,
            updated.failed_directory,
            updated.log_directory
        );

        Ok(updated)
    }

    /// Rewrite the config file with the current settings.
    pub fn save(&self) -> bool {
        match self.persist(&self.settings) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Error saving config: {}", e);
                false
            }
        }
    }

    /// Serialize and replace the config file atomically.
    fn persist(&self, settings: &Settings) -> Result<(), ConfigError> {
        let write = || -> Result<()> {
            let yaml_string = serde_yaml_ng::to_string(settings)
                .context("Failed to serialize config to YAML")?;

            let temp_path = self.config_path.with_extension("yaml.tmp");
            fs::write(&temp_path, yaml_string)
                .with_context(|| format!("Failed to write config: {}", temp_path))?;
            fs::rename(&temp_path, &self.config_path)
                .with_context(|| format!("Failed to replace config: {}", self.config_path))?;

            Ok(())
        };

        write().map_err(ConfigError::Persist)?;
        tracing::info!("Saved config to {}", self.config_path);
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    /// Get the configuration file path.
    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }
}

fn normalize_directory(value: &str) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(String::new());
    }

    let absolute = std::path::absolute(trimmed)
        .ok()
        .and_then(|path| Utf8PathBuf::try_from(path).ok())
        .ok_or_else(|| ConfigError::InvalidPath(trimmed.to_string()))?;

    Ok(absolute.into_string())
}

fn validate_log_size(size: f64, raw: &str) -> Result<f64, ConfigError> {
    if size.is_finite() && size > 0.0 {
        Ok(size)
    } else {
        Err(ConfigError::InvalidLogSize(raw.to_string()))
    }
}

fn validate_log_lines(lines: u64, raw: &str) -> Result<u64, ConfigError> {
    if lines > 0 {
        Ok(lines)
    } else {
        Err(ConfigError::InvalidLogLines(raw.to_string()))
    }
}
