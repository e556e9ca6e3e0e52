//! Integration tests for ConfigManager and config.yaml handling
//!
//! These tests verify:
//! - Defaults when the file is missing or corrupt
//! - Whole-file persistence on every change
//! - Directory normalization
//! - Form validation
//! - Integration with StateManager

use camino::Utf8PathBuf;
use peppolpdf::config::CONFIG_FILE_NAME;
use peppolpdf::{ConfigError, ConfigManager, SettingKey, SettingValue, Settings, SettingsForm, StateManager};
use std::fs;
use tempfile::TempDir;

fn create_test_config_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, config_path)
}

#[test]
fn test_missing_file_gives_defaults() {
    let (_temp_dir, config_dir) = create_test_config_dir();
    let manager = ConfigManager::new(&config_dir).unwrap();

    assert_eq!(manager.settings(), &Settings::default());
    assert!(!config_dir.join(CONFIG_FILE_NAME).exists());
}

#[test]
fn test_creates_missing_config_directory() {
    let (_temp_dir, root) = create_test_config_dir();
    let config_dir = root.join("nested").join("data");

    let manager = ConfigManager::new(&config_dir).unwrap();

    assert!(config_dir.is_dir());
    assert_eq!(manager.config_dir(), &config_dir);
}

#[test]
fn test_corrupt_file_gives_defaults() {
    let (_temp_dir, config_dir) = create_test_config_dir();
    fs::write(config_dir.join(CONFIG_FILE_NAME), "log_max_lines: [not, a, number\n").unwrap();

    let manager = ConfigManager::new(&config_dir).unwrap();

    assert_eq!(manager.settings(), &Settings::default());
}

#[test]
fn test_empty_file_gives_defaults() {
    let (_temp_dir, config_dir) = create_test_config_dir();
    fs::write(config_dir.join(CONFIG_FILE_NAME), "").unwrap();

    let manager = ConfigManager::new(&config_dir).unwrap();

    assert_eq!(manager.settings(), &Settings::default());
}

#[test]
fn test_set_persists_full_map() {
    let (_temp_dir, config_dir) = create_test_config_dir();
    let mut manager = ConfigManager::new(&config_dir).unwrap();

    assert!(manager.set(SettingKey::LogMaxLines, SettingValue::Integer(25)));

    let content = fs::read_to_string(config_dir.join(CONFIG_FILE_NAME)).unwrap();
    for key in SettingKey::ALL {
        assert!(content.contains(key.as_str()), "missing {} in {}", key, content);
    }

    let reloaded = ConfigManager::new(&config_dir).unwrap();
    assert_eq!(reloaded.settings().log_max_lines, 25);
    assert_eq!(reloaded.get(SettingKey::LogMaxLines), SettingValue::Integer(25));
}

#[test]
fn test_set_directory_becomes_absolute() {
    let (_temp_dir, config_dir) = create_test_config_dir();
    let mut manager = ConfigManager::new(&config_dir).unwrap();

    assert!(manager.set(
        SettingKey::OutputDirectory,
        SettingValue::Path("relative/out".to_string())
    ));

    let stored = manager.settings().output_directory.clone();
    assert!(Utf8PathBuf::from(&stored).is_absolute(), "{}", stored);
    assert!(stored.ends_with("out"));
}

#[test]
fn test_set_empty_directory_stays_empty() {
    let (_temp_dir, config_dir) = create_test_config_dir();
    let mut manager = ConfigManager::new(&config_dir).unwrap();

    assert!(manager.set(SettingKey::FailedDirectory, SettingValue::Path(String::new())));
    assert_eq!(manager.settings().failed_directory, "");
    assert!(manager.settings().failed_directory().is_none());
}

#[test]
fn test_no_temp_file_left_behind() {
    let (_temp_dir, config_dir) = create_test_config_dir();
    let mut manager = ConfigManager::new(&config_dir).unwrap();

    manager.set(SettingKey::LogSuccessfulFiles, SettingValue::Flag(true));

    let names: Vec<String> = fs::read_dir(&config_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec![CONFIG_FILE_NAME.to_string()]);
}

#[test]
fn test_save_form_valid() {
    let (_temp_dir, config_dir) = create_test_config_dir();
    let mut manager = ConfigManager::new(&config_dir).unwrap();

    let mut form = SettingsForm::from(manager.settings());
    form.log_max_size_mb = " 2.5 ".to_string();
    form.log_max_lines = "100".to_string();
    form.log_successful_files = true;

    let saved = manager.save_form(&form).unwrap();

    assert_eq!(saved.log_max_size_mb, 2.5);
    assert_eq!(saved.log_max_lines, 100);
    assert!(saved.log_successful_files);

    let reloaded = ConfigManager::new(&config_dir).unwrap();
    assert_eq!(reloaded.settings(), &saved);
}

#[test]
fn test_save_form_rejects_invalid_numbers_without_writing() {
    let (_temp_dir, config_dir) = create_test_config_dir();
    let mut manager = ConfigManager::new(&config_dir).unwrap();

    let mut form = SettingsForm::from(manager.settings());
    form.output_directory = "/somewhere".to_string();
    form.log_max_size_mb = "big".to_string();
    assert!(matches!(
        manager.save_form(&form),
        Err(ConfigError::InvalidLogSize(_))
    ));

    form.log_max_size_mb = "1".to_string();
    form.log_max_lines = "0".to_string();
    assert!(matches!(
        manager.save_form(&form),
        Err(ConfigError::InvalidLogLines(_))
    ));

    form.log_max_lines = "-3".to_string();
    assert!(manager.save_form(&form).is_err());

    assert_eq!(manager.settings(), &Settings::default());
    assert!(!config_dir.join(CONFIG_FILE_NAME).exists());
}

#[test]
fn test_hand_written_yaml_is_loaded() {
    let (_temp_dir, config_dir) = create_test_config_dir();
    fs::write(
        config_dir.join(CONFIG_FILE_NAME),
        "output_directory: /srv/pdf\nlog_max_size_mb: 0.5\nlog_successful_files: true\n",
    )
    .unwrap();

    let manager = ConfigManager::new(&config_dir).unwrap();

    assert_eq!(manager.settings().output_directory, "/srv/pdf");
    assert_eq!(manager.settings().log_max_size_mb, 0.5);
    assert!(manager.settings().log_successful_files);
    assert_eq!(manager.settings().log_max_lines, 10_000);
}

#[test]
fn test_settings_flow_into_state() {
    let (_temp_dir, config_dir) = create_test_config_dir();
    let mut manager = ConfigManager::new(&config_dir).unwrap();
    manager.set(
        SettingKey::InputDirectory,
        SettingValue::Path(config_dir.join("in").to_string()),
    );

    let state_manager = StateManager::new();
    state_manager.load_from_settings(manager.settings());

    assert_eq!(
        state_manager.read(|s| s.input_directory.clone()),
        Some(config_dir.join("in"))
    );
}
