//! Data models for the converter.
//!
//! - [`Settings`]: the seven persisted settings loaded from `config.yaml`
//! - [`SettingKey`] / [`SettingValue`]: key-based access used by [`ConfigManager`](crate::config::ConfigManager)
//! - [`SettingsForm`]: raw settings as entered by a user, validated on save
//! - [`AppState`]: session state held by [`StateManager`](crate::state::StateManager)

pub mod app_state;
pub mod config;

pub use app_state::AppState;
pub use config::{
    DEFAULT_LOG_MAX_LINES, DEFAULT_LOG_MAX_SIZE_MB, SettingKey, SettingValue, Settings,
    SettingsForm,
};
