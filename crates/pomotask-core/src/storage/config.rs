//! TOML-based application configuration.
//!
//! Stores:
//! - Backend endpoints and credentials
//! - Timer knobs (tick interval, skew threshold, history length)
//! - Fallback session durations used while the backend is unreachable
//!
//! Configuration is stored at `~/.config/pomotask/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::data_dir;
use crate::error::ConfigError;
use crate::remote::http::{DEFAULT_SESSION_URL, DEFAULT_TASK_URL};
use crate::remote::HttpOptions;
use crate::session::{UserSettings, AUTO_COMPLETE_NOTE, DEFAULT_CUSTOM_DURATION_MIN};

/// Environment variable that overrides `backend.token`.
pub const TOKEN_ENV: &str = "POMOTASK_TOKEN";

/// Backend endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_session_url")]
    pub session_url: String,
    #[serde(default = "default_task_url")]
    pub task_url: String,
    /// Bearer token forwarded to both services.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Timer behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_skew_threshold_secs")]
    pub skew_threshold_secs: u64,
    /// How many past sessions the history side channel keeps.
    #[serde(default = "default_recent_sessions")]
    pub recent_sessions: usize,
    #[serde(default = "default_auto_complete_note")]
    pub auto_complete_note: String,
}

/// Session durations used when the session service cannot be reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_focus_duration")]
    pub focus_duration: u32,
    #[serde(default = "default_short_break")]
    pub short_break: u32,
    #[serde(default = "default_long_break")]
    pub long_break: u32,
    #[serde(default = "default_custom_duration")]
    pub custom_duration: u32,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/pomotask/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub timer: TimerConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

// Default functions
fn default_session_url() -> String {
    DEFAULT_SESSION_URL.into()
}
fn default_task_url() -> String {
    DEFAULT_TASK_URL.into()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_tick_interval_ms() -> u64 {
    1000
}
fn default_skew_threshold_secs() -> u64 {
    60
}
fn default_recent_sessions() -> usize {
    5
}
fn default_auto_complete_note() -> String {
    AUTO_COMPLETE_NOTE.into()
}
fn default_focus_duration() -> u32 {
    25
}
fn default_short_break() -> u32 {
    5
}
fn default_long_break() -> u32 {
    15
}
fn default_custom_duration() -> u32 {
    DEFAULT_CUSTOM_DURATION_MIN
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            session_url: default_session_url(),
            task_url: default_task_url(),
            token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            skew_threshold_secs: default_skew_threshold_secs(),
            recent_sessions: default_recent_sessions(),
            auto_complete_note: default_auto_complete_note(),
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            focus_duration: default_focus_duration(),
            short_break: default_short_break(),
            long_break: default_long_break(),
            custom_duration: default_custom_duration(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    // Unset optional strings.
                    serde_json::Value::Null if value.is_empty() => serde_json::Value::Null,
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// `config.toml` inside the data directory.
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be created.
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or write and return the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, creating it with defaults when missing.
    ///
    /// # Errors
    /// Same as [`Config::load`].
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    /// Persist to `path`.
    ///
    /// # Errors
    /// Same as [`Config::save`].
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Update a value in memory by dot-separated key.
    ///
    /// # Errors
    /// Returns an error if the key is unknown or the value does not parse
    /// as the field's type.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut json = serde_json::to_value(&*self).map_err(|e| invalid(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
        Ok(())
    }

    /// Set a config value by key and save. Returns error if key is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.apply(key, value)?;
        self.save()
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Token from the environment, falling back to the file.
    pub fn token(&self) -> Option<String> {
        std::env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.backend.token.clone().filter(|t| !t.is_empty()))
    }

    pub fn http_options(&self) -> HttpOptions {
        HttpOptions {
            token: self.token(),
            timeout: Duration::from_secs(self.backend.timeout_secs.max(1)),
            ..HttpOptions::default()
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.timer.tick_interval_ms.max(1))
    }

    pub fn skew_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.timer.skew_threshold_secs).unwrap_or(i64::MAX))
    }

    /// Settings to use until the session service answers.
    pub fn fallback_settings(&self) -> UserSettings {
        let defaults = UserSettings::default();
        let pick = |value: u32, fallback: u32| if value == 0 { fallback } else { value };
        UserSettings {
            focus_duration_minutes: pick(self.defaults.focus_duration, defaults.focus_duration_minutes),
            short_break_duration_minutes: pick(
                self.defaults.short_break,
                defaults.short_break_duration_minutes,
            ),
            long_break_duration_minutes: pick(
                self.defaults.long_break,
                defaults.long_break_duration_minutes,
            ),
        }
    }
}
