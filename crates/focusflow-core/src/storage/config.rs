//! TOML-based application configuration.
//!
//! Stores:
//! - Storage settings (database file, persistence timeout)
//! - Day boundary (reference UTC offset and day start time)
//! - Defaults for new sessions
//!
//! Configuration is stored at `<data_dir>/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::data_dir;
use crate::daily::DayBoundary;
use crate::error::ConfigError;

const CONFIG_FILE: &str = "config.toml";

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite file name, relative to the data directory unless absolute.
    #[serde(default = "default_database_file")]
    pub database_file: String,
    /// Upper bound for every repository call and lock wait.
    #[serde(default = "default_persist_timeout_ms")]
    pub persist_timeout_ms: u64,
}

/// Day boundary configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayConfig {
    #[serde(default)]
    pub utc_offset_minutes: i32,
    /// `HH:MM` at which a new day begins, e.g. "04:00".
    #[serde(default = "default_day_start")]
    pub day_start: String,
}

/// Values the CLI uses when `session add` leaves a field out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDefaults {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_initial_duration")]
    pub initial_duration: u32,
    #[serde(default = "default_daily_goal_minutes")]
    pub daily_goal_minutes: u32,
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub day: DayConfig,
    #[serde(default)]
    pub defaults: SessionDefaults,
}

fn default_database_file() -> String {
    "focusflow.db".into()
}
fn default_persist_timeout_ms() -> u64 {
    5000
}
fn default_day_start() -> String {
    "00:00".into()
}
fn default_title() -> String {
    "New Session".into()
}
fn default_initial_duration() -> u32 {
    1800
}
fn default_daily_goal_minutes() -> u32 {
    30
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_file: default_database_file(),
            persist_timeout_ms: default_persist_timeout_ms(),
        }
    }
}

impl Default for DayConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            day_start: default_day_start(),
        }
    }
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            title: default_title(),
            initial_duration: default_initial_duration(),
            daily_goal_minutes: default_daily_goal_minutes(),
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
        let mut current = root;
        while let Some(part) = parts.next() {
            if part.is_empty() {
                return Err(unknown());
            }
            if parts.peek().is_some() {
                current = current.get_mut(part).ok_or_else(unknown)?;
                continue;
            }

            let obj = current.as_object_mut().ok_or_else(unknown)?;
            let new_value = match obj.get(part).ok_or_else(unknown)? {
                serde_json::Value::Bool(_) => serde_json::Value::Bool(
                    value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                ),
                serde_json::Value::Number(_) => {
                    let n = value
                        .parse::<i64>()
                        .map_err(|_| invalid(format!("cannot parse '{value}' as integer")))?;
                    serde_json::Value::Number(n.into())
                }
                serde_json::Value::Object(_) => return Err(unknown()),
                _ => serde_json::Value::String(value.into()),
            };
            obj.insert(part.to_string(), new_value);
            return Ok(());
        }
        Err(unknown())
    }

    /// `config.toml` inside `dir`.
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(CONFIG_FILE)
    }

    /// Load from the data directory, writing defaults if no file exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be resolved, the file
    /// exists but cannot be parsed, or the default config cannot be written.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&data_dir()?)
    }

    /// Like [`Config::load`], for an explicit directory.
    pub fn load_from(dir: &Path) -> Result<Self, ConfigError> {
        let path = Self::path_in(dir);
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(dir)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path,
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&data_dir()?)
    }

    pub fn save_to(&self, dir: &Path) -> Result<(), ConfigError> {
        let path = Self::path_in(dir);
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.clone(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(&path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(_) => None,
            other => Some(other.to_string()),
        }
    }

    /// Every leaf key with its value, in `section.key` form.
    pub fn entries(&self) -> Vec<(String, String)> {
        let Ok(serde_json::Value::Object(sections)) = serde_json::to_value(self) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for (section, fields) in &sections {
            if let serde_json::Value::Object(fields) = fields {
                for (name, value) in fields {
                    let rendered = match value {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    out.push((format!("{section}.{name}"), rendered));
                }
            }
        }
        out
    }

    /// Set a config value by dot-separated key. Does not save.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value is invalid for it.
    /// The config is left unchanged on error.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Check cross-field constraints serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.persist_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "storage.persist_timeout_ms".into(),
                message: "must be positive".into(),
            });
        }
        if self.storage.database_file.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "storage.database_file".into(),
                message: "must not be empty".into(),
            });
        }
        self.day_boundary()?;
        Ok(())
    }

    pub fn day_boundary(&self) -> Result<DayBoundary, ConfigError> {
        let day_start =
            DayBoundary::parse_day_start(&self.day.day_start).map_err(|e| ConfigError::InvalidValue {
                key: "day.day_start".into(),
                message: e.to_string(),
            })?;
        DayBoundary::new(self.day.utc_offset_minutes, day_start).map_err(|e| {
            ConfigError::InvalidValue {
                key: "day.utc_offset_minutes".into(),
                message: e.to_string(),
            }
        })
    }

    pub fn persist_timeout(&self) -> Duration {
        Duration::from_millis(self.storage.persist_timeout_ms)
    }

    /// Database location, resolved against `dir` when relative.
    pub fn database_path(&self, dir: &Path) -> PathBuf {
        let file = Path::new(&self.storage.database_file);
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            dir.join(file)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
        assert_eq!(parsed.storage.persist_timeout_ms, 5000);
        assert_eq!(parsed.defaults.initial_duration, 1800);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: Config = toml::from_str("[day]\nday_start = \"04:00\"\n").unwrap();
        assert_eq!(parsed.day.day_start, "04:00");
        assert_eq!(parsed.day.utc_offset_minutes, 0);
        assert_eq!(parsed.storage.database_file, "focusflow.db");
    }

    #[test]
    fn get_by_dot_path() {
        let cfg = Config::default();
        assert_eq!(cfg.get("storage.persist_timeout_ms").as_deref(), Some("5000"));
        assert_eq!(cfg.get("defaults.title").as_deref(), Some("New Session"));
        assert_eq!(cfg.get("storage"), None);
        assert_eq!(cfg.get("nope.key"), None);
        assert_eq!(cfg.get(""), None);
    }

    #[test]
    fn set_by_dot_path() {
        let mut cfg = Config::default();
        cfg.set("day.utc_offset_minutes", "-300").unwrap();
        cfg.set("day.day_start", "04:30").unwrap();
        cfg.set("defaults.title", "Reading").unwrap();
        assert_eq!(cfg.day.utc_offset_minutes, -300);
        assert_eq!(cfg.defaults.title, "Reading");

        let boundary = cfg.day_boundary().unwrap();
        assert_eq!(boundary.day_start(), NaiveTime::from_hms_opt(4, 30, 0).unwrap());
        assert_eq!(boundary.offset().local_minus_utc(), -300 * 60);
    }

    #[test]
    fn set_rejects_unknown_keys_and_bad_values() {
        let mut cfg = Config::default();
        assert!(matches!(cfg.set("day.nope", "1"), Err(ConfigError::UnknownKey(_))));
        assert!(matches!(cfg.set("day", "1"), Err(ConfigError::UnknownKey(_))));
        assert!(matches!(
            cfg.set("storage.persist_timeout_ms", "soon"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            cfg.set("storage.persist_timeout_ms", "0"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            cfg.set("day.day_start", "25:00"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            cfg.set("defaults.initial_duration", "-5"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn entries_lists_every_leaf() {
        let entries = Config::default().entries();
        assert_eq!(entries.len(), 7);
        assert!(entries.contains(&("day.day_start".to_string(), "00:00".to_string())));
    }

    #[test]
    fn load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(dir.path()).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(Config::path_in(dir.path()).exists());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.set("storage.database_file", "other.db").unwrap();
        cfg.save_to(dir.path()).unwrap();
        let loaded = Config::load_from(dir.path()).unwrap();
        assert_eq!(loaded.storage.database_file, "other.db");
        assert_eq!(loaded.database_path(dir.path()), dir.path().join("other.db"));
    }

    #[test]
    fn malformed_file_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(Config::path_in(dir.path()), "storage = 3").unwrap();
        assert!(matches!(
            Config::load_from(dir.path()),
            Err(ConfigError::LoadFailed { .. })
        ));
    }
}
