mod config;
pub mod migrations;
mod repository;
mod sqlite;

pub use config::{Config, DayConfig, SessionDefaults, StorageConfig};
pub(crate) use repository::bounded;
pub use repository::SessionRepository;
pub use sqlite::SqliteSessionRepository;

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `$FOCUSFLOW_DATA_DIR`, else `~/.config/focusflow[-dev]/` based on
/// FOCUSFLOW_ENV.
///
/// Set FOCUSFLOW_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("FOCUSFLOW_DATA_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("FOCUSFLOW_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("focusflow-dev")
            } else {
                base_dir.join("focusflow")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
