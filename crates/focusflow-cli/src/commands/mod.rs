pub mod config;
pub mod event;
pub mod import;
pub mod progress;
pub mod session;

use std::sync::Arc;

use focusflow_core::storage::data_dir;
use focusflow_core::{Clock, Config, SessionService, SqliteSessionRepository, SystemClock};
use serde::Serialize;

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

pub type Service = SessionService<SqliteSessionRepository, SystemClock>;

/// Loaded config plus a service over the configured database.
pub struct App {
    pub config: Config,
    pub service: Service,
}

impl App {
    pub fn open() -> Result<Self, Box<dyn std::error::Error>> {
        let dir = data_dir()?;
        let config = Config::load_from(&dir)?;
        let db_path = config.database_path(&dir);
        tracing::debug!(path = %db_path.display(), "opening session database");
        let repo = SqliteSessionRepository::open(&db_path)?;
        let service = SessionService::new(
            Arc::new(repo),
            SystemClock,
            config.day_boundary()?,
            config.persist_timeout(),
        );
        Ok(Self { config, service })
    }

    /// Today under the configured day boundary.
    pub fn today(&self) -> chrono::NaiveDate {
        self.service
            .boundary()
            .day_of(self.service.clock().now_ms())
    }
}

pub fn print_json<T: Serialize>(value: &T) -> CommandResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
