//! # FocusFlow Core Library
//!
//! Session lifecycle and elapsed-time accounting for a personal focus timer.
//! Users create named sessions, start and pause them, accumulate focused
//! seconds toward a planned duration and track progress against a daily goal.
//! The `focusflow` CLI is a thin request layer over this crate.
//!
//! ## Architecture
//!
//! - **Session**: the entity, a pure time accountant computing each
//!   transition from a wall-clock timestamp, and [`SessionService`], which
//!   serializes mutation per session and persists every transition in one
//!   atomic step
//! - **Daily**: day-boundary bucketing and goal aggregation (progress,
//!   summary, streak) over per-day time records
//! - **Storage**: the [`SessionRepository`] contract, its SQLite
//!   implementation and TOML-based configuration
//! - **Events**: the tagged [`SessionEvent`] consumed from callers
//! - **Legacy**: import of sessions exported by older clients
//!
//! ## Key Components
//!
//! - [`SessionService`]: lifecycle state machine
//! - [`DailyGoalAggregator`]: daily goal progress
//! - [`SqliteSessionRepository`]: persistence
//! - [`Config`]: application configuration

pub mod daily;
pub mod error;
pub mod events;
pub mod legacy;
pub mod session;
pub mod storage;

pub use daily::{DailyGoalAggregator, DailySummary, DayBoundary, DayProgress, StreakReport};
pub use error::{ConfigError, CoreError, RepositoryError, SessionError, StorageError, ValidationError};
pub use events::{EventOutcome, EventType, SessionEvent};
pub use session::{
    Clock, CreateInput, ManualClock, PatchInput, Session, SessionId, SessionService, SessionState,
    SystemClock,
};
pub use storage::{Config, SessionRepository, SqliteSessionRepository};
