//! Persistence contract consumed by the session service and the aggregator.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::warn;

use crate::daily::{DailyIncrement, TaskDailyTime};
use crate::error::{RepositoryError, SessionError, StorageError};
use crate::session::{Session, SessionDraft, SessionId};

/// Durable storage for sessions and their per-day time buckets.
///
/// No read ever returns a soft-deleted session, and no write touches one.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Live sessions of `user_id`, newest first.
    async fn get_all_for_user(&self, user_id: &str) -> Result<Vec<Session>, StorageError>;

    async fn get_for_user(
        &self,
        user_id: &str,
        id: SessionId,
    ) -> Result<Option<Session>, StorageError>;

    /// Insert a draft, returning it with id, creation time and version 0.
    async fn create(&self, draft: SessionDraft) -> Result<Session, StorageError>;

    /// Write the mutable fields of `session` if its stored version still
    /// equals `session.version`, and add `increments` to the session's day
    /// buckets in the same transaction. Returns the stored session with the
    /// bumped version.
    ///
    /// # Errors
    /// `NotFound` when the row is missing, foreign or deleted; `Conflict`
    /// when the version moved.
    async fn update(
        &self,
        session: &Session,
        increments: &[DailyIncrement],
    ) -> Result<Session, RepositoryError>;

    /// Soft-delete. `NotFound` if missing, foreign or already deleted.
    async fn delete(&self, user_id: &str, id: SessionId) -> Result<(), RepositoryError>;

    /// Buckets of the user's live sessions with `from <= date <= to`.
    async fn daily_times(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TaskDailyTime>, StorageError>;
}

/// Run `fut` with an upper bound, reporting a lapse as [`SessionError::Timeout`].
pub(crate) async fn bounded<T>(
    operation: &'static str,
    limit: Duration,
    fut: impl Future<Output = T>,
) -> Result<T, SessionError> {
    tokio::time::timeout(limit, fut).await.map_err(|_| {
        let timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
        warn!(operation, timeout_ms, "persistence step timed out");
        SessionError::Timeout {
            operation,
            timeout_ms,
        }
    })
}
