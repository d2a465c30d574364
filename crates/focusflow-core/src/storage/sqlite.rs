//! SQLite-backed [`SessionRepository`].
//!
//! rusqlite is blocking, so every call runs on tokio's blocking pool against
//! a single shared connection. Every read of `sessions` is built by
//! [`live_sessions`], which is the only place the soft-delete filter lives.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use super::migrations;
use super::repository::SessionRepository;
use crate::daily::{DailyIncrement, TaskDailyTime};
use crate::error::{locked_or_query, RepositoryError, StorageError};
use crate::session::{Session, SessionDraft, SessionId, SessionState};

const SESSION_COLUMNS: &str = "id, user_id, title, initial_duration, focus_seconds, target_time_ms, \
     state, running_since_ms, daily_goal_minutes, no_goal, group_id, is_completed, is_deleted, \
     created_at, version";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// `SELECT` over non-deleted sessions, narrowed by `filter`.
fn live_sessions(filter: &str) -> String {
    format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE is_deleted = 0 AND {filter}")
}

#[derive(Clone)]
pub struct SqliteSessionRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSessionRepository {
    /// Open (or create) the database file at `path` and migrate it.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(|source| StorageError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::migrate(&conn).map_err(|e| StorageError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, E, F>(&self, f: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<StorageError> + Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, E> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut guard)
        })
        .await
        .map_err(|e| E::from(StorageError::Join(e.to_string())))?
    }
}

#[async_trait]
impl SessionRepository for SqliteSessionRepository {
    async fn get_all_for_user(&self, user_id: &str) -> Result<Vec<Session>, StorageError> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            let sql = live_sessions("user_id = ?1 ORDER BY created_at DESC, id DESC");
            let mut stmt = conn.prepare(&sql).map_err(locked_or_query)?;
            let rows = stmt
                .query_map(params![user_id], SessionRow::read)
                .map_err(locked_or_query)?;
            let mut sessions = Vec::new();
            for row in rows {
                sessions.push(row.map_err(locked_or_query)?.into_session()?);
            }
            Ok(sessions)
        })
        .await
    }

    async fn get_for_user(
        &self,
        user_id: &str,
        id: SessionId,
    ) -> Result<Option<Session>, StorageError> {
        let user_id = user_id.to_string();
        self.run(move |conn| load_live(conn, &user_id, id)).await
    }

    async fn create(&self, draft: SessionDraft) -> Result<Session, StorageError> {
        self.run(move |conn| {
            let created_at = Utc::now();
            conn.execute(
                "INSERT INTO sessions (user_id, title, initial_duration, focus_seconds, state,
                     daily_goal_minutes, no_goal, group_id, is_completed, created_at, version)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0)",
                params![
                    draft.user_id,
                    draft.title,
                    draft.initial_duration,
                    to_sql_u64(draft.focus_seconds, "focus_seconds")?,
                    SessionState::Paused.as_str(),
                    draft.daily_goal_minutes,
                    draft.no_goal,
                    draft.group_id,
                    draft.is_completed,
                    format_timestamp(created_at),
                ],
            )
            .map_err(locked_or_query)?;
            let id = SessionId(conn.last_insert_rowid());
            debug!(%id, user_id = %draft.user_id, "session row inserted");
            load_live(conn, &draft.user_id, id)?.ok_or(StorageError::Corrupt {
                column: "id",
                value: format!("inserted row {id} not readable"),
            })
        })
        .await
    }

    async fn update(
        &self,
        session: &Session,
        increments: &[DailyIncrement],
    ) -> Result<Session, RepositoryError> {
        let session = session.clone();
        let increments = increments.to_vec();
        self.run(move |conn| {
            let tx = conn.transaction().map_err(locked_or_query)?;
            let changed = tx
                .execute(
                    "UPDATE sessions SET
                         initial_duration   = ?1,
                         focus_seconds      = ?2,
                         target_time_ms     = ?3,
                         state              = ?4,
                         running_since_ms   = ?5,
                         daily_goal_minutes = ?6,
                         no_goal            = ?7,
                         is_completed       = ?8,
                         is_deleted         = ?9,
                         version            = version + 1
                     WHERE id = ?10 AND user_id = ?11 AND version = ?12 AND is_deleted = 0",
                    params![
                        session.initial_duration,
                        to_sql_u64(session.focus_seconds, "focus_seconds")?,
                        session.target_time_ms,
                        session.state.as_str(),
                        session.running_since_ms,
                        session.daily_goal_minutes,
                        session.no_goal,
                        session.is_completed,
                        session.is_deleted,
                        session.id.0,
                        session.user_id,
                        to_sql_u64(session.version, "version")?,
                    ],
                )
                .map_err(locked_or_query)?;

            if changed == 0 {
                let exists = tx
                    .query_row(
                        "SELECT 1 FROM sessions WHERE id = ?1 AND user_id = ?2 AND is_deleted = 0",
                        params![session.id.0, session.user_id],
                        |_| Ok(()),
                    )
                    .optional()
                    .map_err(locked_or_query)?;
                return Err(if exists.is_some() {
                    RepositoryError::Conflict
                } else {
                    RepositoryError::NotFound
                });
            }

            for inc in &increments {
                tx.execute(
                    "INSERT INTO task_daily_time (session_id, date, seconds_spent, goal_minutes)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(session_id, date)
                     DO UPDATE SET seconds_spent = seconds_spent + excluded.seconds_spent",
                    params![
                        session.id.0,
                        inc.date.format(DATE_FORMAT).to_string(),
                        to_sql_u64(inc.seconds, "seconds_spent")?,
                        inc.goal_minutes,
                    ],
                )
                .map_err(locked_or_query)?;
            }
            tx.commit().map_err(locked_or_query)?;

            let mut stored = session;
            stored.version += 1;
            Ok(stored)
        })
        .await
    }

    async fn delete(&self, user_id: &str, id: SessionId) -> Result<(), RepositoryError> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE sessions SET is_deleted = 1, version = version + 1
                     WHERE id = ?1 AND user_id = ?2 AND is_deleted = 0",
                    params![id.0, user_id],
                )
                .map_err(locked_or_query)?;
            if changed == 0 {
                return Err(RepositoryError::NotFound);
            }
            Ok(())
        })
        .await
    }

    async fn daily_times(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TaskDailyTime>, StorageError> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            let sql = format!(
                "SELECT t.id, t.session_id, t.date, t.seconds_spent, t.goal_minutes
                 FROM task_daily_time t
                 WHERE t.date BETWEEN ?2 AND ?3
                   AND t.session_id IN (SELECT id FROM ({}))
                 ORDER BY t.date, t.session_id",
                live_sessions("user_id = ?1")
            );
            let mut stmt = conn.prepare(&sql).map_err(locked_or_query)?;
            let rows = stmt
                .query_map(
                    params![
                        user_id,
                        from.format(DATE_FORMAT).to_string(),
                        to.format(DATE_FORMAT).to_string()
                    ],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, i64>(3)?,
                            row.get::<_, i64>(4)?,
                        ))
                    },
                )
                .map_err(locked_or_query)?;

            let mut buckets = Vec::new();
            for row in rows {
                let (id, session_id, date, seconds, goal) = row.map_err(locked_or_query)?;
                buckets.push(TaskDailyTime {
                    id,
                    session_id: SessionId(session_id),
                    date: NaiveDate::parse_from_str(&date, DATE_FORMAT).map_err(|_| {
                        StorageError::Corrupt {
                            column: "date",
                            value: date.clone(),
                        }
                    })?,
                    seconds_spent: from_sql_u64(seconds, "seconds_spent")?,
                    goal_minutes: from_sql_u32(goal, "goal_minutes")?,
                });
            }
            Ok(buckets)
        })
        .await
    }
}

fn load_live(
    conn: &Connection,
    user_id: &str,
    id: SessionId,
) -> Result<Option<Session>, StorageError> {
    let sql = live_sessions("id = ?1 AND user_id = ?2");
    conn.query_row(&sql, params![id.0, user_id], SessionRow::read)
        .optional()
        .map_err(locked_or_query)?
        .map(SessionRow::into_session)
        .transpose()
}

/// Raw column values, checked when converted into a [`Session`].
struct SessionRow {
    id: i64,
    user_id: String,
    title: String,
    initial_duration: i64,
    focus_seconds: i64,
    target_time_ms: Option<i64>,
    state: String,
    running_since_ms: Option<i64>,
    daily_goal_minutes: i64,
    no_goal: bool,
    group_id: i64,
    is_completed: bool,
    is_deleted: bool,
    created_at: String,
    version: i64,
}

impl SessionRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            initial_duration: row.get(3)?,
            focus_seconds: row.get(4)?,
            target_time_ms: row.get(5)?,
            state: row.get(6)?,
            running_since_ms: row.get(7)?,
            daily_goal_minutes: row.get(8)?,
            no_goal: row.get(9)?,
            group_id: row.get(10)?,
            is_completed: row.get(11)?,
            is_deleted: row.get(12)?,
            created_at: row.get(13)?,
            version: row.get(14)?,
        })
    }

    fn into_session(self) -> Result<Session, StorageError> {
        let state = self.state.parse::<SessionState>().map_err(|_| StorageError::Corrupt {
            column: "state",
            value: self.state.clone(),
        })?;
        if state == SessionState::Running && self.running_since_ms.is_none() {
            return Err(StorageError::Corrupt {
                column: "running_since_ms",
                value: "NULL for a running session".into(),
            });
        }
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| StorageError::Corrupt {
                column: "created_at",
                value: self.created_at.clone(),
            })?;
        Ok(Session {
            id: SessionId(self.id),
            user_id: self.user_id,
            title: self.title,
            initial_duration: from_sql_u32(self.initial_duration, "initial_duration")?,
            focus_seconds: from_sql_u64(self.focus_seconds, "focus_seconds")?,
            target_time_ms: self.target_time_ms,
            state,
            running_since_ms: self.running_since_ms,
            daily_goal_minutes: from_sql_u32(self.daily_goal_minutes, "daily_goal_minutes")?,
            no_goal: self.no_goal,
            group_id: self.group_id,
            is_completed: self.is_completed,
            is_deleted: self.is_deleted,
            created_at,
            version: from_sql_u64(self.version, "version")?,
        })
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn from_sql_u64(value: i64, column: &'static str) -> Result<u64, StorageError> {
    u64::try_from(value).map_err(|_| StorageError::Corrupt {
        column,
        value: value.to_string(),
    })
}

fn from_sql_u32(value: i64, column: &'static str) -> Result<u32, StorageError> {
    u32::try_from(value).map_err(|_| StorageError::Corrupt {
        column,
        value: value.to_string(),
    })
}

fn to_sql_u64(value: u64, column: &'static str) -> Result<i64, StorageError> {
    i64::try_from(value).map_err(|_| StorageError::Corrupt {
        column,
        value: value.to_string(),
    })
}
