//! Session lifecycle service.
//!
//! Each mutating operation runs the same sequence under the session's lock:
//! load the live row, ask the accountant for the new accounting fields at
//! "now", and persist the result (plus any per-day increments for a closed
//! running interval) in one repository call. Every repository call and every
//! lock wait is bounded by the persistence timeout.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::accountant::{compute_transition, AccountingEvent, Transition, TransitionError};
use super::clock::Clock;
use super::locks::{SessionGuard, SessionLocks};
use super::model::{CreateInput, PatchInput, Session, SessionDraft, SessionId};
use crate::daily::{DailyGoalAggregator, DailyIncrement, DayBoundary};
use crate::error::{from_repository, RepositoryError, SessionError};
use crate::events::{EventOutcome, SessionEvent};
use crate::storage::{bounded, SessionRepository};

pub struct SessionService<R: ?Sized, C> {
    repo: Arc<R>,
    clock: C,
    boundary: DayBoundary,
    locks: SessionLocks,
    persist_timeout: Duration,
}

impl<R, C> SessionService<R, C>
where
    R: SessionRepository + ?Sized,
    C: Clock,
{
    pub fn new(repo: Arc<R>, clock: C, boundary: DayBoundary, persist_timeout: Duration) -> Self {
        Self {
            repo,
            clock,
            boundary,
            locks: SessionLocks::new(),
            persist_timeout,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn boundary(&self) -> &DayBoundary {
        &self.boundary
    }

    /// An aggregator reading from the same repository with the same day boundary.
    pub fn aggregator(&self) -> DailyGoalAggregator<R> {
        DailyGoalAggregator::new(Arc::clone(&self.repo), self.boundary, self.persist_timeout)
    }

    /// Live sessions of `user_id`, newest first.
    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<Session>, SessionError> {
        Ok(bounded(
            "list sessions",
            self.persist_timeout,
            self.repo.get_all_for_user(user_id),
        )
        .await??)
    }

    pub async fn get_session(&self, user_id: &str, id: SessionId) -> Result<Session, SessionError> {
        self.load(user_id, id).await
    }

    /// Create a paused session with no accrued time.
    ///
    /// # Errors
    /// `Validation` for malformed input; `Timeout`/`Storage` from the repository.
    pub async fn add_session(
        &self,
        user_id: &str,
        input: CreateInput,
    ) -> Result<Session, SessionError> {
        let draft = input.into_draft(user_id)?;
        let session = self.create(draft).await?;
        info!(user_id, session_id = %session.id, title = %session.title, "session created");
        Ok(session)
    }

    /// Insert already-normalized drafts, e.g. from a legacy export.
    ///
    /// Drafts are inserted in order; a failure stops the import and keeps
    /// the sessions created so far.
    pub async fn import_drafts(
        &self,
        drafts: Vec<SessionDraft>,
    ) -> Result<Vec<Session>, SessionError> {
        let mut created = Vec::with_capacity(drafts.len());
        for draft in drafts {
            created.push(self.create(draft).await?);
        }
        info!(count = created.len(), "sessions imported");
        Ok(created)
    }

    /// Begin a running interval.
    ///
    /// Starting a running session returns it unchanged.
    ///
    /// # Errors
    /// `InvalidTransition` when the session is completed.
    pub async fn start(&self, user_id: &str, id: SessionId) -> Result<Session, SessionError> {
        self.transition(user_id, id, AccountingEvent::Start).await
    }

    /// Close the running interval, credit its whole seconds and record them
    /// in the day buckets. Pausing a paused session returns it unchanged.
    pub async fn pause(&self, user_id: &str, id: SessionId) -> Result<Session, SessionError> {
        self.transition(user_id, id, AccountingEvent::Pause).await
    }

    /// Change duration, goal or `no_goal`. Accrued focus time is kept.
    pub async fn edit(
        &self,
        user_id: &str,
        id: SessionId,
        patch: PatchInput,
    ) -> Result<Session, SessionError> {
        let patch = patch.validate()?;
        self.transition(user_id, id, AccountingEvent::Edit(patch)).await
    }

    /// Zero the accrued focus time. A running interval is closed and recorded first.
    pub async fn reset(&self, user_id: &str, id: SessionId) -> Result<Session, SessionError> {
        self.transition(user_id, id, AccountingEvent::Reset).await
    }

    /// Soft-delete a session. A running interval is closed and its time
    /// recorded in the same write that marks the row deleted.
    pub async fn delete_session(&self, user_id: &str, id: SessionId) -> Result<(), SessionError> {
        let guard = self.lock(id).await?;
        let session = self.load(user_id, id).await?;

        if session.is_running() {
            let now = self.clock.now_ms();
            let transition = compute_transition(&session, AccountingEvent::Pause, now)
                .map_err(|e| transition_error(id, AccountingEvent::Pause, e))?;
            let increments = self.increments(&session, &transition);
            let mut closed = transition.session;
            closed.is_deleted = true;
            self.persist(&closed, &increments).await?;
        } else {
            bounded(
                "delete session",
                self.persist_timeout,
                self.repo.delete(user_id, id),
            )
            .await?
            .map_err(|e| from_repository(id, e))?;
        }

        drop(guard);
        info!(user_id, session_id = %id, "session deleted");
        Ok(())
    }

    /// Route an event to its operation.
    pub async fn dispatch(
        &self,
        user_id: &str,
        event: SessionEvent,
    ) -> Result<EventOutcome, SessionError> {
        debug!(user_id, event = %event.event_type(), "dispatching event");
        let session = match event {
            SessionEvent::Start { session_id } => self.start(user_id, session_id).await?,
            SessionEvent::Pause { session_id } => self.pause(user_id, session_id).await?,
            SessionEvent::Edit { session_id, patch } => {
                self.edit(user_id, session_id, patch).await?
            }
            SessionEvent::Reset { session_id } => self.reset(user_id, session_id).await?,
            SessionEvent::AddSession { input } => self.add_session(user_id, input).await?,
            SessionEvent::DeleteSession { session_id } => {
                self.delete_session(user_id, session_id).await?;
                return Ok(EventOutcome::Deleted { session_id });
            }
        };
        Ok(EventOutcome::Updated { session })
    }

    async fn transition(
        &self,
        user_id: &str,
        id: SessionId,
        event: AccountingEvent,
    ) -> Result<Session, SessionError> {
        let _guard = self.lock(id).await?;
        let session = self.load(user_id, id).await?;
        let now = self.clock.now_ms();

        let transition =
            compute_transition(&session, event, now).map_err(|e| transition_error(id, event, e))?;
        if !transition.changed {
            debug!(session_id = %id, event = event.name(), "no-op transition");
            return Ok(transition.session);
        }

        let increments = self.increments(&session, &transition);
        let stored = self.persist(&transition.session, &increments).await?;
        debug!(
            session_id = %id,
            event = event.name(),
            state = %stored.state,
            focus_seconds = stored.focus_seconds,
            days = increments.len(),
            "transition persisted"
        );
        Ok(stored)
    }

    /// Day buckets for the interval a transition closed, snapshotting the
    /// goal that was in effect while it ran.
    fn increments(&self, before: &Session, transition: &Transition) -> Vec<DailyIncrement> {
        match transition.closed_interval {
            Some(interval) => self.boundary.split_interval(
                interval.start_ms,
                interval.end_ms,
                before.daily_goal().unwrap_or(0),
            ),
            None => Vec::new(),
        }
    }

    async fn lock(&self, id: SessionId) -> Result<SessionGuard<'_>, SessionError> {
        bounded(
            "acquire session lock",
            self.persist_timeout,
            self.locks.acquire(id),
        )
        .await
    }

    async fn load(&self, user_id: &str, id: SessionId) -> Result<Session, SessionError> {
        bounded(
            "load session",
            self.persist_timeout,
            self.repo.get_for_user(user_id, id),
        )
        .await??
        .ok_or(SessionError::NotFound { session_id: id })
    }

    async fn create(&self, draft: SessionDraft) -> Result<Session, SessionError> {
        Ok(bounded("create session", self.persist_timeout, self.repo.create(draft)).await??)
    }

    async fn persist(
        &self,
        session: &Session,
        increments: &[DailyIncrement],
    ) -> Result<Session, SessionError> {
        bounded(
            "update session",
            self.persist_timeout,
            self.repo.update(session, increments),
        )
        .await?
        .map_err(|e| {
            if matches!(e, RepositoryError::Conflict) {
                warn!(session_id = %session.id, version = session.version, "lost update race");
            }
            from_repository(session.id, e)
        })
    }
}

fn transition_error(id: SessionId, event: AccountingEvent, err: TransitionError) -> SessionError {
    match err {
        TransitionError::Completed => SessionError::InvalidTransition {
            session_id: id,
            event: event.name(),
            reason: "session is completed".into(),
        },
        TransitionError::Invalid(e) => SessionError::Validation(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daily::TaskDailyTime;
    use crate::error::StorageError;
    use crate::session::{ManualClock, SessionState};
    use crate::storage::SqliteSessionRepository;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Delegates to SQLite, optionally stalling or losing races on update.
    struct FaultyRepo {
        inner: SqliteSessionRepository,
        update_delay: Option<Duration>,
        conflicts_left: AtomicUsize,
    }

    #[async_trait]
    impl SessionRepository for FaultyRepo {
        async fn get_all_for_user(&self, user_id: &str) -> Result<Vec<Session>, StorageError> {
            self.inner.get_all_for_user(user_id).await
        }

        async fn get_for_user(
            &self,
            user_id: &str,
            id: SessionId,
        ) -> Result<Option<Session>, StorageError> {
            self.inner.get_for_user(user_id, id).await
        }

        async fn create(&self, draft: SessionDraft) -> Result<Session, StorageError> {
            self.inner.create(draft).await
        }

        async fn update(
            &self,
            session: &Session,
            increments: &[DailyIncrement],
        ) -> Result<Session, RepositoryError> {
            if let Some(delay) = self.update_delay {
                tokio::time::sleep(delay).await;
            }
            if self
                .conflicts_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(RepositoryError::Conflict);
            }
            self.inner.update(session, increments).await
        }

        async fn delete(&self, user_id: &str, id: SessionId) -> Result<(), RepositoryError> {
            self.inner.delete(user_id, id).await
        }

        async fn daily_times(
            &self,
            user_id: &str,
            from: NaiveDate,
            to: NaiveDate,
        ) -> Result<Vec<TaskDailyTime>, StorageError> {
            self.inner.daily_times(user_id, from, to).await
        }
    }

    const T0: i64 = 1_767_225_600_000; // 2026-01-01T00:00:00Z

    fn service() -> SessionService<SqliteSessionRepository, Arc<ManualClock>> {
        let repo = Arc::new(SqliteSessionRepository::open_in_memory().unwrap());
        SessionService::new(
            repo,
            Arc::new(ManualClock::new(T0)),
            DayBoundary::utc(),
            Duration::from_secs(5),
        )
    }

    fn faulty(
        update_delay: Option<Duration>,
        conflicts: usize,
        timeout: Duration,
    ) -> SessionService<FaultyRepo, Arc<ManualClock>> {
        let repo = Arc::new(FaultyRepo {
            inner: SqliteSessionRepository::open_in_memory().unwrap(),
            update_delay,
            conflicts_left: AtomicUsize::new(conflicts),
        });
        SessionService::new(repo, Arc::new(ManualClock::new(T0)), DayBoundary::utc(), timeout)
    }

    fn input(duration: i64) -> CreateInput {
        CreateInput {
            title: "Deep Work".into(),
            initial_duration: duration,
            daily_goal_minutes: 30,
            no_goal: false,
            group_id: 0,
        }
    }

    #[tokio::test]
    async fn start_pause_accrues_whole_seconds() {
        let svc = service();
        let s = svc.add_session("alice", input(1500)).await.unwrap();

        let running = svc.start("alice", s.id).await.unwrap();
        assert_eq!(running.state, SessionState::Running);
        assert_eq!(running.target_time_ms, Some(T0 + 1_500_000));

        svc.clock().advance(90_999);
        let paused = svc.pause("alice", s.id).await.unwrap();
        assert_eq!(paused.focus_seconds, 90);
        assert_eq!(paused.state, SessionState::Paused);
        assert_eq!(paused.target_time_ms, None);
        assert_eq!(paused.version, 2);
    }

    #[tokio::test]
    async fn no_op_transitions_do_not_write() {
        let svc = service();
        let s = svc.add_session("alice", input(1500)).await.unwrap();

        let paused = svc.pause("alice", s.id).await.unwrap();
        assert_eq!(paused.version, 0);

        svc.start("alice", s.id).await.unwrap();
        svc.clock().advance(5_000);
        let again = svc.start("alice", s.id).await.unwrap();
        assert_eq!(again.version, 1);
        assert_eq!(again.running_since_ms, Some(T0));
    }

    #[tokio::test]
    async fn foreign_and_missing_sessions_are_not_found() {
        let svc = service();
        let s = svc.add_session("alice", input(1500)).await.unwrap();

        let err = svc.start("bob", s.id).await.unwrap_err();
        assert!(matches!(err, SessionError::NotFound { .. }));
        let err = svc.pause("alice", SessionId(99)).await.unwrap_err();
        assert!(matches!(err, SessionError::NotFound { session_id: SessionId(99) }));
    }

    #[tokio::test]
    async fn completed_session_cannot_start() {
        let svc = service();
        let s = svc.add_session("alice", input(60)).await.unwrap();
        svc.start("alice", s.id).await.unwrap();
        svc.clock().advance(61_000);
        let done = svc.pause("alice", s.id).await.unwrap();
        assert!(done.is_completed);
        assert_eq!(done.focus_seconds, 61);

        let err = svc.start("alice", s.id).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_transition");
        let unchanged = svc.get_session("alice", s.id).await.unwrap();
        assert_eq!(unchanged.version, done.version);
    }

    #[tokio::test]
    async fn raising_duration_reopens_completed_session() {
        let svc = service();
        let s = svc.add_session("alice", input(60)).await.unwrap();
        svc.start("alice", s.id).await.unwrap();
        svc.clock().advance(60_000);
        svc.pause("alice", s.id).await.unwrap();

        let patch = PatchInput {
            initial_duration: Some(120),
            ..PatchInput::default()
        };
        let edited = svc.edit("alice", s.id, patch).await.unwrap();
        assert!(!edited.is_completed);
        assert_eq!(edited.focus_seconds, 60);
        svc.start("alice", s.id).await.unwrap();
    }

    #[tokio::test]
    async fn invalid_inputs_are_validation_errors() {
        let svc = service();
        let err = svc.add_session("alice", input(-1)).await.unwrap_err();
        assert_eq!(err.kind(), "validation");

        let s = svc.add_session("alice", input(60)).await.unwrap();
        let err = svc
            .edit("alice", s.id, PatchInput::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(svc.list_sessions("alice").await.unwrap().len() == 1);
    }

    #[tokio::test]
    async fn delete_running_session_records_open_interval() {
        let svc = service();
        let s = svc.add_session("alice", input(1500)).await.unwrap();
        svc.start("alice", s.id).await.unwrap();
        svc.clock().advance(120_000);
        svc.delete_session("alice", s.id).await.unwrap();

        let err = svc.get_session("alice", s.id).await.unwrap_err();
        assert!(matches!(err, SessionError::NotFound { .. }));
        let err = svc.delete_session("alice", s.id).await.unwrap_err();
        assert!(matches!(err, SessionError::NotFound { .. }));
        assert!(svc.locks.is_empty());
    }

    #[tokio::test]
    async fn dispatch_routes_events() {
        let svc = service();
        let outcome = svc
            .dispatch("alice", SessionEvent::AddSession { input: input(300) })
            .await
            .unwrap();
        let EventOutcome::Updated { session } = outcome else {
            panic!("expected a session");
        };
        let outcome = svc
            .dispatch("alice", SessionEvent::Start { session_id: session.id })
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            EventOutcome::Updated { session: Session { state: SessionState::Running, .. } }
        ));
        let outcome = svc
            .dispatch("alice", SessionEvent::DeleteSession { session_id: session.id })
            .await
            .unwrap();
        assert_eq!(outcome, EventOutcome::Deleted { session_id: session.id });
    }

    #[tokio::test]
    async fn slow_persistence_times_out() {
        let svc = faulty(
            Some(Duration::from_millis(500)),
            0,
            Duration::from_millis(50),
        );
        let s = svc.add_session("alice", input(1500)).await.unwrap();
        let err = svc.start("alice", s.id).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Timeout { operation: "update session", timeout_ms: 50 }
        ));
    }

    #[tokio::test]
    async fn lost_race_surfaces_conflict_without_retry() {
        let svc = faulty(None, 1, Duration::from_secs(5));
        let s = svc.add_session("alice", input(1500)).await.unwrap();

        let err = svc.start("alice", s.id).await.unwrap_err();
        assert_eq!(err.kind(), "conflict");
        let stored = svc.get_session("alice", s.id).await.unwrap();
        assert_eq!(stored.state, SessionState::Paused);
        assert_eq!(stored.version, 0);

        svc.start("alice", s.id).await.unwrap();
    }

    #[tokio::test]
    async fn import_keeps_draft_accounting() {
        let svc = service();
        let draft = SessionDraft {
            user_id: "alice".into(),
            title: "Old".into(),
            initial_duration: 1500,
            daily_goal_minutes: 20,
            no_goal: false,
            group_id: 0,
            focus_seconds: 300,
            is_completed: true,
        };
        let created = svc.import_drafts(vec![draft]).await.unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].focus_seconds, 300);
        assert!(created[0].is_completed);
        assert_eq!(created[0].state, SessionState::Paused);
    }
}
