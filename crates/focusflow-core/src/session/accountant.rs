//! Elapsed-time accounting.
//!
//! Pure functions translating a lifecycle event plus a wall-clock timestamp
//! into the new accounting fields of a session. No I/O happens here; the
//! caller persists the result.
//!
//! ## State Transitions
//!
//! ```text
//! Paused --start--> Running --pause--> Paused
//!   ^                  |
//!   +------reset-------+
//! ```
//!
//! Time is tracked in whole seconds. The sub-second remainder of each
//! running interval is dropped rather than carried.

use serde::{Deserialize, Serialize};

use super::model::{whole_seconds_between, Session, SessionPatch, SessionState};
use crate::error::ValidationError;

/// Event understood by the accountant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountingEvent {
    Start,
    Pause,
    Edit(SessionPatch),
    Reset,
}

impl AccountingEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AccountingEvent::Start => "start",
            AccountingEvent::Pause => "pause",
            AccountingEvent::Edit(_) => "edit",
            AccountingEvent::Reset => "reset",
        }
    }
}

/// A running interval closed by a transition, in ms since epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedInterval {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl ClosedInterval {
    pub fn whole_seconds(&self) -> u64 {
        whole_seconds_between(self.start_ms, self.end_ms)
    }
}

/// Outcome of [`compute_transition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// The session with its new accounting fields.
    pub session: Session,
    /// Running interval that this transition closed, if any.
    pub closed_interval: Option<ClosedInterval>,
    /// False for idempotent no-ops; nothing needs to be written.
    pub changed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("session is completed")]
    Completed,
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Compute the effect of `event` on `session` at `now_ms`.
///
/// # Errors
/// [`TransitionError::Completed`] when starting a completed session,
/// [`TransitionError::Invalid`] when an edit leaves the session inconsistent.
pub fn compute_transition(
    session: &Session,
    event: AccountingEvent,
    now_ms: i64,
) -> Result<Transition, TransitionError> {
    let mut next = session.clone();

    match event {
        AccountingEvent::Start => {
            if session.is_running() {
                return Ok(unchanged(session));
            }
            if session.is_completed {
                return Err(TransitionError::Completed);
            }
            next.state = SessionState::Running;
            next.running_since_ms = Some(now_ms);
            next.target_time_ms = project_target(&next, now_ms);
            Ok(Transition {
                session: next,
                closed_interval: None,
                changed: true,
            })
        }
        AccountingEvent::Pause => {
            if !session.is_running() {
                return Ok(unchanged(session));
            }
            let closed = close_interval(&mut next, now_ms);
            next.is_completed = reached_duration(&next);
            Ok(Transition {
                session: next,
                closed_interval: closed,
                changed: true,
            })
        }
        AccountingEvent::Edit(patch) => {
            patch.apply_to(&mut next)?;
            match (next.state, next.running_since_ms) {
                (SessionState::Running, Some(since)) => {
                    next.target_time_ms = project_target(&next, since);
                }
                _ => {
                    next.target_time_ms = None;
                    next.is_completed = reached_duration(&next);
                }
            }
            let changed = next != *session;
            Ok(Transition {
                session: next,
                closed_interval: None,
                changed,
            })
        }
        AccountingEvent::Reset => {
            let closed = close_interval(&mut next, now_ms);
            next.focus_seconds = 0;
            next.is_completed = false;
            let changed = next != *session;
            Ok(Transition {
                session: next,
                closed_interval: closed,
                changed,
            })
        }
    }
}

fn unchanged(session: &Session) -> Transition {
    Transition {
        session: session.clone(),
        closed_interval: None,
        changed: false,
    }
}

/// Flush the live interval into `focus_seconds` and leave the session paused.
fn close_interval(session: &mut Session, now_ms: i64) -> Option<ClosedInterval> {
    let closed = match (session.state, session.running_since_ms) {
        (SessionState::Running, Some(since)) => {
            let interval = ClosedInterval {
                start_ms: since,
                end_ms: now_ms.max(since),
            };
            session.focus_seconds += interval.whole_seconds();
            Some(interval)
        }
        _ => None,
    };
    session.state = SessionState::Paused;
    session.running_since_ms = None;
    session.target_time_ms = None;
    closed
}

/// Instant the goal duration is reached if the session runs uninterrupted
/// from `since_ms` with its currently accrued focus time.
fn project_target(session: &Session, since_ms: i64) -> Option<i64> {
    if session.no_goal {
        return None;
    }
    let remaining_ms = i64::try_from(session.remaining_seconds())
        .unwrap_or(i64::MAX)
        .saturating_mul(1000);
    Some(since_ms.saturating_add(remaining_ms))
}

fn reached_duration(session: &Session) -> bool {
    !session.no_goal && session.focus_seconds >= u64::from(session.initial_duration)
}
