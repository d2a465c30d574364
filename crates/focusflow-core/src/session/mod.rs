//! Session lifecycle: entity, elapsed-time accounting, and the service that
//! serializes and persists transitions.

pub mod accountant;
mod clock;
mod locks;
mod machine;
mod model;

pub use accountant::{compute_transition, AccountingEvent, ClosedInterval, Transition, TransitionError};
pub use clock::{Clock, ManualClock, SystemClock};
pub use locks::{SessionGuard, SessionLocks};
pub use machine::SessionService;
pub use model::{
    whole_seconds_between, CreateInput, PatchInput, Session, SessionDraft, SessionId, SessionPatch,
    SessionState, UnknownState, MAX_DAILY_GOAL_MINUTES, MAX_INITIAL_DURATION_SECS, MAX_TITLE_LEN,
};

#[cfg(test)]
pub(crate) use model::sample_session;
