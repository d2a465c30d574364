use serde::{Deserialize, Serialize};

use crate::session::{CreateInput, PatchInput, Session, SessionId};

/// A request from the outside world to change a session.
///
/// Serialized with an internal `type` tag, e.g.
/// `{"type": "pause", "session_id": 3}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Start {
        session_id: SessionId,
    },
    Pause {
        session_id: SessionId,
    },
    Edit {
        session_id: SessionId,
        patch: PatchInput,
    },
    /// Zero the accrued focus time and clear completion.
    Reset {
        session_id: SessionId,
    },
    AddSession {
        input: CreateInput,
    },
    DeleteSession {
        session_id: SessionId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Start,
    Pause,
    Edit,
    Reset,
    AddSession,
    DeleteSession,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Start => "start",
            EventType::Pause => "pause",
            EventType::Edit => "edit",
            EventType::Reset => "reset",
            EventType::AddSession => "add_session",
            EventType::DeleteSession => "delete_session",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SessionEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            SessionEvent::Start { .. } => EventType::Start,
            SessionEvent::Pause { .. } => EventType::Pause,
            SessionEvent::Edit { .. } => EventType::Edit,
            SessionEvent::Reset { .. } => EventType::Reset,
            SessionEvent::AddSession { .. } => EventType::AddSession,
            SessionEvent::DeleteSession { .. } => EventType::DeleteSession,
        }
    }

    /// Target session, `None` for `add_session`.
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            SessionEvent::Start { session_id }
            | SessionEvent::Pause { session_id }
            | SessionEvent::Edit { session_id, .. }
            | SessionEvent::Reset { session_id }
            | SessionEvent::DeleteSession { session_id } => Some(*session_id),
            SessionEvent::AddSession { .. } => None,
        }
    }
}

/// Result of dispatching a [`SessionEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EventOutcome {
    /// The session after the event (the new session for `add_session`).
    Updated { session: Session },
    Deleted { session_id: SessionId },
}
