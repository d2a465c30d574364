//! Session entity and request inputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Longest accepted session title, in characters.
pub const MAX_TITLE_LEN: usize = 200;
/// Longest accepted planned duration (one day), in seconds.
pub const MAX_INITIAL_DURATION_SECS: i64 = 24 * 60 * 60;
/// Largest accepted daily goal, in minutes.
pub const MAX_DAILY_GOAL_MINUTES: i64 = 24 * 60;

/// Repository-assigned session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub i64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ticking state of a session.
///
/// Completion and deletion are flags on [`Session`], not states: a completed
/// or deleted session keeps its last state value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Running,
    #[default]
    Paused,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Running => "running",
            SessionState::Paused => "paused",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a stored or submitted state string is not a known state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown session state '{0}'")]
pub struct UnknownState(pub String);

impl FromStr for SessionState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(SessionState::Running),
            "paused" => Ok(SessionState::Paused),
            other => Err(UnknownState(other.to_string())),
        }
    }
}

/// One timed work block owned by exactly one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: String,
    pub title: String,
    /// Planned run length in seconds.
    pub initial_duration: u32,
    /// Cumulative seconds actually focused.
    pub focus_seconds: u64,
    /// Projected completion instant (ms since epoch) while running with a goal.
    pub target_time_ms: Option<i64>,
    pub state: SessionState,
    /// Start of the current running interval (ms since epoch).
    pub running_since_ms: Option<i64>,
    pub daily_goal_minutes: u32,
    pub no_goal: bool,
    pub group_id: i64,
    pub is_completed: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    /// Row version, bumped on every successful update.
    pub version: u64,
}

impl Session {
    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    /// Seconds left until the planned duration is reached. Zero when `no_goal`.
    pub fn remaining_seconds(&self) -> u64 {
        if self.no_goal {
            return 0;
        }
        u64::from(self.initial_duration).saturating_sub(self.focus_seconds)
    }

    /// Focused seconds including the live running interval at `now_ms`.
    pub fn elapsed_at(&self, now_ms: i64) -> u64 {
        match (self.state, self.running_since_ms) {
            (SessionState::Running, Some(since)) => {
                self.focus_seconds + whole_seconds_between(since, now_ms)
            }
            _ => self.focus_seconds,
        }
    }

    /// Daily goal in effect, `None` for sessions without a goal.
    pub fn daily_goal(&self) -> Option<u32> {
        (!self.no_goal).then_some(self.daily_goal_minutes)
    }
}

/// Whole seconds between two instants, truncated; zero if the clock went backwards.
pub fn whole_seconds_between(start_ms: i64, end_ms: i64) -> u64 {
    u64::try_from(end_ms.saturating_sub(start_ms) / 1000).unwrap_or(0)
}

/// Everything needed to create a session row. The repository fills in the
/// id, creation time and version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDraft {
    pub user_id: String,
    pub title: String,
    pub initial_duration: u32,
    pub daily_goal_minutes: u32,
    pub no_goal: bool,
    pub group_id: i64,
    pub focus_seconds: u64,
    pub is_completed: bool,
}

/// Payload of an `add_session` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInput {
    pub title: String,
    /// Planned duration in seconds.
    pub initial_duration: i64,
    #[serde(default)]
    pub daily_goal_minutes: i64,
    #[serde(default)]
    pub no_goal: bool,
    #[serde(default)]
    pub group_id: i64,
}

impl CreateInput {
    /// Validate and turn the input into a fresh, paused draft for `user_id`.
    pub fn into_draft(self, user_id: &str) -> Result<SessionDraft, ValidationError> {
        let title = validate_title(&self.title)?;
        let initial_duration = validate_duration(self.initial_duration)?;
        let daily_goal_minutes = validate_goal(self.daily_goal_minutes)?;
        if !self.no_goal && initial_duration == 0 {
            return Err(ValidationError::invalid(
                "initial_duration",
                "must be positive unless no_goal is set",
            ));
        }
        Ok(SessionDraft {
            user_id: user_id.to_string(),
            title,
            initial_duration,
            daily_goal_minutes,
            no_goal: self.no_goal,
            group_id: self.group_id,
            focus_seconds: 0,
            is_completed: false,
        })
    }
}

/// Payload of an `edit` request. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchInput {
    #[serde(default)]
    pub daily_goal_minutes: Option<i64>,
    #[serde(default)]
    pub initial_duration: Option<i64>,
    #[serde(default)]
    pub no_goal: Option<bool>,
}

impl PatchInput {
    pub fn validate(&self) -> Result<SessionPatch, ValidationError> {
        if self.daily_goal_minutes.is_none()
            && self.initial_duration.is_none()
            && self.no_goal.is_none()
        {
            return Err(ValidationError::invalid("patch", "no fields to update"));
        }
        Ok(SessionPatch {
            daily_goal_minutes: self.daily_goal_minutes.map(validate_goal).transpose()?,
            initial_duration: self.initial_duration.map(validate_duration).transpose()?,
            no_goal: self.no_goal,
        })
    }
}

/// A validated [`PatchInput`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionPatch {
    pub daily_goal_minutes: Option<u32>,
    pub initial_duration: Option<u32>,
    pub no_goal: Option<bool>,
}

impl SessionPatch {
    /// Apply the patch to the config fields of `session`.
    ///
    /// Fails when the combination leaves a goal-bearing session with no duration.
    pub fn apply_to(&self, session: &mut Session) -> Result<(), ValidationError> {
        let initial_duration = self.initial_duration.unwrap_or(session.initial_duration);
        let no_goal = self.no_goal.unwrap_or(session.no_goal);
        if !no_goal && initial_duration == 0 {
            return Err(ValidationError::invalid(
                "initial_duration",
                "must be positive unless no_goal is set",
            ));
        }
        session.initial_duration = initial_duration;
        session.no_goal = no_goal;
        if let Some(goal) = self.daily_goal_minutes {
            session.daily_goal_minutes = goal;
        }
        Ok(())
    }
}

fn validate_title(title: &str) -> Result<String, ValidationError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ValidationError::invalid("title", "must not be empty"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ValidationError::invalid(
            "title",
            format!("must be at most {MAX_TITLE_LEN} characters"),
        ));
    }
    Ok(title.to_string())
}

fn validate_duration(secs: i64) -> Result<u32, ValidationError> {
    if !(0..=MAX_INITIAL_DURATION_SECS).contains(&secs) {
        return Err(ValidationError::invalid(
            "initial_duration",
            format!("must be between 0 and {MAX_INITIAL_DURATION_SECS} seconds, got {secs}"),
        ));
    }
    u32::try_from(secs).map_err(|e| ValidationError::invalid("initial_duration", e.to_string()))
}

fn validate_goal(minutes: i64) -> Result<u32, ValidationError> {
    if !(0..=MAX_DAILY_GOAL_MINUTES).contains(&minutes) {
        return Err(ValidationError::invalid(
            "daily_goal_minutes",
            format!("must be between 0 and {MAX_DAILY_GOAL_MINUTES}, got {minutes}"),
        ));
    }
    u32::try_from(minutes)
        .map_err(|e| ValidationError::invalid("daily_goal_minutes", e.to_string()))
}

#[cfg(test)]
pub(crate) fn sample_session() -> Session {
    Session {
        id: SessionId(1),
        user_id: "alice".into(),
        title: "Deep Work".into(),
        initial_duration: 1500,
        focus_seconds: 0,
        target_time_ms: None,
        state: SessionState::Paused,
        running_since_ms: None,
        daily_goal_minutes: 30,
        no_goal: false,
        group_id: 0,
        is_completed: false,
        is_deleted: false,
        created_at: Utc::now(),
        version: 0,
    }
}
