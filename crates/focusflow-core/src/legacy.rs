//! Import of sessions exported by older clients.
//!
//! Older exports are a JSON array of loosely shaped objects: the same field
//! went by several names over time, numbers were sometimes strings, and the
//! ticking state was stored as 0/1, as free text, or only as an `isRunning`
//! flag. Each entry is normalized into a [`LegacySession`] and then into a
//! creation draft.
//!
//! Imported sessions always start out paused: an old running interval has no
//! trustworthy start time, so it is not credited.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::error::ValidationError;
use crate::session::{CreateInput, SessionDraft, SessionState};

const ID_KEYS: &[&str] = &["id", "sessionId"];
const TITLE_KEYS: &[&str] = &["title", "name"];
const DURATION_KEYS: &[&str] = &[
    "sessionDuration",
    "initialDuration",
    "durationSeconds",
    "duration",
    "sessionLength",
];
const TIME_LEFT_KEYS: &[&str] = &["timeLeft", "remainingSeconds", "remaining", "timeRemaining"];
const COMPLETED_KEYS: &[&str] = &["isCompleted", "completed", "isDone"];
const GOAL_KEYS: &[&str] = &["dailyGoalMinutes", "goalMinutes", "dailyGoal", "targetMinutes"];
const FOCUS_KEYS: &[&str] = &[
    "focusSeconds",
    "progressSeconds",
    "accumulatedFocusSeconds",
    "focusTime",
];
const TARGET_KEYS: &[&str] = &["targetTimeMs", "targetTimestamp", "endTimeMs"];
const STATE_KEYS: &[&str] = &["state", "status"];

/// Largest accrued focus time an import accepts, in seconds.
const MAX_FOCUS_SECONDS: f64 = u32::MAX as f64;

#[derive(Debug, Error)]
pub enum LegacyImportError {
    #[error("legacy export is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("legacy export must be a JSON array of sessions")]
    NotAnArray,

    #[error("legacy entry {index}: {source}")]
    Entry {
        index: usize,
        #[source]
        source: ValidationError,
    },
}

/// Fallbacks for fields an entry does not carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyDefaults {
    pub title: String,
    pub initial_duration: u32,
    pub daily_goal_minutes: u32,
}

impl Default for LegacyDefaults {
    fn default() -> Self {
        Self {
            title: "Session".into(),
            initial_duration: 30 * 60,
            daily_goal_minutes: 30,
        }
    }
}

/// One normalized legacy entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegacySession {
    pub legacy_id: Option<i64>,
    pub title: String,
    pub initial_duration: f64,
    pub time_left: f64,
    pub is_completed: bool,
    pub daily_goal_minutes: f64,
    pub focus_seconds: f64,
    pub state: SessionState,
    pub target_time_ms: Option<i64>,
}

impl LegacySession {
    fn from_object(obj: &Map<String, Value>, defaults: &LegacyDefaults) -> Self {
        let initial_duration = number_or(obj, DURATION_KEYS, f64::from(defaults.initial_duration));
        Self {
            legacy_id: first_present(obj, ID_KEYS)
                .and_then(to_number)
                .map(|n| n.trunc() as i64),
            title: first_present(obj, TITLE_KEYS)
                .and_then(Value::as_str)
                .unwrap_or(&defaults.title)
                .to_string(),
            initial_duration,
            time_left: number_or(obj, TIME_LEFT_KEYS, initial_duration),
            is_completed: first_present(obj, COMPLETED_KEYS).is_some_and(truthy),
            daily_goal_minutes: number_or(obj, GOAL_KEYS, f64::from(defaults.daily_goal_minutes)),
            focus_seconds: number_or(obj, FOCUS_KEYS, 0.0),
            state: normalize_state(first_present(obj, STATE_KEYS), obj.get("isRunning")),
            target_time_ms: first_present(obj, TARGET_KEYS)
                .and_then(to_number)
                .map(|n| n.trunc() as i64),
        }
    }

    /// Validate into a paused creation draft for `user_id`, keeping the
    /// accrued focus time. The entry is completed when it was flagged so or
    /// its focus time already covers the duration.
    ///
    /// # Errors
    /// Fails when the title, duration, goal or focus time is out of range.
    pub fn into_draft(self, user_id: &str) -> Result<SessionDraft, ValidationError> {
        if !(0.0..=MAX_FOCUS_SECONDS).contains(&self.focus_seconds) {
            return Err(ValidationError::invalid(
                "focus_seconds",
                format!(
                    "must be between 0 and {MAX_FOCUS_SECONDS} seconds, got {}",
                    self.focus_seconds
                ),
            ));
        }
        let input = CreateInput {
            title: self.title,
            initial_duration: whole(self.initial_duration, "initial_duration")?,
            daily_goal_minutes: whole(self.daily_goal_minutes, "daily_goal_minutes")?,
            no_goal: false,
            group_id: 0,
        };
        let mut draft = input.into_draft(user_id)?;
        draft.focus_seconds = self.focus_seconds.trunc() as u64;
        draft.is_completed =
            self.is_completed || draft.focus_seconds >= u64::from(draft.initial_duration);
        Ok(draft)
    }
}

/// Parse a legacy export. Entries that are not JSON objects are skipped.
///
/// # Errors
/// Fails when the text is not JSON or not an array.
pub fn parse_export(
    json: &str,
    defaults: &LegacyDefaults,
) -> Result<Vec<LegacySession>, LegacyImportError> {
    let Value::Array(items) = serde_json::from_str::<Value>(json)? else {
        return Err(LegacyImportError::NotAnArray);
    };
    let total = items.len();
    let sessions: Vec<_> = items
        .iter()
        .filter_map(Value::as_object)
        .map(|obj| LegacySession::from_object(obj, defaults))
        .collect();
    debug!(total, parsed = sessions.len(), "legacy export parsed");
    Ok(sessions)
}

/// Parse a legacy export and validate every entry into a draft for `user_id`.
///
/// # Errors
/// Fails on the first entry that does not validate; nothing is returned for
/// the entries before it.
pub fn import_drafts(
    json: &str,
    user_id: &str,
    defaults: &LegacyDefaults,
) -> Result<Vec<SessionDraft>, LegacyImportError> {
    parse_export(json, defaults)?
        .into_iter()
        .enumerate()
        .map(|(index, legacy)| {
            legacy
                .into_draft(user_id)
                .map_err(|source| LegacyImportError::Entry { index, source })
        })
        .collect()
}

/// First alias whose value is present and not null.
fn first_present<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .find(|value| !value.is_null())
}

/// Numbers and numeric strings; anything else is not a number.
fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// The first present alias decides: if it is not numeric, the fallback wins
/// even when a later alias holds a number.
fn number_or(obj: &Map<String, Value>, keys: &[&str], fallback: f64) -> f64 {
    first_present(obj, keys).and_then(to_number).unwrap_or(fallback)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn normalize_state(state: Option<&Value>, is_running: Option<&Value>) -> SessionState {
    match state {
        Some(Value::Number(n)) if n.as_f64() == Some(0.0) => return SessionState::Paused,
        Some(Value::Number(n)) if n.as_f64() == Some(1.0) => return SessionState::Running,
        Some(Value::String(s)) => {
            let upper = s.to_uppercase();
            if upper == "0" {
                return SessionState::Paused;
            }
            if upper == "1" || upper.contains("RUN") {
                return SessionState::Running;
            }
            if upper.contains("PAUSE") {
                return SessionState::Paused;
            }
        }
        _ => {}
    }
    match is_running {
        Some(Value::Bool(true)) => SessionState::Running,
        _ => SessionState::Paused,
    }
}

fn whole(value: f64, field: &str) -> Result<i64, ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::invalid(field, "must be a finite number"));
    }
    Ok(value.trunc() as i64)
}
