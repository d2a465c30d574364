use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::session::SessionId;

/// One bucket of focused time per (session, day).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDailyTime {
    pub id: i64,
    pub session_id: SessionId,
    pub date: NaiveDate,
    /// Stored in seconds so short intervals add up before truncation.
    pub seconds_spent: u64,
    /// Goal in effect when the bucket was created; 0 for sessions without a goal.
    pub goal_minutes: u32,
}

impl TaskDailyTime {
    pub fn num_minutes_spent(&self) -> u64 {
        self.seconds_spent / 60
    }
}

/// Progress of one session on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDayProgress {
    pub session_id: SessionId,
    pub title: String,
    pub seconds_spent: u64,
    pub minutes_spent: u64,
    pub goal_minutes: u32,
    /// `None` when the session has no goal to meet.
    pub goal_met: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayProgress {
    pub date: NaiveDate,
    pub sessions: Vec<SessionDayProgress>,
}

/// All sessions of one day rolled into a single goal figure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    /// Every focused minute of the day.
    pub total_minutes: u64,
    /// Minutes that count toward the goal: each session is capped at its own goal.
    pub credited_minutes: u64,
    pub goal_minutes: u64,
    pub goal_met: bool,
    pub sessions: Vec<SessionDayProgress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakReport {
    pub today: NaiveDate,
    pub today_met: bool,
    /// Consecutive met days ending today, or yesterday when today is not met yet.
    pub streak_days: u32,
    pub yesterday_minutes: u64,
}
