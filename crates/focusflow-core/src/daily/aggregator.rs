//! Daily goal roll-ups.
//!
//! The free functions are pure and work on already-loaded sessions and
//! buckets; [`DailyGoalAggregator`] loads them from a repository.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::debug;

use super::boundary::DayBoundary;
use super::model::{DailySummary, DayProgress, SessionDayProgress, StreakReport, TaskDailyTime};
use crate::error::{SessionError, ValidationError};
use crate::session::{Session, SessionId};
use crate::storage::{bounded, SessionRepository};

/// Longest range `progress` accepts and how far back `streak` looks.
pub const MAX_RANGE_DAYS: i64 = 366;

/// Per-day, per-session progress. Sessions sharing a day are listed side by
/// side, never merged. Buckets of sessions not in `sessions` are ignored.
pub fn progress(sessions: &[Session], buckets: &[TaskDailyTime]) -> Vec<DayProgress> {
    let by_id: HashMap<SessionId, &Session> = sessions.iter().map(|s| (s.id, s)).collect();
    let mut days: BTreeMap<NaiveDate, Vec<SessionDayProgress>> = BTreeMap::new();

    for bucket in buckets {
        if let Some(session) = by_id.get(&bucket.session_id) {
            let goal = if session.no_goal { 0 } else { bucket.goal_minutes };
            days.entry(bucket.date)
                .or_default()
                .push(session_progress(session, bucket.seconds_spent, goal));
        }
    }

    days.into_iter()
        .map(|(date, mut sessions)| {
            sessions.sort_by_key(|p| p.session_id);
            DayProgress { date, sessions }
        })
        .collect()
}

/// Roll up one day across all sessions.
pub fn summarize(
    sessions: &[Session],
    buckets: &[TaskDailyTime],
    date: NaiveDate,
    boundary: &DayBoundary,
) -> DailySummary {
    let day: Vec<&TaskDailyTime> = buckets.iter().filter(|b| b.date == date).collect();
    summarize_day(sessions, &day, date, boundary)
}

/// Consecutive days on which the whole daily goal was met.
pub fn streak(
    sessions: &[Session],
    buckets: &[TaskDailyTime],
    today: NaiveDate,
    boundary: &DayBoundary,
) -> StreakReport {
    let mut by_date: BTreeMap<NaiveDate, Vec<&TaskDailyTime>> = BTreeMap::new();
    for bucket in buckets {
        by_date.entry(bucket.date).or_default().push(bucket);
    }
    let summary_of = |date: NaiveDate| {
        let day = by_date.get(&date).map(Vec::as_slice).unwrap_or(&[]);
        summarize_day(sessions, day, date, boundary)
    };

    let today_met = summary_of(today).goal_met;
    let mut cursor = if today_met { Some(today) } else { today.pred_opt() };
    let mut streak_days = 0u32;
    while let Some(date) = cursor {
        if i64::from(streak_days) >= MAX_RANGE_DAYS || !summary_of(date).goal_met {
            break;
        }
        streak_days += 1;
        cursor = date.pred_opt();
    }

    let yesterday_minutes = today.pred_opt().map_or(0, |d| summary_of(d).total_minutes);

    StreakReport {
        today,
        today_met,
        streak_days,
        yesterday_minutes,
    }
}

fn summarize_day(
    sessions: &[Session],
    day: &[&TaskDailyTime],
    date: NaiveDate,
    boundary: &DayBoundary,
) -> DailySummary {
    let by_session: HashMap<SessionId, &TaskDailyTime> =
        day.iter().map(|b| (b.session_id, *b)).collect();

    let mut total_secs = 0u64;
    let mut credited_secs = 0u64;
    let mut goal_secs = 0u64;
    let mut rows = Vec::new();

    for session in sessions {
        let bucket = by_session.get(&session.id);
        let created = boundary.day_of(session.created_at.timestamp_millis());
        if bucket.is_none() && created > date {
            continue;
        }

        let seconds = bucket.map_or(0, |b| b.seconds_spent);
        let goal = if session.no_goal {
            0
        } else {
            bucket.map_or(session.daily_goal_minutes, |b| b.goal_minutes)
        };

        total_secs += seconds;
        if goal > 0 {
            let goal_for_session = u64::from(goal) * 60;
            goal_secs += goal_for_session;
            credited_secs += seconds.min(goal_for_session);
        }
        rows.push(session_progress(session, seconds, goal));
    }
    rows.sort_by_key(|p| p.session_id);

    DailySummary {
        date,
        total_minutes: total_secs / 60,
        credited_minutes: credited_secs / 60,
        goal_minutes: goal_secs / 60,
        goal_met: goal_secs > 0 && credited_secs >= goal_secs,
        sessions: rows,
    }
}

fn session_progress(session: &Session, seconds: u64, goal_minutes: u32) -> SessionDayProgress {
    let minutes_spent = seconds / 60;
    SessionDayProgress {
        session_id: session.id,
        title: session.title.clone(),
        seconds_spent: seconds,
        minutes_spent,
        goal_minutes,
        goal_met: (!session.no_goal).then(|| minutes_spent >= u64::from(goal_minutes)),
    }
}

fn validate_range(from: NaiveDate, to: NaiveDate) -> Result<(), ValidationError> {
    if from > to {
        return Err(ValidationError::InvalidRange {
            from,
            to,
            message: "start is after end".into(),
        });
    }
    if (to - from).num_days() >= MAX_RANGE_DAYS {
        return Err(ValidationError::InvalidRange {
            from,
            to,
            message: format!("range is longer than {MAX_RANGE_DAYS} days"),
        });
    }
    Ok(())
}

/// Reads sessions and buckets for a user and rolls them up.
pub struct DailyGoalAggregator<R: ?Sized> {
    repo: Arc<R>,
    boundary: DayBoundary,
    timeout: Duration,
}

impl<R: SessionRepository + ?Sized> DailyGoalAggregator<R> {
    pub fn new(repo: Arc<R>, boundary: DayBoundary, timeout: Duration) -> Self {
        Self {
            repo,
            boundary,
            timeout,
        }
    }

    pub fn boundary(&self) -> &DayBoundary {
        &self.boundary
    }

    /// Per-session progress for each day in `from..=to` that has any time.
    ///
    /// # Errors
    /// `Validation` for a reversed or overlong range, `Timeout`/`Storage`
    /// from the repository.
    pub async fn progress(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DayProgress>, SessionError> {
        validate_range(from, to)?;
        let (sessions, buckets) = self.load(user_id, from, to).await?;
        debug!(user_id, %from, %to, buckets = buckets.len(), "daily progress");
        Ok(progress(&sessions, &buckets))
    }

    pub async fn summary(&self, user_id: &str, date: NaiveDate) -> Result<DailySummary, SessionError> {
        let (sessions, buckets) = self.load(user_id, date, date).await?;
        Ok(summarize(&sessions, &buckets, date, &self.boundary))
    }

    pub async fn streak(&self, user_id: &str, today: NaiveDate) -> Result<StreakReport, SessionError> {
        let from = today - chrono::Duration::days(MAX_RANGE_DAYS);
        let (sessions, buckets) = self.load(user_id, from, today).await?;
        Ok(streak(&sessions, &buckets, today, &self.boundary))
    }

    async fn load(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<(Vec<Session>, Vec<TaskDailyTime>), SessionError> {
        let sessions = bounded(
            "load sessions",
            self.timeout,
            self.repo.get_all_for_user(user_id),
        )
        .await??;
        let buckets = bounded(
            "load daily times",
            self.timeout,
            self.repo.daily_times(user_id, from, to),
        )
        .await??;
        Ok((sessions, buckets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::sample_session;
    use chrono::{TimeZone, Utc};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn session(id: i64, goal: u32, no_goal: bool) -> Session {
        let mut s = sample_session();
        s.id = SessionId(id);
        s.title = format!("s{id}");
        s.daily_goal_minutes = goal;
        s.no_goal = no_goal;
        s.created_at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        s
    }

    fn bucket(session: i64, d: u32, seconds: u64, goal: u32) -> TaskDailyTime {
        TaskDailyTime {
            id: 0,
            session_id: SessionId(session),
            date: date(d),
            seconds_spent: seconds,
            goal_minutes: goal,
        }
    }

    #[test]
    fn progress_keeps_sessions_apart() {
        let sessions = [session(1, 15, false), session(2, 15, false)];
        let buckets = [bucket(2, 5, 600, 15), bucket(1, 5, 600, 15)];
        let days = progress(&sessions, &buckets);
        assert_eq!(days.len(), 1);
        let day = &days[0];
        assert_eq!(day.sessions.len(), 2);
        for p in &day.sessions {
            assert_eq!(p.minutes_spent, 10);
            assert_eq!(p.goal_minutes, 15);
            assert_eq!(p.goal_met, Some(false));
        }
        assert_eq!(day.sessions[0].session_id, SessionId(1));
    }

    #[test]
    fn progress_skips_goal_for_no_goal_sessions() {
        let sessions = [session(1, 15, true)];
        let days = progress(&sessions, &[bucket(1, 5, 3600, 15)]);
        assert_eq!(days[0].sessions[0].goal_met, None);
        assert_eq!(days[0].sessions[0].goal_minutes, 0);
    }

    #[test]
    fn progress_zero_goal_is_met() {
        let sessions = [session(1, 0, false)];
        let days = progress(&sessions, &[bucket(1, 5, 600, 0)]);
        assert_eq!(days[0].sessions[0].goal_minutes, 0);
        assert_eq!(days[0].sessions[0].goal_met, Some(true));
    }

    #[test]
    fn progress_ignores_unknown_sessions() {
        let days = progress(&[session(1, 15, false)], &[bucket(9, 5, 600, 15)]);
        assert!(days.is_empty());
    }

    #[test]
    fn summary_caps_each_session_at_its_goal() {
        let sessions = [session(1, 10, false), session(2, 20, false), session(3, 0, true)];
        let buckets = [
            bucket(1, 5, 30 * 60, 10),
            bucket(2, 5, 5 * 60, 20),
            bucket(3, 5, 60 * 60, 0),
        ];
        let s = summarize(&sessions, &buckets, date(5), &DayBoundary::utc());
        assert_eq!(s.total_minutes, 95);
        assert_eq!(s.credited_minutes, 15);
        assert_eq!(s.goal_minutes, 30);
        assert!(!s.goal_met);
        assert_eq!(s.sessions.len(), 3);
    }

    #[test]
    fn summary_uses_current_goal_when_no_bucket() {
        let sessions = [session(1, 10, false), session(2, 20, false)];
        let buckets = [bucket(1, 5, 10 * 60, 10)];
        let s = summarize(&sessions, &buckets, date(5), &DayBoundary::utc());
        assert_eq!(s.goal_minutes, 30);
        assert_eq!(s.credited_minutes, 10);
        assert!(!s.goal_met);
    }

    #[test]
    fn summary_skips_sessions_created_later() {
        let mut late = session(2, 20, false);
        late.created_at = Utc.with_ymd_and_hms(2026, 3, 6, 8, 0, 0).unwrap();
        let sessions = [session(1, 10, false), late];
        let s = summarize(&sessions, &[bucket(1, 5, 600, 10)], date(5), &DayBoundary::utc());
        assert_eq!(s.goal_minutes, 10);
        assert!(s.goal_met);
    }

    #[test]
    fn streak_counts_back_from_yesterday_when_today_open() {
        let sessions = [session(1, 10, false)];
        let buckets = [
            bucket(1, 2, 600, 10),
            bucket(1, 3, 900, 10),
            bucket(1, 4, 600, 10),
            bucket(1, 5, 120, 10),
        ];
        let r = streak(&sessions, &buckets, date(5), &DayBoundary::utc());
        assert!(!r.today_met);
        assert_eq!(r.streak_days, 3);
        assert_eq!(r.yesterday_minutes, 10);
    }

    #[test]
    fn streak_includes_met_today_and_stops_at_gap() {
        let sessions = [session(1, 10, false)];
        let buckets = [bucket(1, 2, 600, 10), bucket(1, 4, 600, 10), bucket(1, 5, 600, 10)];
        let r = streak(&sessions, &buckets, date(5), &DayBoundary::utc());
        assert!(r.today_met);
        assert_eq!(r.streak_days, 2);
    }

    #[test]
    fn no_goals_means_no_streak() {
        let sessions = [session(1, 10, true)];
        let r = streak(&sessions, &[bucket(1, 5, 6000, 0)], date(5), &DayBoundary::utc());
        assert_eq!(r.streak_days, 0);
        assert!(!r.today_met);
    }

    #[test]
    fn range_validation() {
        assert!(validate_range(date(5), date(4)).is_err());
        assert!(validate_range(date(4), date(4)).is_ok());
        let far = date(1) + chrono::Duration::days(MAX_RANGE_DAYS);
        assert!(validate_range(date(1), far).is_err());
    }
}
