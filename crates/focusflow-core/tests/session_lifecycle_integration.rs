//! Integration tests for the session lifecycle.
//!
//! These drive `SessionService` against an in-memory SQLite repository with a
//! manual clock and check the accounting end to end, including the per-day
//! buckets written alongside each transition.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use focusflow_core::daily::DayBoundary;
use focusflow_core::{
    Clock, CreateInput, ManualClock, PatchInput, SessionError, SessionEvent, SessionRepository,
    SessionService, SessionState, SqliteSessionRepository,
};

/// 2026-01-01T00:00:00Z
const JAN_1: i64 = 1_767_225_600_000;
const MINUTE: i64 = 60_000;

type Service = SessionService<SqliteSessionRepository, Arc<ManualClock>>;

fn setup(start_ms: i64) -> (Service, Arc<SqliteSessionRepository>) {
    let repo = Arc::new(SqliteSessionRepository::open_in_memory().unwrap());
    let svc = SessionService::new(
        Arc::clone(&repo),
        Arc::new(ManualClock::new(start_ms)),
        DayBoundary::utc(),
        Duration::from_secs(5),
    );
    (svc, repo)
}

fn input(title: &str, duration: i64, goal: i64) -> CreateInput {
    CreateInput {
        title: title.into(),
        initial_duration: duration,
        daily_goal_minutes: goal,
        no_goal: false,
        group_id: 0,
    }
}

fn jan(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
}

#[tokio::test]
async fn test_full_session_reaches_completion() {
    let (svc, repo) = setup(JAN_1);
    let s = svc.add_session("alice", input("Deep Work", 1500, 30)).await.unwrap();
    assert_eq!(s.state, SessionState::Paused);
    assert_eq!(s.focus_seconds, 0);

    let running = svc.start("alice", s.id).await.unwrap();
    assert_eq!(running.target_time_ms, Some(JAN_1 + 1_500_000));

    svc.clock().set(JAN_1 + 600_000);
    let paused = svc.pause("alice", s.id).await.unwrap();
    assert_eq!(paused.focus_seconds, 600);
    assert!(!paused.is_completed);

    svc.clock().set(JAN_1 + 700_000);
    let resumed = svc.start("alice", s.id).await.unwrap();
    assert_eq!(resumed.target_time_ms, Some(JAN_1 + 1_600_000));

    svc.clock().set(JAN_1 + 1_600_000);
    let done = svc.pause("alice", s.id).await.unwrap();
    assert_eq!(done.focus_seconds, 1500);
    assert!(done.is_completed);

    let buckets = repo.daily_times("alice", jan(1), jan(1)).await.unwrap();
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0].seconds_spent, 1500);
    assert_eq!(buckets[0].num_minutes_spent(), 25);
    assert_eq!(buckets[0].goal_minutes, 30);
}

#[tokio::test]
async fn test_paused_session_does_not_accrue() {
    let (svc, _repo) = setup(JAN_1);
    let s = svc.add_session("alice", input("Idle", 1500, 30)).await.unwrap();

    svc.clock().advance(3_600_000);
    let fetched = svc.get_session("alice", s.id).await.unwrap();
    assert_eq!(fetched.focus_seconds, 0);
    assert_eq!(fetched.elapsed_at(svc.clock().now_ms()), 0);
}

#[tokio::test]
async fn test_edit_while_running_reprojects_target() {
    let (svc, _repo) = setup(JAN_1);
    let s = svc.add_session("alice", input("Edit", 1500, 30)).await.unwrap();
    svc.start("alice", s.id).await.unwrap();
    svc.clock().advance(100_000);

    let patch = PatchInput {
        initial_duration: Some(2000),
        ..PatchInput::default()
    };
    let edited = svc.edit("alice", s.id, patch).await.unwrap();
    assert_eq!(edited.state, SessionState::Running);
    assert_eq!(edited.focus_seconds, 0);
    // 100 s already ran, 1900 s remain from now.
    assert_eq!(edited.target_time_ms, Some(JAN_1 + 100_000 + 1_900_000));

    svc.clock().advance(50_000);
    let paused = svc.pause("alice", s.id).await.unwrap();
    assert_eq!(paused.focus_seconds, 150);
}

#[tokio::test]
async fn test_two_sessions_same_day_are_reported_separately() {
    let (svc, _repo) = setup(JAN_1);
    let a = svc.add_session("alice", input("A", 3600, 30)).await.unwrap();
    let b = svc.add_session("alice", input("B", 3600, 30)).await.unwrap();

    svc.start("alice", a.id).await.unwrap();
    svc.clock().advance(10 * MINUTE);
    svc.pause("alice", a.id).await.unwrap();

    svc.start("alice", b.id).await.unwrap();
    svc.clock().advance(15 * MINUTE);
    svc.pause("alice", b.id).await.unwrap();

    let days = svc.aggregator().progress("alice", jan(1), jan(1)).await.unwrap();
    assert_eq!(days.len(), 1);
    let rows = &days[0].sessions;
    assert_eq!(rows.len(), 2);
    assert_eq!((rows[0].session_id, rows[0].minutes_spent), (a.id, 10));
    assert_eq!((rows[1].session_id, rows[1].minutes_spent), (b.id, 15));
    assert_eq!(rows[0].goal_met, Some(false));
}

#[tokio::test]
async fn test_deleted_session_is_gone_everywhere() {
    let (svc, repo) = setup(JAN_1);
    let keep = svc.add_session("alice", input("Keep", 1500, 30)).await.unwrap();
    let gone = svc.add_session("alice", input("Gone", 1500, 30)).await.unwrap();

    svc.delete_session("alice", gone.id).await.unwrap();

    let err = svc.start("alice", gone.id).await.unwrap_err();
    assert!(matches!(err, SessionError::NotFound { session_id } if session_id == gone.id));
    let err = svc
        .edit(
            "alice",
            gone.id,
            PatchInput {
                daily_goal_minutes: Some(10),
                ..PatchInput::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");

    let listed = svc.list_sessions("alice").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, keep.id);
    assert!(repo.get_for_user("alice", gone.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_running_session_keeps_its_time_out_of_reports() {
    let (svc, repo) = setup(JAN_1);
    let s = svc.add_session("alice", input("Run", 1500, 30)).await.unwrap();
    svc.start("alice", s.id).await.unwrap();
    svc.clock().advance(5 * MINUTE);
    svc.delete_session("alice", s.id).await.unwrap();

    assert!(repo.daily_times("alice", jan(1), jan(1)).await.unwrap().is_empty());
    let summary = svc.aggregator().summary("alice", jan(1)).await.unwrap();
    assert_eq!(summary.total_minutes, 0);
}

#[tokio::test]
async fn test_sessions_are_private_to_their_owner() {
    let (svc, _repo) = setup(JAN_1);
    let s = svc.add_session("alice", input("Mine", 1500, 30)).await.unwrap();

    assert!(svc.list_sessions("bob").await.unwrap().is_empty());
    let err = svc.pause("bob", s.id).await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
    let err = svc.delete_session("bob", s.id).await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn test_concurrent_pauses_count_time_once() {
    let (svc, repo) = setup(JAN_1);
    let s = svc.add_session("alice", input("Race", 3600, 30)).await.unwrap();
    svc.start("alice", s.id).await.unwrap();
    svc.clock().advance(10 * MINUTE);

    let (first, second) = tokio::join!(svc.pause("alice", s.id), svc.pause("alice", s.id));
    let first = first.unwrap();
    let second = second.unwrap();
    assert_eq!(first.focus_seconds, 600);
    assert_eq!(second.focus_seconds, 600);
    assert_eq!(first.version.max(second.version), 2);

    let buckets = repo.daily_times("alice", jan(1), jan(1)).await.unwrap();
    assert_eq!(buckets[0].seconds_spent, 600);
}

#[tokio::test]
async fn test_concurrent_start_pause_across_tasks() {
    let (svc, repo) = setup(JAN_1);
    let svc = Arc::new(svc);
    let s = svc.add_session("alice", input("Tasks", 3600, 30)).await.unwrap();

    for _ in 0..5 {
        let mut handles = Vec::new();
        for op in 0..4 {
            let svc = Arc::clone(&svc);
            handles.push(tokio::spawn(async move {
                if op % 2 == 0 {
                    svc.start("alice", s.id).await
                } else {
                    svc.pause("alice", s.id).await
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        svc.clock().advance(MINUTE);
    }
    svc.pause("alice", s.id).await.unwrap();

    let stored = svc.get_session("alice", s.id).await.unwrap();
    let buckets = repo.daily_times("alice", jan(1), jan(1)).await.unwrap();
    let bucket_total: u64 = buckets.iter().map(|b| b.seconds_spent).sum();
    assert_eq!(bucket_total, stored.focus_seconds);
    assert!(stored.focus_seconds <= 300);
}

#[tokio::test]
async fn test_reset_zeroes_focus_but_keeps_history() {
    let (svc, repo) = setup(JAN_1);
    let s = svc.add_session("alice", input("Reset", 600, 30)).await.unwrap();
    svc.start("alice", s.id).await.unwrap();
    svc.clock().advance(10 * MINUTE);
    let done = svc.pause("alice", s.id).await.unwrap();
    assert!(done.is_completed);

    svc.start("alice", s.id).await.unwrap_err();
    let reset = svc.reset("alice", s.id).await.unwrap();
    assert_eq!(reset.focus_seconds, 0);
    assert!(!reset.is_completed);

    let restarted = svc.start("alice", s.id).await.unwrap();
    assert_eq!(restarted.state, SessionState::Running);
    svc.clock().advance(2 * MINUTE);
    let reset = svc.reset("alice", s.id).await.unwrap();
    assert_eq!(reset.state, SessionState::Paused);
    assert_eq!(reset.focus_seconds, 0);

    let buckets = repo.daily_times("alice", jan(1), jan(1)).await.unwrap();
    assert_eq!(buckets[0].seconds_spent, 720);
}

#[tokio::test]
async fn test_interval_across_midnight_splits_into_two_days() {
    let (svc, repo) = setup(JAN_1 - 10 * MINUTE);
    let s = svc.add_session("alice", input("Night", 3600, 30)).await.unwrap();
    svc.start("alice", s.id).await.unwrap();
    svc.clock().set(JAN_1 + 10 * MINUTE);
    let paused = svc.pause("alice", s.id).await.unwrap();
    assert_eq!(paused.focus_seconds, 1200);

    let dec_31 = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
    let buckets = repo.daily_times("alice", dec_31, jan(1)).await.unwrap();
    assert_eq!(buckets.len(), 2);
    assert_eq!((buckets[0].date, buckets[0].seconds_spent), (dec_31, 600));
    assert_eq!((buckets[1].date, buckets[1].seconds_spent), (jan(1), 600));
}

#[tokio::test]
async fn test_configured_day_start_moves_the_split() {
    let repo = Arc::new(SqliteSessionRepository::open_in_memory().unwrap());
    let four_am = DayBoundary::parse_day_start("04:00").unwrap();
    let svc = SessionService::new(
        Arc::clone(&repo),
        Arc::new(ManualClock::new(JAN_1 + 3 * 60 * MINUTE)),
        DayBoundary::new(0, four_am).unwrap(),
        Duration::from_secs(5),
    );
    let s = svc.add_session("alice", input("Late", 7200, 30)).await.unwrap();
    svc.start("alice", s.id).await.unwrap();
    svc.clock().advance(90 * MINUTE);
    svc.pause("alice", s.id).await.unwrap();

    let dec_31 = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
    let buckets = repo.daily_times("alice", dec_31, jan(1)).await.unwrap();
    assert_eq!(buckets.len(), 2);
    assert_eq!((buckets[0].date, buckets[0].seconds_spent), (dec_31, 3600));
    assert_eq!((buckets[1].date, buckets[1].seconds_spent), (jan(1), 1800));
}

#[tokio::test]
async fn test_short_intervals_accumulate_into_minutes() {
    let (svc, repo) = setup(JAN_1);
    let s = svc.add_session("alice", input("Bursts", 3600, 30)).await.unwrap();
    for _ in 0..10 {
        svc.start("alice", s.id).await.unwrap();
        svc.clock().advance(30_500);
        svc.pause("alice", s.id).await.unwrap();
        svc.clock().advance(5_000);
    }

    let stored = svc.get_session("alice", s.id).await.unwrap();
    assert_eq!(stored.focus_seconds, 300);
    let buckets = repo.daily_times("alice", jan(1), jan(1)).await.unwrap();
    assert_eq!(buckets[0].seconds_spent, 300);
    assert_eq!(buckets[0].num_minutes_spent(), 5);
}

#[tokio::test]
async fn test_no_goal_session_never_completes() {
    let (svc, repo) = setup(JAN_1);
    let mut create = input("Open ended", 0, 30);
    create.no_goal = true;
    let s = svc.add_session("alice", create).await.unwrap();

    let running = svc.start("alice", s.id).await.unwrap();
    assert_eq!(running.target_time_ms, None);
    svc.clock().advance(120 * MINUTE);
    let paused = svc.pause("alice", s.id).await.unwrap();
    assert_eq!(paused.focus_seconds, 7200);
    assert!(!paused.is_completed);

    let buckets = repo.daily_times("alice", jan(1), jan(1)).await.unwrap();
    assert_eq!(buckets[0].goal_minutes, 0);
    let days = svc.aggregator().progress("alice", jan(1), jan(1)).await.unwrap();
    assert_eq!(days[0].sessions[0].goal_met, None);
}

#[tokio::test]
async fn test_dispatch_json_events() {
    let (svc, _repo) = setup(JAN_1);
    let add: SessionEvent = serde_json::from_str(
        r#"{"type":"add_session","input":{"title":"From JSON","initial_duration":600,"daily_goal_minutes":10}}"#,
    )
    .unwrap();
    let outcome = svc.dispatch("alice", add).await.unwrap();
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["outcome"], "updated");
    assert_eq!(json["session"]["title"], "From JSON");
    let id = json["session"]["id"].as_i64().unwrap();

    let start: SessionEvent =
        serde_json::from_str(&format!(r#"{{"type":"start","session_id":{id}}}"#)).unwrap();
    let outcome = serde_json::to_value(svc.dispatch("alice", start).await.unwrap()).unwrap();
    assert_eq!(outcome["session"]["state"], "running");
}
