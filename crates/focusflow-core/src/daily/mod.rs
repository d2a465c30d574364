//! Per-day time buckets and daily goal progress.

mod aggregator;
mod boundary;
mod model;

pub use aggregator::{progress, streak, summarize, DailyGoalAggregator, MAX_RANGE_DAYS};
pub use boundary::{DailyIncrement, DayBoundary};
pub use model::{DailySummary, DayProgress, SessionDayProgress, StreakReport, TaskDailyTime};
