//! Calendar-day bucketing.
//!
//! A "day" runs from `day_start` to the next `day_start` in one fixed
//! reference offset. Users' own time zones are not consulted.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Seconds spent by one session on one day, produced when a running
/// interval is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyIncrement {
    pub date: NaiveDate,
    pub seconds: u64,
    /// Goal snapshot used if this creates the day's bucket.
    pub goal_minutes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayBoundary {
    offset: FixedOffset,
    day_start: NaiveTime,
}

impl Default for DayBoundary {
    fn default() -> Self {
        Self::utc()
    }
}

impl DayBoundary {
    /// Midnight UTC.
    pub fn utc() -> Self {
        Self {
            offset: Utc.fix(),
            day_start: NaiveTime::MIN,
        }
    }

    /// # Errors
    /// Fails if the offset is not within ±24h.
    pub fn new(utc_offset_minutes: i32, day_start: NaiveTime) -> Result<Self, ValidationError> {
        let offset = utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                ValidationError::invalid(
                    "utc_offset_minutes",
                    format!("{utc_offset_minutes} is outside ±1439"),
                )
            })?;
        Ok(Self { offset, day_start })
    }

    /// Parse a `HH:MM` day start.
    pub fn parse_day_start(value: &str) -> Result<NaiveTime, ValidationError> {
        NaiveTime::parse_from_str(value, "%H:%M")
            .map_err(|e| ValidationError::invalid("day_start", format!("'{value}': {e}")))
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn day_start(&self) -> NaiveTime {
        self.day_start
    }

    /// The day containing the instant `ms`.
    pub fn day_of(&self, ms: i64) -> NaiveDate {
        let instant = DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default();
        let local = instant.with_timezone(&self.offset).naive_local();
        (local - self.day_start.signed_duration_since(NaiveTime::MIN)).date()
    }

    /// First instant (ms since epoch) of `date`.
    pub fn start_of(&self, date: NaiveDate) -> i64 {
        let local = date.and_time(self.day_start);
        local.and_utc().timestamp_millis() - i64::from(self.offset.local_minus_utc()) * 1000
    }

    /// Split the closed interval `[start_ms, end_ms)` at day boundaries.
    ///
    /// The per-day seconds always sum to the whole seconds of the full
    /// interval; a fractional second left over at a boundary is carried into
    /// the following day. Days that receive no whole second are omitted.
    pub fn split_interval(&self, start_ms: i64, end_ms: i64, goal_minutes: u32) -> Vec<DailyIncrement> {
        let mut increments = Vec::new();
        if end_ms <= start_ms {
            return increments;
        }

        let mut segment_start = start_ms;
        let mut credited = 0u64;
        loop {
            let date = self.day_of(segment_start);
            let next_day_start = date
                .succ_opt()
                .map(|next| self.start_of(next))
                .unwrap_or(end_ms);
            let segment_end = next_day_start.min(end_ms);

            let cumulative = u64::try_from((segment_end - start_ms) / 1000).unwrap_or(0);
            let seconds = cumulative - credited;
            if seconds > 0 {
                increments.push(DailyIncrement {
                    date,
                    seconds,
                    goal_minutes,
                });
            }
            credited = cumulative;

            if segment_end >= end_ms || segment_end <= segment_start {
                break;
            }
            segment_start = segment_end;
        }
        increments
    }
}
