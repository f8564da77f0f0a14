//! Time primitives for the availability engine.
//!
//! The engine is timezone-naive: every date and time is host-local
//! wall-clock, and all comparisons happen at minute granularity
//! (seconds are kept in storage but ignored here). Slots never cross
//! midnight, so minute arithmetic that would wrap is an error, not a
//! wrap-around.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// Drop the seconds component for comparison purposes.
pub fn truncate_to_minute(t: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(t.hour(), t.minute(), 0).unwrap_or(t)
}

/// Add `n` minutes to a wall-clock time. Returns `None` when the result
/// would cross midnight (in either direction).
pub fn add_minutes(t: NaiveTime, n: i64) -> Option<NaiveTime> {
    let total = i64::from(t.hour()) * 60 + i64::from(t.minute()) + n;
    if !(0..24 * 60).contains(&total) {
        return None;
    }
    NaiveTime::from_hms_opt((total / 60) as u32, (total % 60) as u32, 0)
}

/// Attach a date to a wall-clock time for comparison against "now".
pub fn combine(date: NaiveDate, time: NaiveTime) -> NaiveDateTime {
    date.and_time(time)
}

/// A half-open time range `[start, end)` within a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            start: truncate_to_minute(start),
            end: truncate_to_minute(end),
        }
    }

    /// Half-open intersection: equal endpoints do not overlap, so
    /// back-to-back bookings are fine.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Whether `other` lies entirely inside this range.
    pub fn contains(&self, other: &TimeRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Grow the range by `buffer` minutes on both sides, clamped to the
    /// day boundaries.
    pub fn expanded_by(&self, buffer: i64) -> TimeRange {
        let start = add_minutes(self.start, -buffer)
            .unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).expect("midnight"));
        let end = add_minutes(self.end, buffer)
            .unwrap_or_else(|| NaiveTime::from_hms_opt(23, 59, 0).expect("end of day"));
        TimeRange { start, end }
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// Iterate every date in the inclusive window `[start, end]`.
pub fn dates_in_window(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    let mut current = start;
    std::iter::from_fn(move || {
        if current > end {
            return None;
        }
        let date = current;
        current += Duration::days(1);
        Some(date)
    })
}
