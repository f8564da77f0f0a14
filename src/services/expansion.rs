//! Expansion of weekly templates into concrete bookable instances.
//!
//! The expansion is a lazy, finite iterator ordered by date, then by
//! start time within the date, so repeated runs over the same inputs
//! list instances identically.

use std::collections::{HashSet, VecDeque};

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::models::TimeSlot;
use crate::services::slot_time::{add_minutes, combine, truncate_to_minute};

/// One concrete, dated occurrence derived from a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookableInstance {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub time_slot_id: String,
}

/// Expand `slots` over the inclusive date window `[window_start,
/// window_end]`, skipping instances that are already booked or start at
/// or before `now + lead_time_minutes`.
///
/// `booked` holds minute-normalized `(date, start)` pairs of bookings
/// that are still confirmed.
pub fn expand(
    slots: Vec<TimeSlot>,
    window_start: NaiveDate,
    window_end: NaiveDate,
    booked: HashSet<(NaiveDate, NaiveTime)>,
    now: NaiveDateTime,
    lead_time_minutes: i64,
) -> SlotExpansion {
    SlotExpansion {
        slots,
        window_end,
        booked,
        cutoff: now + Duration::minutes(lead_time_minutes),
        next_date: window_start,
        pending: VecDeque::new(),
    }
}

pub struct SlotExpansion {
    slots: Vec<TimeSlot>,
    window_end: NaiveDate,
    booked: HashSet<(NaiveDate, NaiveTime)>,
    cutoff: NaiveDateTime,
    next_date: NaiveDate,
    pending: VecDeque<BookableInstance>,
}

impl SlotExpansion {
    /// Generate one day's instances, sorted by start time so templates
    /// sharing a weekday interleave deterministically.
    fn fill_day(&mut self, date: NaiveDate) {
        let weekday = date.weekday().num_days_from_sunday() as u8;
        let mut day: Vec<BookableInstance> = Vec::new();

        for slot in self.slots.iter().filter(|s| s.is_active && s.day_of_week == weekday) {
            let window_end = truncate_to_minute(slot.end_time);
            let step = i64::from(slot.duration_minutes) + i64::from(slot.buffer_minutes);
            let mut start = truncate_to_minute(slot.start_time);

            loop {
                let Some(end) = add_minutes(start, i64::from(slot.duration_minutes)) else {
                    break;
                };
                // the trailing partial slot never overruns the window
                if end > window_end {
                    break;
                }
                if combine(date, start) > self.cutoff && !self.booked.contains(&(date, start)) {
                    day.push(BookableInstance {
                        date,
                        start_time: start,
                        end_time: end,
                        time_slot_id: slot.id.clone(),
                    });
                }
                match add_minutes(start, step) {
                    Some(next) => start = next,
                    None => break,
                }
            }
        }

        day.sort_by(|a, b| (a.start_time, &a.time_slot_id).cmp(&(b.start_time, &b.time_slot_id)));
        self.pending.extend(day);
    }
}

impl Iterator for SlotExpansion {
    type Item = BookableInstance;

    fn next(&mut self) -> Option<BookableInstance> {
        loop {
            if let Some(instance) = self.pending.pop_front() {
                return Some(instance);
            }
            if self.next_date > self.window_end {
                return None;
            }
            let date = self.next_date;
            self.next_date += Duration::days(1);
            self.fill_day(date);
        }
    }
}
