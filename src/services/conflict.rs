//! Conflict detection for candidate bookings.
//!
//! Every check runs against every existing confirmed booking on the
//! same calendar and date; nothing short-circuits, so callers get the
//! complete diagnostic list. This is the optimistic layer only — the
//! storage uniqueness index remains the authoritative race guard.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::models::TimeSlot;
use crate::services::slot_time::{combine, truncate_to_minute, TimeRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    Overlap,
    BufferViolation,
    PastBooking,
    TemplateUnavailable,
}

#[derive(Debug, Clone, Serialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub message: String,
    pub conflicting_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ConflictReport {
    pub conflicts: Vec<Conflict>,
}

impl ConflictReport {
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn messages(&self) -> Vec<String> {
        self.conflicts.iter().map(|c| c.message.clone()).collect()
    }
}

/// A candidate booking being validated.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub calendar_id: String,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub buffer_minutes: i32,
}

impl Candidate {
    fn range(&self) -> TimeRange {
        TimeRange::new(self.start, self.end)
    }
}

/// An already-confirmed booking on the candidate's date, with the
/// buffer its template requires (0 for templateless guest bookings).
#[derive(Debug, Clone)]
pub struct ExistingBooking {
    pub id: String,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub buffer_minutes: i32,
}

impl ExistingBooking {
    fn range(&self) -> TimeRange {
        TimeRange::new(self.start, self.end)
    }
}

/// Run every conflict check for `candidate` and collect all findings.
///
/// `templates` are the calendar's active weekly windows for the
/// candidate's weekday; `exclude_id` skips one existing booking, used
/// when revalidating an edit or a restore.
pub fn check(
    candidate: &Candidate,
    templates: &[TimeSlot],
    existing: &[ExistingBooking],
    exclude_id: Option<&str>,
    now: NaiveDateTime,
) -> ConflictReport {
    let mut report = ConflictReport::default();
    let range = candidate.range();

    if combine(candidate.date, truncate_to_minute(candidate.start)) <= now {
        report.conflicts.push(Conflict {
            kind: ConflictKind::PastBooking,
            message: "Cannot book appointments in the past.".to_string(),
            conflicting_id: None,
        });
    }

    if !window_covers(templates, candidate.date, &range) {
        report.conflicts.push(Conflict {
            kind: ConflictKind::TemplateUnavailable,
            message: format!(
                "No active availability window covers {} {}-{}.",
                candidate.date.format("%Y-%m-%d"),
                range.start.format("%H:%M"),
                range.end.format("%H:%M"),
            ),
            conflicting_id: None,
        });
    }

    for other in existing {
        if exclude_id.is_some_and(|id| id == other.id) {
            continue;
        }
        let other_range = other.range();

        if range.overlaps(&other_range) {
            report.conflicts.push(Conflict {
                kind: ConflictKind::Overlap,
                message: format!(
                    "Conflicts with an existing booking from {} to {}.",
                    other_range.start.format("%H:%M"),
                    other_range.end.format("%H:%M"),
                ),
                conflicting_id: Some(other.id.clone()),
            });
            continue;
        }

        // Buffer is only reported when the core ranges are clear, so a
        // single pair never produces two findings. Either side's buffer
        // requirement is enforced.
        let their_zone = other_range.expanded_by(i64::from(other.buffer_minutes));
        let our_zone = range.expanded_by(i64::from(candidate.buffer_minutes));
        if range.overlaps(&their_zone) || our_zone.overlaps(&other_range) {
            let required = other.buffer_minutes.max(candidate.buffer_minutes);
            report.conflicts.push(Conflict {
                kind: ConflictKind::BufferViolation,
                message: format!(
                    "Too close to the booking from {} to {}; {} minutes of buffer are required.",
                    other_range.start.format("%H:%M"),
                    other_range.end.format("%H:%M"),
                    required,
                ),
                conflicting_id: Some(other.id.clone()),
            });
        }
    }

    report
}

/// Owner-side check when creating or editing a template: does the
/// proposed weekly window collide with another active template on the
/// same calendar and weekday? Returns the id of the first collision.
pub fn template_window_conflict(
    templates: &[TimeSlot],
    day_of_week: u8,
    window: &TimeRange,
    exclude_id: Option<&str>,
) -> Option<String> {
    templates
        .iter()
        .filter(|slot| slot.is_active && slot.day_of_week == day_of_week)
        .filter(|slot| !exclude_id.is_some_and(|id| id == slot.id))
        .find(|slot| TimeRange::new(slot.start_time, slot.end_time).overlaps(window))
        .map(|slot| slot.id.clone())
}

/// Whether some active template window for the date's weekday fully
/// contains the candidate range.
pub fn window_covers(templates: &[TimeSlot], date: NaiveDate, range: &TimeRange) -> bool {
    let weekday = chrono::Datelike::weekday(&date).num_days_from_sunday() as u8;
    templates.iter().any(|slot| {
        slot.is_active
            && slot.day_of_week == weekday
            && TimeRange::new(slot.start_time, slot.end_time).contains(range)
    })
}
