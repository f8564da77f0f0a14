//! Booking admission: the hard-gate pipeline that commits a new
//! booking, plus the status transitions (cancel, complete, restore).
//!
//! Unlike the conflict detector, admission short-circuits on the first
//! failed gate. The optimistic conflict check exists to give a friendly
//! error before the insert; the storage uniqueness index is what
//! actually serializes concurrent admissions.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::queries;
use crate::models::{Booking, BookingStatus};
use crate::services::conflict::{self, Candidate, ConflictKind};
use crate::services::slot_time::{add_minutes, combine, truncate_to_minute};

#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{}", messages.join(" "))]
    Conflict { messages: Vec<String> },

    #[error("{0}")]
    PastOrOutOfRange(String),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl AdmissionError {
    fn lost_race() -> Self {
        AdmissionError::Conflict {
            messages: vec![
                "This time slot was just booked by someone else. Please select another time."
                    .to_string(),
            ],
        }
    }
}

/// Lead-time and horizon limits, taken from `AppConfig`.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionPolicy {
    pub lead_time_minutes: i64,
    pub horizon_days: i64,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            lead_time_minutes: 0,
            horizon_days: 180,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub calendar_id: String,
    pub time_slot_id: Option<String>,
    pub booking_date: String,
    pub start_time: String,
    /// Required when no template is referenced (guest bookings made
    /// outside the template flow).
    pub duration_minutes: Option<i32>,
    pub guest_name: String,
    pub guest_email: String,
    pub notes: Option<String>,
}

/// Run the admission pipeline. Each gate is hard: the first failure is
/// returned and nothing is written.
pub fn admit(
    conn: &Connection,
    request: &BookingRequest,
    now: NaiveDateTime,
    policy: &AdmissionPolicy,
) -> Result<Booking, AdmissionError> {
    // Gate 1: field shape.
    let guest_name = request.guest_name.trim();
    if guest_name.is_empty() {
        return Err(AdmissionError::Validation("guest name is required".to_string()));
    }
    let guest_email = request.guest_email.trim().to_lowercase();
    if !is_plausible_email(&guest_email) {
        return Err(AdmissionError::Validation(format!(
            "invalid email address: {}",
            request.guest_email
        )));
    }
    let date = parse_date(&request.booking_date)?;
    let start = parse_start_time(&request.start_time)?;

    // Gate 2: active calendar.
    let calendar = queries::get_active_calendar(conn, &request.calendar_id)?
        .ok_or_else(|| AdmissionError::NotFound("calendar not found or inactive".to_string()))?;

    // Gate 3: active template, when one is referenced.
    let template = match &request.time_slot_id {
        Some(id) => Some(
            queries::get_active_time_slot(conn, id)?.ok_or_else(|| {
                AdmissionError::NotFound("time slot not found or inactive".to_string())
            })?,
        ),
        None => None,
    };
    let (duration, buffer) = match &template {
        Some(t) => (t.duration_minutes, t.buffer_minutes),
        None => {
            let duration = request.duration_minutes.ok_or_else(|| {
                AdmissionError::Validation(
                    "duration_minutes is required without a time slot".to_string(),
                )
            })?;
            if duration <= 0 {
                return Err(AdmissionError::Validation(
                    "duration must be positive".to_string(),
                ));
            }
            (duration, 0)
        }
    };

    let end = add_minutes(start, i64::from(duration)).ok_or_else(|| {
        AdmissionError::Validation("booking would cross midnight".to_string())
    })?;

    // Gate 4: horizon, then past/window via the detector below.
    if combine(date, start) > now + Duration::days(policy.horizon_days) {
        return Err(AdmissionError::PastOrOutOfRange(format!(
            "Cannot book appointments more than {} days in advance.",
            policy.horizon_days
        )));
    }

    // Gate 5: full conflict check against confirmed bookings that day.
    let templates = queries::list_time_slots(conn, &calendar.id)?;
    let existing = queries::list_confirmed_on_date(conn, &calendar.id, date)?;
    let candidate = Candidate {
        calendar_id: calendar.id.clone(),
        date,
        start,
        end,
        buffer_minutes: buffer,
    };
    let effective_now = now + Duration::minutes(policy.lead_time_minutes);
    let report = conflict::check(&candidate, &templates, &existing, None, effective_now);
    if !report.is_valid() {
        // Past bookings are classified out of the conflict family so
        // callers can tell "pick another time" from "too late".
        if let Some(past) = report
            .conflicts
            .iter()
            .find(|c| c.kind == ConflictKind::PastBooking)
        {
            return Err(AdmissionError::PastOrOutOfRange(past.message.clone()));
        }
        return Err(AdmissionError::Conflict {
            messages: report.messages(),
        });
    }

    // Gates 6-8: build the row and let the uniqueness index arbitrate.
    let created = Utc::now().naive_utc();
    let booking = Booking {
        id: Uuid::new_v4().to_string(),
        calendar_id: calendar.id,
        time_slot_id: template.map(|t| t.id),
        booking_date: date,
        start_time: start,
        end_time: end,
        guest_name: guest_name.to_string(),
        guest_email,
        notes: request
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from),
        status: BookingStatus::Confirmed,
        cancellation_token: Uuid::new_v4().to_string(),
        created_at: created,
        updated_at: created,
    };

    match queries::insert_booking(conn, &booking) {
        Ok(()) => Ok(booking),
        Err(e) if is_double_booking_violation(&e) => Err(AdmissionError::lost_race()),
        Err(e) => Err(AdmissionError::Storage(e.into())),
    }
}

/// Guest-facing cancellation via the booking's cancellation token.
pub fn cancel_by_token(
    conn: &Connection,
    token: &str,
    now: NaiveDateTime,
) -> Result<Booking, AdmissionError> {
    let booking = queries::get_booking_by_token(conn, token)?
        .ok_or_else(|| AdmissionError::NotFound("booking not found".to_string()))?;

    match booking.status {
        BookingStatus::Cancelled => {
            return Err(AdmissionError::Validation(
                "Booking is already cancelled.".to_string(),
            ))
        }
        BookingStatus::Completed => {
            return Err(AdmissionError::Validation(
                "Cannot cancel a completed booking.".to_string(),
            ))
        }
        BookingStatus::Confirmed => {}
    }

    if combine(booking.booking_date, truncate_to_minute(booking.start_time)) < now {
        return Err(AdmissionError::PastOrOutOfRange(
            "Cannot cancel past appointments.".to_string(),
        ));
    }

    let updated = queries::transition_booking_status(
        conn,
        &booking.id,
        BookingStatus::Confirmed,
        BookingStatus::Cancelled,
    )
    .map_err(|e| AdmissionError::Storage(e.into()))?;
    if !updated {
        return Err(AdmissionError::Conflict {
            messages: vec!["Booking is no longer confirmed.".to_string()],
        });
    }

    Ok(Booking {
        status: BookingStatus::Cancelled,
        ..booking
    })
}

/// Owner cancellation by booking id.
pub fn cancel_by_id(conn: &Connection, id: &str) -> Result<Booking, AdmissionError> {
    transition(conn, id, BookingStatus::Confirmed, BookingStatus::Cancelled)
}

/// Owner marks a booking as completed.
pub fn complete(conn: &Connection, id: &str) -> Result<Booking, AdmissionError> {
    transition(conn, id, BookingStatus::Confirmed, BookingStatus::Completed)
}

/// Privileged owner override: re-confirm a cancelled booking. The world
/// may have changed since cancellation, so the conflict detector runs
/// again, and the uniqueness index still arbitrates the final update.
pub fn restore(
    conn: &Connection,
    id: &str,
    now: NaiveDateTime,
    policy: &AdmissionPolicy,
) -> Result<Booking, AdmissionError> {
    let booking = queries::get_booking_by_id(conn, id)?
        .ok_or_else(|| AdmissionError::NotFound("booking not found".to_string()))?;
    if booking.status != BookingStatus::Cancelled {
        return Err(AdmissionError::Validation(
            "Only cancelled bookings can be restored.".to_string(),
        ));
    }

    let buffer = match &booking.time_slot_id {
        Some(ts_id) => queries::get_time_slot(conn, ts_id)?
            .map(|t| t.buffer_minutes)
            .unwrap_or(0),
        None => 0,
    };

    let templates = queries::list_time_slots(conn, &booking.calendar_id)?;
    let existing = queries::list_confirmed_on_date(conn, &booking.calendar_id, booking.booking_date)?;
    let candidate = Candidate {
        calendar_id: booking.calendar_id.clone(),
        date: booking.booking_date,
        start: booking.start_time,
        end: booking.end_time,
        buffer_minutes: buffer,
    };
    let effective_now = now + Duration::minutes(policy.lead_time_minutes);
    let report = conflict::check(&candidate, &templates, &existing, Some(&booking.id), effective_now);
    if !report.is_valid() {
        if let Some(past) = report
            .conflicts
            .iter()
            .find(|c| c.kind == ConflictKind::PastBooking)
        {
            return Err(AdmissionError::PastOrOutOfRange(past.message.clone()));
        }
        return Err(AdmissionError::Conflict {
            messages: report.messages(),
        });
    }

    match queries::transition_booking_status(
        conn,
        &booking.id,
        BookingStatus::Cancelled,
        BookingStatus::Confirmed,
    ) {
        Ok(true) => Ok(Booking {
            status: BookingStatus::Confirmed,
            ..booking
        }),
        Ok(false) => Err(AdmissionError::Validation(
            "Only cancelled bookings can be restored.".to_string(),
        )),
        Err(e) if is_double_booking_violation(&e) => Err(AdmissionError::lost_race()),
        Err(e) => Err(AdmissionError::Storage(e.into())),
    }
}

fn transition(
    conn: &Connection,
    id: &str,
    from: BookingStatus,
    to: BookingStatus,
) -> Result<Booking, AdmissionError> {
    let booking = queries::get_booking_by_id(conn, id)?
        .ok_or_else(|| AdmissionError::NotFound("booking not found".to_string()))?;

    let updated = queries::transition_booking_status(conn, id, from, to)
        .map_err(|e| AdmissionError::Storage(e.into()))?;
    if !updated {
        return Err(AdmissionError::Validation(format!(
            "booking is {}, expected {}",
            booking.status.as_str(),
            from.as_str()
        )));
    }

    Ok(Booking {
        status: to,
        ..booking
    })
}

fn is_double_booking_violation(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(err, Some(msg)) => {
            err.code == rusqlite::ErrorCode::ConstraintViolation
                && msg.contains("bookings.booking_date")
        }
        _ => false,
    }
}

fn is_plausible_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    match s.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, AdmissionError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| AdmissionError::Validation(format!("invalid booking date: {s}")))
}

fn parse_start_time(s: &str) -> Result<NaiveTime, AdmissionError> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map(truncate_to_minute)
        .map_err(|_| AdmissionError::Validation(format!("invalid start time: {s}")))
}
