use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, Calendar, TimeSlot};
use crate::services::admission;
use crate::services::conflict;
use crate::services::slot_time::TimeRange;
use crate::state::AppState;

fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

fn parse_time(s: &str) -> Result<NaiveTime, AppError> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|_| AppError::Validation(format!("invalid time: {s}")))
}

// ── Calendars ──

#[derive(Deserialize)]
pub struct CalendarPayload {
    pub title: String,
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

pub async fn create_calendar(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CalendarPayload>,
) -> Result<Json<Calendar>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    if payload.title.trim().is_empty() {
        return Err(AppError::Validation("title is required".to_string()));
    }

    let now = Utc::now().naive_utc();
    let calendar = Calendar {
        id: Uuid::new_v4().to_string(),
        owner_id: "default".to_string(),
        title: payload.title.trim().to_string(),
        description: payload.description,
        is_active: payload.is_active,
        created_at: now,
        updated_at: now,
    };

    {
        let db = state.db.lock().unwrap();
        queries::create_calendar(&db, &calendar)?;
    }

    Ok(Json(calendar))
}

pub async fn list_calendars(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Calendar>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let calendars = {
        let db = state.db.lock().unwrap();
        queries::list_calendars(&db)?
    };
    Ok(Json(calendars))
}

pub async fn update_calendar(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<CalendarPayload>,
) -> Result<Json<Calendar>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    if payload.title.trim().is_empty() {
        return Err(AppError::Validation("title is required".to_string()));
    }

    let calendar = {
        let db = state.db.lock().unwrap();
        let updated = queries::update_calendar(
            &db,
            &id,
            payload.title.trim(),
            payload.description.as_deref(),
            payload.is_active,
        )?;
        if !updated {
            return Err(AppError::NotFound("calendar not found".to_string()));
        }
        queries::get_calendar(&db, &id)?
            .ok_or_else(|| AppError::NotFound("calendar not found".to_string()))?
    };

    Ok(Json(calendar))
}

/// Deletion is blocked while future confirmed bookings reference the
/// calendar.
pub async fn delete_calendar(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let now = Utc::now().naive_utc();
    {
        let db = state.db.lock().unwrap();
        let future = queries::count_future_confirmed_for_calendar(&db, &id, now)?;
        if future > 0 {
            return Err(AppError::Conflict(vec![format!(
                "Cannot delete a calendar with {future} upcoming confirmed bookings."
            )]));
        }
        if !queries::delete_calendar(&db, &id)? {
            return Err(AppError::NotFound("calendar not found".to_string()));
        }
    }

    Ok(Json(serde_json::json!({ "success": true })))
}

// ── Time slot templates ──

#[derive(Deserialize)]
pub struct TimeSlotPayload {
    pub day_of_week: u8,
    pub start_time: String,
    pub end_time: String,
    pub duration_minutes: i32,
    #[serde(default)]
    pub buffer_minutes: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl TimeSlotPayload {
    fn into_slot(self, id: String, calendar_id: String) -> Result<TimeSlot, AppError> {
        let now = Utc::now().naive_utc();
        let slot = TimeSlot {
            id,
            calendar_id,
            day_of_week: self.day_of_week,
            start_time: parse_time(&self.start_time)?,
            end_time: parse_time(&self.end_time)?,
            duration_minutes: self.duration_minutes,
            buffer_minutes: self.buffer_minutes,
            is_active: self.is_active,
            created_at: now,
            updated_at: now,
        };
        slot.validate().map_err(AppError::Validation)?;
        Ok(slot)
    }
}

pub async fn create_time_slot(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(calendar_id): Path<String>,
    Json(payload): Json<TimeSlotPayload>,
) -> Result<Json<TimeSlot>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let slot = payload.into_slot(Uuid::new_v4().to_string(), calendar_id.clone())?;

    {
        let db = state.db.lock().unwrap();
        queries::get_calendar(&db, &calendar_id)?
            .ok_or_else(|| AppError::NotFound("calendar not found".to_string()))?;

        let siblings = queries::list_time_slots(&db, &calendar_id)?;
        let window = TimeRange::new(slot.start_time, slot.end_time);
        if let Some(other) =
            conflict::template_window_conflict(&siblings, slot.day_of_week, &window, None)
        {
            return Err(AppError::Conflict(vec![format!(
                "Window overlaps existing time slot {other} on the same day."
            )]));
        }

        queries::create_time_slot(&db, &slot)?;
    }

    Ok(Json(slot))
}

pub async fn list_time_slots(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(calendar_id): Path<String>,
) -> Result<Json<Vec<TimeSlot>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let slots = {
        let db = state.db.lock().unwrap();
        queries::list_time_slots(&db, &calendar_id)?
    };
    Ok(Json(slots))
}

pub async fn update_time_slot(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<TimeSlotPayload>,
) -> Result<Json<TimeSlot>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    {
        let db = state.db.lock().unwrap();
        let current = queries::get_time_slot(&db, &id)?
            .ok_or_else(|| AppError::NotFound("time slot not found".to_string()))?;

        let slot = payload.into_slot(current.id.clone(), current.calendar_id.clone())?;

        let siblings = queries::list_time_slots(&db, &current.calendar_id)?;
        let window = TimeRange::new(slot.start_time, slot.end_time);
        if let Some(other) =
            conflict::template_window_conflict(&siblings, slot.day_of_week, &window, Some(&id))
        {
            return Err(AppError::Conflict(vec![format!(
                "Window overlaps existing time slot {other} on the same day."
            )]));
        }

        queries::update_time_slot(&db, &slot)?;
        Ok(Json(slot))
    }
}

/// Deletion is blocked while future confirmed bookings reference the
/// template; historical bookings keep their reference regardless.
pub async fn delete_time_slot(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let now = Utc::now().naive_utc();
    {
        let db = state.db.lock().unwrap();
        let future = queries::count_future_confirmed_for_slot(&db, &id, now)?;
        if future > 0 {
            return Err(AppError::Conflict(vec![format!(
                "Cannot delete a time slot with {future} upcoming confirmed bookings."
            )]));
        }
        if !queries::delete_time_slot(&db, &id)? {
            return Err(AppError::NotFound("time slot not found".to_string()));
        }
    }

    Ok(Json(serde_json::json!({ "success": true })))
}

// ── Bookings ──

#[derive(Deserialize)]
pub struct BookingsQuery {
    pub calendar_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct AdminBookingResponse {
    pub id: String,
    pub calendar_id: String,
    pub time_slot_id: Option<String>,
    pub booking_date: String,
    pub start_time: String,
    pub end_time: String,
    pub guest_name: String,
    pub guest_email: String,
    pub notes: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Booking> for AdminBookingResponse {
    fn from(b: Booking) -> Self {
        Self {
            id: b.id,
            calendar_id: b.calendar_id,
            time_slot_id: b.time_slot_id,
            booking_date: b.booking_date.format("%Y-%m-%d").to_string(),
            start_time: b.start_time.format("%H:%M:%S").to_string(),
            end_time: b.end_time.format("%H:%M:%S").to_string(),
            guest_name: b.guest_name,
            guest_email: b.guest_email,
            notes: b.notes,
            status: b.status.as_str().to_string(),
            created_at: b.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            updated_at: b.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<AdminBookingResponse>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let limit = query.limit.unwrap_or(50);
    let bookings = {
        let db = state.db.lock().unwrap();
        queries::list_bookings(
            &db,
            query.calendar_id.as_deref(),
            query.status.as_deref(),
            limit,
        )?
    };

    Ok(Json(bookings.into_iter().map(Into::into).collect()))
}

pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let booking = {
        let db = state.db.lock().unwrap();
        admission::cancel_by_id(&db, &id)?
    };

    let title = {
        let db = state.db.lock().unwrap();
        queries::get_calendar(&db, &booking.calendar_id)
            .ok()
            .flatten()
            .map(|c| c.title)
            .unwrap_or_else(|| "Booking".to_string())
    };
    let state_for_notify = Arc::clone(&state);
    tokio::spawn(async move {
        if let Err(e) = state_for_notify
            .notifier
            .booking_cancelled(&booking, &title)
            .await
        {
            tracing::error!(error = %e, "cancellation notification failed");
        }
    });

    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn complete_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    {
        let db = state.db.lock().unwrap();
        admission::complete(&db, &id)?;
    }

    Ok(Json(serde_json::json!({ "success": true })))
}

/// Privileged override: re-confirm a cancelled booking after a fresh
/// conflict check.
pub async fn restore_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let now = Utc::now().naive_utc();
    {
        let db = state.db.lock().unwrap();
        admission::restore(&db, &id, now, &state.policy())?;
    }

    Ok(Json(serde_json::json!({ "success": true })))
}
