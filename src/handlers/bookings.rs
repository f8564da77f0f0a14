use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::Booking;
use crate::services::admission::{self, BookingRequest};
use crate::services::expansion;
use crate::services::slot_time::truncate_to_minute;
use crate::state::AppState;

#[derive(Serialize)]
pub struct BookingResponse {
    pub id: String,
    pub calendar_id: String,
    pub booking_date: String,
    pub start_time: String,
    pub end_time: String,
    pub status: String,
    pub cancellation_token: String,
}

impl From<&Booking> for BookingResponse {
    fn from(b: &Booking) -> Self {
        Self {
            id: b.id.clone(),
            calendar_id: b.calendar_id.clone(),
            booking_date: b.booking_date.format("%Y-%m-%d").to_string(),
            start_time: b.start_time.format("%H:%M:%S").to_string(),
            end_time: b.end_time.format("%H:%M:%S").to_string(),
            status: b.status.as_str().to_string(),
            cancellation_token: b.cancellation_token.clone(),
        }
    }
}

/// Fire-and-forget notification; a failure is logged and never changes
/// the outcome of the request that triggered it.
fn notify_confirmed(state: Arc<AppState>, booking: Booking, calendar_title: String) {
    tokio::spawn(async move {
        if let Err(e) = state
            .notifier
            .booking_confirmed(&booking, &calendar_title)
            .await
        {
            tracing::error!(error = %e, booking_id = %booking.id, "confirmation notification failed");
        }
    });
}

fn notify_cancelled(state: Arc<AppState>, booking: Booking, calendar_title: String) {
    tokio::spawn(async move {
        if let Err(e) = state
            .notifier
            .booking_cancelled(&booking, &calendar_title)
            .await
        {
            tracing::error!(error = %e, booking_id = %booking.id, "cancellation notification failed");
        }
    });
}

fn calendar_title(state: &AppState, calendar_id: &str) -> String {
    let db = state.db.lock().unwrap();
    queries::get_calendar(&db, calendar_id)
        .ok()
        .flatten()
        .map(|c| c.title)
        .unwrap_or_else(|| "Booking".to_string())
}

// POST /api/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BookingRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let now = Utc::now().naive_utc();

    let booking = {
        let db = state.db.lock().unwrap();
        admission::admit(&db, &request, now, &state.policy())?
    };

    let title = calendar_title(&state, &booking.calendar_id);
    notify_confirmed(Arc::clone(&state), booking.clone(), title);

    Ok(Json(serde_json::json!({
        "success": true,
        "booking": BookingResponse::from(&booking),
    })))
}

// POST /api/bookings/cancel/:token
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let now = Utc::now().naive_utc();

    let booking = {
        let db = state.db.lock().unwrap();
        admission::cancel_by_token(&db, &token, now)?
    };

    let title = calendar_title(&state, &booking.calendar_id);
    notify_cancelled(Arc::clone(&state), booking, title);

    Ok(Json(serde_json::json!({ "success": true })))
}

// GET /api/calendars/:id/availability?from=YYYY-MM-DD&to=YYYY-MM-DD
#[derive(Deserialize)]
pub struct AvailabilityQuery {
    pub from: String,
    pub to: String,
}

#[derive(Serialize)]
pub struct InstanceResponse {
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub time_slot_id: String,
}

pub async fn list_availability(
    State(state): State<Arc<AppState>>,
    Path(calendar_id): Path<String>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Vec<InstanceResponse>>, AppError> {
    let from = parse_date(&query.from)?;
    let to = parse_date(&query.to)?;
    let now = Utc::now().naive_utc();

    let (slots, booked) = {
        let db = state.db.lock().unwrap();
        queries::get_active_calendar(&db, &calendar_id)?
            .ok_or_else(|| AppError::NotFound("calendar not found or inactive".to_string()))?;

        let slots = queries::list_time_slots(&db, &calendar_id)?;
        let booked: HashSet<_> = queries::confirmed_starts_in_range(&db, &calendar_id, from, to)?
            .into_iter()
            .map(|(date, start)| (date, truncate_to_minute(start)))
            .collect();
        (slots, booked)
    };

    let instances = expansion::expand(slots, from, to, booked, now, state.config.lead_time_minutes)
        .map(|i| InstanceResponse {
            date: i.date.format("%Y-%m-%d").to_string(),
            start_time: i.start_time.format("%H:%M:%S").to_string(),
            end_time: i.end_time.format("%H:%M:%S").to_string(),
            time_slot_id: i.time_slot_id,
        })
        .collect();

    Ok(Json(instances))
}

fn parse_date(s: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("invalid date: {s}")))
}
