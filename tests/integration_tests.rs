use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use chrono::{Datelike, Duration as ChronoDuration, Utc};
use tower::ServiceExt;

use slotbook::config::AppConfig;
use slotbook::db;
use slotbook::handlers;
use slotbook::models::Booking;
use slotbook::services::notify::Notifier;
use slotbook::state::AppState;

// ── Mock Notifier ──

#[derive(Clone)]
struct MockNotifier {
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockNotifier {
    fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(vec![])),
        }
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn booking_confirmed(
        &self,
        booking: &Booking,
        _calendar_title: &str,
    ) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push(("confirmed".to_string(), booking.id.clone()));
        Ok(())
    }

    async fn booking_cancelled(
        &self,
        booking: &Booking,
        _calendar_title: &str,
    ) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push(("cancelled".to_string(), booking.id.clone()));
        Ok(())
    }
}

// ── Helpers ──

fn test_config() -> AppConfig {
    AppConfig {
        port: 3000,
        database_url: ":memory:".to_string(),
        admin_token: "test-token".to_string(),
        lead_time_minutes: 0,
        horizon_days: 180,
        notifier: "log".to_string(),
        resend_api_key: "".to_string(),
        from_email: "test@example.com".to_string(),
    }
}

fn test_state() -> (Arc<AppState>, Arc<Mutex<Vec<(String, String)>>>) {
    let conn = db::init_db(":memory:").unwrap();
    let notifier = MockNotifier::new();
    let sent = Arc::clone(&notifier.sent);
    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: test_config(),
        notifier: Box::new(notifier),
    });
    (state, sent)
}

fn test_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/bookings", post(handlers::bookings::create_booking))
        .route(
            "/api/bookings/cancel/:token",
            post(handlers::bookings::cancel_booking),
        )
        .route(
            "/api/calendars/:id/availability",
            get(handlers::bookings::list_availability),
        )
        .route(
            "/api/admin/calendars",
            get(handlers::admin::list_calendars).post(handlers::admin::create_calendar),
        )
        .route(
            "/api/admin/calendars/:id",
            post(handlers::admin::update_calendar).delete(handlers::admin::delete_calendar),
        )
        .route(
            "/api/admin/calendars/:id/time-slots",
            get(handlers::admin::list_time_slots).post(handlers::admin::create_time_slot),
        )
        .route(
            "/api/admin/time-slots/:id",
            post(handlers::admin::update_time_slot).delete(handlers::admin::delete_time_slot),
        )
        .route("/api/admin/bookings", get(handlers::admin::list_bookings))
        .route(
            "/api/admin/bookings/:id/cancel",
            post(handlers::admin::cancel_booking),
        )
        .route(
            "/api/admin/bookings/:id/complete",
            post(handlers::admin::complete_booking),
        )
        .route(
            "/api/admin/bookings/:id/restore",
            post(handlers::admin::restore_booking),
        )
        .with_state(state)
}

fn admin_post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Authorization", "Bearer test-token")
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn admin_get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("Authorization", "Bearer test-token")
        .body(Body::empty())
        .unwrap()
}

fn public_post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

async fn json_body(res: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Wait for fire-and-forget notification tasks to run.
async fn drain_notifications() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// A future date (about a week out) plus its 0=Sunday weekday number,
/// so seeded templates always match the booked date.
fn future_booking_date() -> (String, u8) {
    let date = Utc::now().date_naive() + ChronoDuration::days(8);
    (
        date.format("%Y-%m-%d").to_string(),
        date.weekday().num_days_from_sunday() as u8,
    )
}

/// Seed a calendar with one weekly template covering `day_of_week`
/// 09:00-17:00, 30-minute slots. Returns (calendar_id, time_slot_id).
async fn seed_calendar(app: &Router, day_of_week: u8, buffer_minutes: i32) -> (String, String) {
    let res = app
        .clone()
        .oneshot(admin_post(
            "/api/admin/calendars",
            serde_json::json!({ "title": "Consultations" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let calendar = json_body(res).await;
    let calendar_id = calendar["id"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(admin_post(
            &format!("/api/admin/calendars/{calendar_id}/time-slots"),
            serde_json::json!({
                "day_of_week": day_of_week,
                "start_time": "09:00",
                "end_time": "17:00",
                "duration_minutes": 30,
                "buffer_minutes": buffer_minutes,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let slot = json_body(res).await;
    let slot_id = slot["id"].as_str().unwrap().to_string();

    (calendar_id, slot_id)
}

fn booking_payload(
    calendar_id: &str,
    slot_id: &str,
    date: &str,
    start: &str,
) -> serde_json::Value {
    serde_json::json!({
        "calendar_id": calendar_id,
        "time_slot_id": slot_id,
        "booking_date": date,
        "start_time": start,
        "guest_name": "Alice",
        "guest_email": "alice@example.com",
    })
}

// ── Tests ──

#[tokio::test]
async fn test_health() {
    let (state, _) = test_state();
    let app = test_app(state);

    let res = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_admin_requires_auth() {
    let (state, _) = test_state();
    let app = test_app(state);

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/admin/bookings")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = app
        .oneshot(
            Request::builder()
                .uri("/api/admin/bookings")
                .header("Authorization", "Bearer wrong-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_booking_flow_end_to_end() {
    let (state, sent) = test_state();
    let app = test_app(state);
    let (date, dow) = future_booking_date();
    let (calendar_id, slot_id) = seed_calendar(&app, dow, 0).await;

    // availability lists 16 instances (09:00-17:00 / 30min)
    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/api/calendars/{calendar_id}/availability?from={date}&to={date}"
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let instances = json_body(res).await;
    assert_eq!(instances.as_array().unwrap().len(), 16);
    assert_eq!(instances[0]["start_time"], "09:00:00");

    // book 10:00
    let res = app
        .clone()
        .oneshot(public_post(
            "/api/bookings",
            booking_payload(&calendar_id, &slot_id, &date, "10:00"),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = json_body(res).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["booking"]["status"], "confirmed");
    assert_eq!(body["booking"]["end_time"], "10:30:00");
    let token = body["booking"]["cancellation_token"]
        .as_str()
        .unwrap()
        .to_string();
    let booking_id = body["booking"]["id"].as_str().unwrap().to_string();

    drain_notifications().await;
    assert_eq!(
        sent.lock().unwrap().as_slice(),
        &[("confirmed".to_string(), booking_id.clone())]
    );

    // the booked instance disappears from availability
    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/api/calendars/{calendar_id}/availability?from={date}&to={date}"
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let instances = json_body(res).await;
    assert_eq!(instances.as_array().unwrap().len(), 15);
    assert!(instances
        .as_array()
        .unwrap()
        .iter()
        .all(|i| i["start_time"] != "10:00:00"));

    // double booking is a conflict with reasons
    let res = app
        .clone()
        .oneshot(public_post(
            "/api/bookings",
            booking_payload(&calendar_id, &slot_id, &date, "10:00"),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body = json_body(res).await;
    assert!(!body["conflicts"].as_array().unwrap().is_empty());

    // guest cancels via token
    let res = app
        .clone()
        .oneshot(public_post(
            &format!("/api/bookings/cancel/{token}"),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    drain_notifications().await;
    assert_eq!(sent.lock().unwrap().len(), 2);
    assert_eq!(sent.lock().unwrap()[1].0, "cancelled");

    // the instance is bookable again
    let res = app
        .clone()
        .oneshot(public_post(
            "/api/bookings",
            booking_payload(&calendar_id, &slot_id, &date, "10:00"),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_booking_validation_errors() {
    let (state, _) = test_state();
    let app = test_app(state);
    let (date, dow) = future_booking_date();
    let (calendar_id, slot_id) = seed_calendar(&app, dow, 0).await;

    let mut payload = booking_payload(&calendar_id, &slot_id, &date, "10:00");
    payload["guest_email"] = serde_json::json!("not-an-email");
    let res = app
        .clone()
        .oneshot(public_post("/api/bookings", payload))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let mut payload = booking_payload(&calendar_id, &slot_id, &date, "10:00");
    payload["guest_name"] = serde_json::json!("  ");
    let res = app
        .clone()
        .oneshot(public_post("/api/bookings", payload))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // unknown calendar
    let res = app
        .clone()
        .oneshot(public_post(
            "/api/bookings",
            booking_payload("nope", &slot_id, &date, "10:00"),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    // past booking
    let res = app
        .oneshot(public_post(
            "/api/bookings",
            booking_payload(&calendar_id, &slot_id, "2020-01-06", "10:00"),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_buffer_enforced_over_http() {
    let (state, _) = test_state();
    let app = test_app(state);
    let (date, dow) = future_booking_date();
    let (calendar_id, slot_id) = seed_calendar(&app, dow, 15).await;

    let res = app
        .clone()
        .oneshot(public_post(
            "/api/bookings",
            booking_payload(&calendar_id, &slot_id, &date, "10:00"),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // back-to-back violates the 15-minute buffer
    let res = app
        .clone()
        .oneshot(public_post(
            "/api/bookings",
            booking_payload(&calendar_id, &slot_id, &date, "10:30"),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    // a 15-minute gap is allowed
    let res = app
        .oneshot(public_post(
            "/api/bookings",
            booking_payload(&calendar_id, &slot_id, &date, "10:45"),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_template_window_overlap_rejected() {
    let (state, _) = test_state();
    let app = test_app(state);
    let (_, dow) = future_booking_date();
    let (calendar_id, _) = seed_calendar(&app, dow, 0).await;

    let res = app
        .clone()
        .oneshot(admin_post(
            &format!("/api/admin/calendars/{calendar_id}/time-slots"),
            serde_json::json!({
                "day_of_week": dow,
                "start_time": "16:00",
                "end_time": "18:00",
                "duration_minutes": 30,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    // adjacent window on the same day is fine
    let res = app
        .oneshot(admin_post(
            &format!("/api/admin/calendars/{calendar_id}/time-slots"),
            serde_json::json!({
                "day_of_week": dow,
                "start_time": "17:00",
                "end_time": "19:00",
                "duration_minutes": 30,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_invalid_template_rejected() {
    let (state, _) = test_state();
    let app = test_app(state);
    let (_, dow) = future_booking_date();
    let (calendar_id, _) = seed_calendar(&app, dow, 0).await;

    // inverted window
    let res = app
        .clone()
        .oneshot(admin_post(
            &format!("/api/admin/calendars/{calendar_id}/time-slots"),
            serde_json::json!({
                "day_of_week": (dow + 1) % 7,
                "start_time": "17:00",
                "end_time": "09:00",
                "duration_minutes": 30,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // duration exceeds window
    let res = app
        .oneshot(admin_post(
            &format!("/api/admin/calendars/{calendar_id}/time-slots"),
            serde_json::json!({
                "day_of_week": (dow + 1) % 7,
                "start_time": "09:00",
                "end_time": "09:30",
                "duration_minutes": 60,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_delete_blocked_by_future_booking() {
    let (state, _) = test_state();
    let app = test_app(state);
    let (date, dow) = future_booking_date();
    let (calendar_id, slot_id) = seed_calendar(&app, dow, 0).await;

    let res = app
        .clone()
        .oneshot(public_post(
            "/api/bookings",
            booking_payload(&calendar_id, &slot_id, &date, "10:00"),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = json_body(res).await;
    let token = body["booking"]["cancellation_token"]
        .as_str()
        .unwrap()
        .to_string();

    // both the template and the calendar refuse deletion
    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/admin/time-slots/{slot_id}"))
                .header("Authorization", "Bearer test-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/admin/calendars/{calendar_id}"))
                .header("Authorization", "Bearer test-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    // cancelling the booking unblocks deletion
    let res = app
        .clone()
        .oneshot(public_post(
            &format!("/api/bookings/cancel/{token}"),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/admin/time-slots/{slot_id}"))
                .header("Authorization", "Bearer test-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_admin_booking_lifecycle() {
    let (state, _) = test_state();
    let app = test_app(state);
    let (date, dow) = future_booking_date();
    let (calendar_id, slot_id) = seed_calendar(&app, dow, 0).await;

    let res = app
        .clone()
        .oneshot(public_post(
            "/api/bookings",
            booking_payload(&calendar_id, &slot_id, &date, "11:00"),
        ))
        .await
        .unwrap();
    let body = json_body(res).await;
    let booking_id = body["booking"]["id"].as_str().unwrap().to_string();

    // owner cancels
    let res = app
        .clone()
        .oneshot(admin_post(
            &format!("/api/admin/bookings/{booking_id}/cancel"),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .clone()
        .oneshot(admin_get("/api/admin/bookings?status=cancelled"))
        .await
        .unwrap();
    let body = json_body(res).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["id"], booking_id.as_str());

    // restore re-confirms while the instance is free
    let res = app
        .clone()
        .oneshot(admin_post(
            &format!("/api/admin/bookings/{booking_id}/restore"),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // then the owner completes it
    let res = app
        .clone()
        .oneshot(admin_post(
            &format!("/api/admin/bookings/{booking_id}/complete"),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // completed is terminal: restore now fails
    let res = app
        .clone()
        .oneshot(admin_post(
            &format!("/api/admin/bookings/{booking_id}/restore"),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_restore_conflicts_when_slot_retaken() {
    let (state, _) = test_state();
    let app = test_app(state);
    let (date, dow) = future_booking_date();
    let (calendar_id, slot_id) = seed_calendar(&app, dow, 0).await;

    let res = app
        .clone()
        .oneshot(public_post(
            "/api/bookings",
            booking_payload(&calendar_id, &slot_id, &date, "11:00"),
        ))
        .await
        .unwrap();
    let body = json_body(res).await;
    let booking_id = body["booking"]["id"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(admin_post(
            &format!("/api/admin/bookings/{booking_id}/cancel"),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // another guest takes the freed instance
    let res = app
        .clone()
        .oneshot(public_post(
            "/api/bookings",
            booking_payload(&calendar_id, &slot_id, &date, "11:00"),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .oneshot(admin_post(
            &format!("/api/admin/bookings/{booking_id}/restore"),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_cancel_unknown_token() {
    let (state, _) = test_state();
    let app = test_app(state);

    let res = app
        .oneshot(public_post(
            "/api/bookings/cancel/no-such-token",
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_availability_empty_without_templates() {
    let (state, _) = test_state();
    let app = test_app(state);
    let (date, _) = future_booking_date();

    let res = app
        .clone()
        .oneshot(admin_post(
            "/api/admin/calendars",
            serde_json::json!({ "title": "Empty" }),
        ))
        .await
        .unwrap();
    let calendar = json_body(res).await;
    let calendar_id = calendar["id"].as_str().unwrap();

    let res = app
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/api/calendars/{calendar_id}/availability?from={date}&to={date}"
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let instances = json_body(res).await;
    assert!(instances.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_inactive_calendar_hidden_from_public() {
    let (state, _) = test_state();
    let app = test_app(state);
    let (date, dow) = future_booking_date();
    let (calendar_id, slot_id) = seed_calendar(&app, dow, 0).await;

    let res = app
        .clone()
        .oneshot(admin_post(
            &format!("/api/admin/calendars/{calendar_id}"),
            serde_json::json!({ "title": "Consultations", "is_active": false }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/api/calendars/{calendar_id}/availability?from={date}&to={date}"
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = app
        .oneshot(public_post(
            "/api/bookings",
            booking_payload(&calendar_id, &slot_id, &date, "10:00"),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
