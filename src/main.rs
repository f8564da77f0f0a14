use std::sync::{Arc, Mutex};

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use slotbook::config::AppConfig;
use slotbook::db;
use slotbook::handlers;
use slotbook::services::notify::resend::ResendEmailNotifier;
use slotbook::services::notify::{LogNotifier, Notifier};
use slotbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    let notifier: Box<dyn Notifier> = match config.notifier.as_str() {
        "resend" => {
            anyhow::ensure!(
                !config.resend_api_key.is_empty(),
                "RESEND_API_KEY must be set when NOTIFIER=resend"
            );
            tracing::info!("using Resend email notifier (from: {})", config.from_email);
            Box::new(ResendEmailNotifier::new(
                config.resend_api_key.clone(),
                config.from_email.clone(),
            ))
        }
        _ => {
            tracing::info!("using log-only notifier");
            Box::new(LogNotifier)
        }
    };

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        notifier,
    });

    let app = Router::new()
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
        // the public booking endpoints are called from browser embeds
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
