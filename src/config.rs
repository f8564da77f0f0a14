use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    /// Minimum minutes between "now" and the earliest bookable instance.
    pub lead_time_minutes: i64,
    /// Bookings further out than this many days are rejected.
    pub horizon_days: i64,
    pub notifier: String,
    pub resend_api_key: String,
    pub from_email: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "slotbook.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            lead_time_minutes: env::var("BOOKING_LEAD_TIME_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            horizon_days: env::var("BOOKING_HORIZON_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(180),
            notifier: env::var("NOTIFIER").unwrap_or_else(|_| "log".to_string()),
            resend_api_key: env::var("RESEND_API_KEY").unwrap_or_default(),
            from_email: env::var("FROM_EMAIL")
                .unwrap_or_else(|_| "bookings@slotbook.local".to_string()),
        }
    }
}
