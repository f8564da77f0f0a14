use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::services::admission::AdmissionPolicy;
use crate::services::notify::Notifier;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub notifier: Box<dyn Notifier>,
}

impl AppState {
    pub fn policy(&self) -> AdmissionPolicy {
        AdmissionPolicy {
            lead_time_minutes: self.config.lead_time_minutes,
            horizon_days: self.config.horizon_days,
        }
    }
}
