use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A bookable service owned by a host. Owns zero or more weekly
/// time slot templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Calendar {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
