use chrono::{NaiveTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A recurring weekly availability window. `day_of_week` is 0 (Sunday)
/// through 6 (Saturday).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSlot {
    pub id: String,
    pub calendar_id: String,
    pub day_of_week: u8,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_minutes: i32,
    pub buffer_minutes: i32,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl TimeSlot {
    /// Structural invariants: window start < end, positive duration that
    /// fits the window, non-negative buffer, weekday in 0..=6.
    pub fn validate(&self) -> Result<(), String> {
        if self.day_of_week > 6 {
            return Err(format!("day_of_week must be 0-6, got {}", self.day_of_week));
        }
        if self.start_time >= self.end_time {
            return Err("window start must be before window end".to_string());
        }
        if self.duration_minutes <= 0 {
            return Err("duration must be positive".to_string());
        }
        if self.buffer_minutes < 0 {
            return Err("buffer must not be negative".to_string());
        }
        let window = (self.end_time - self.start_time).num_minutes();
        if i64::from(self.duration_minutes) > window {
            return Err(format!(
                "duration {}min does not fit the {}min window",
                self.duration_minutes, window
            ));
        }
        Ok(())
    }
}
