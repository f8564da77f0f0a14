pub mod admission;
pub mod conflict;
pub mod expansion;
pub mod notify;
pub mod slot_time;
