pub mod booking;
pub mod calendar;
pub mod time_slot;

pub use booking::{Booking, BookingStatus};
pub use calendar::Calendar;
pub use time_slot::TimeSlot;
