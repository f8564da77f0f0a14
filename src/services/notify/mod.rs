pub mod resend;

use async_trait::async_trait;

use crate::models::Booking;

/// Best-effort outbound notification. Failures are logged by callers
/// and never affect the booking they describe.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn booking_confirmed(&self, booking: &Booking, calendar_title: &str)
        -> anyhow::Result<()>;

    async fn booking_cancelled(&self, booking: &Booking, calendar_title: &str)
        -> anyhow::Result<()>;
}

/// Default provider: writes the notification to the log instead of
/// sending email. Useful for development and tests.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn booking_confirmed(
        &self,
        booking: &Booking,
        calendar_title: &str,
    ) -> anyhow::Result<()> {
        tracing::info!(
            booking_id = %booking.id,
            guest = %booking.guest_email,
            calendar = %calendar_title,
            date = %booking.booking_date,
            start = %booking.start_time,
            "booking confirmed"
        );
        Ok(())
    }

    async fn booking_cancelled(
        &self,
        booking: &Booking,
        calendar_title: &str,
    ) -> anyhow::Result<()> {
        tracing::info!(
            booking_id = %booking.id,
            guest = %booking.guest_email,
            calendar = %calendar_title,
            "booking cancelled"
        );
        Ok(())
    }
}
