use anyhow::Context;
use async_trait::async_trait;

use super::Notifier;
use crate::models::Booking;

/// Email notifications via the Resend HTTP API.
pub struct ResendEmailNotifier {
    api_key: String,
    from_email: String,
    client: reqwest::Client,
}

impl ResendEmailNotifier {
    pub fn new(api_key: String, from_email: String) -> Self {
        Self {
            api_key,
            from_email,
            client: reqwest::Client::new(),
        }
    }

    async fn send(&self, to: &str, subject: &str, html: String) -> anyhow::Result<()> {
        self.client
            .post("https://api.resend.com/emails")
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "from": self.from_email,
                "to": [to],
                "subject": subject,
                "html": html,
            }))
            .send()
            .await
            .context("failed to send email")?
            .error_for_status()
            .context("email API returned error")?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for ResendEmailNotifier {
    async fn booking_confirmed(
        &self,
        booking: &Booking,
        calendar_title: &str,
    ) -> anyhow::Result<()> {
        let subject = format!("Booking confirmed - {calendar_title}");
        let html = format!(
            "<p>Hi {name},</p>\
             <p>Your booking for <strong>{title}</strong> on {date} from {start} to {end} is confirmed.</p>\
             <p>Need to cancel? Use this token: <code>{token}</code></p>",
            name = booking.guest_name,
            title = calendar_title,
            date = booking.booking_date.format("%A, %B %-d, %Y"),
            start = booking.start_time.format("%H:%M"),
            end = booking.end_time.format("%H:%M"),
            token = booking.cancellation_token,
        );
        self.send(&booking.guest_email, &subject, html).await
    }

    async fn booking_cancelled(
        &self,
        booking: &Booking,
        calendar_title: &str,
    ) -> anyhow::Result<()> {
        let subject = format!("Booking cancelled - {calendar_title}");
        let html = format!(
            "<p>Hi {name},</p>\
             <p>Your booking for <strong>{title}</strong> on {date} at {start} has been cancelled.</p>",
            name = booking.guest_name,
            title = calendar_title,
            date = booking.booking_date.format("%A, %B %-d, %Y"),
            start = booking.start_time.format("%H:%M"),
        );
        self.send(&booking.guest_email, &subject, html).await
    }
}
