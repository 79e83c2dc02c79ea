use async_trait::async_trait;

use super::appointment::Appointment;

/// Booking side effects (confirmation mail, push). Best effort: the caller
/// logs a failure and keeps the appointment.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn booking_confirmed(&self, appt: &Appointment) -> anyhow::Result<()>;
}

/// Writes confirmations to the log; stands in until a mail relay is wired.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn booking_confirmed(&self, appt: &Appointment) -> anyhow::Result<()> {
        tracing::info!(
            appointment_id = %appt.appointment_id,
            patient_id = %appt.patient_id,
            date = %appt.appointment_date,
            start = %appt.start_time,
            "booking confirmation"
        );
        Ok(())
    }
}
