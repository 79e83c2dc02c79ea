//! Appointment record and its status lifecycle.
//!
//! ```text
//! scheduled ──► completed   (doctor: prescription or explicit status)
//!     │ ├─────► cancelled   (patient or doctor)
//!     │ └─────► no-show     (direct status update)
//! ```
//! `completed`, `cancelled` and `no-show` accept no further status change,
//! except that a completed appointment's prescription may be re-issued.
//! Completing by explicit status leaves the prescription absent.
//! Payment status is independent of the lifecycle.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::BookingError;
use super::schedule::SlotTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
pub enum AppointmentStatus {
    Scheduled = 0,
    Completed = 1,
    Cancelled = 2,
    NoShow = 3,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no-show",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, BookingError> {
        match raw.trim() {
            "scheduled" => Ok(AppointmentStatus::Scheduled),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            "no-show" => Ok(AppointmentStatus::NoShow),
            other => Err(BookingError::validation(format!(
                "invalid status {other:?}, expected scheduled|completed|cancelled|no-show"
            ))),
        }
    }

    pub fn can_transition_to(self, to: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (self, to),
            (Scheduled, Completed) | (Scheduled, Cancelled) | (Scheduled, NoShow)
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
pub enum PaymentStatus {
    Pending = 0,
    Completed = 1,
    Refunded = 2,
}

impl PaymentStatus {
    pub fn parse(raw: &str) -> Result<Self, BookingError> {
        match raw.trim() {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(BookingError::validation(format!(
                "invalid paymentStatus {other:?}, expected pending|completed|refunded"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medicine {
    pub name: String,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub duration: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prescription {
    #[serde(default)]
    pub medicines: Vec<Medicine>,
    pub diagnosis: Option<String>,
    pub follow_up_date: Option<NaiveDate>,
    pub advice: Option<String>,
    /// Server-assigned; any client value is overwritten.
    pub issued_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_date: NaiveDate,
    pub start_time: SlotTime,
    pub end_time: SlotTime,
    pub status: AppointmentStatus,
    pub symptoms: String,
    pub notes: Option<String>,
    pub prescription: Option<Prescription>,
    pub payment_status: PaymentStatus,
    /// Doctor's fee at booking time, in cents.
    #[serde(rename = "paymentAmount")]
    pub payment_amount_cents: i32,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// Fresh `scheduled` appointment with the fee snapshotted from the doctor.
    #[allow(clippy::too_many_arguments)]
    pub fn schedule(
        patient_id: Uuid,
        doctor_id: Uuid,
        appointment_date: NaiveDate,
        start_time: SlotTime,
        end_time: SlotTime,
        symptoms: String,
        notes: Option<String>,
        fee_cents: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            appointment_id: Uuid::new_v4(),
            patient_id,
            doctor_id,
            appointment_date,
            start_time,
            end_time,
            status: AppointmentStatus::Scheduled,
            symptoms,
            notes,
            prescription: None,
            payment_status: PaymentStatus::Pending,
            payment_amount_cents: fee_cents,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition(&mut self, to: AppointmentStatus, now: DateTime<Utc>) -> Result<(), BookingError> {
        if !self.status.can_transition_to(to) {
            return Err(BookingError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), BookingError> {
        self.transition(AppointmentStatus::Cancelled, now)
    }

    /// Attach (or re-issue) the prescription and complete the appointment.
    pub fn attach_prescription(
        &mut self,
        mut prescription: Prescription,
        now: DateTime<Utc>,
    ) -> Result<(), BookingError> {
        match self.status {
            AppointmentStatus::Scheduled | AppointmentStatus::Completed => {}
            from => {
                return Err(BookingError::InvalidTransition {
                    from,
                    to: AppointmentStatus::Completed,
                })
            }
        }
        prescription.issued_date = Some(now);
        self.prescription = Some(prescription);
        self.status = AppointmentStatus::Completed;
        self.updated_at = now;
        Ok(())
    }

    pub fn set_payment_status(&mut self, status: PaymentStatus, now: DateTime<Utc>) {
        self.payment_status = status;
        self.updated_at = now;
    }
}

#[cfg(test)]
pub(crate) fn sample(now: DateTime<Utc>) -> Appointment {
    Appointment::schedule(
        Uuid::new_v4(),
        Uuid::new_v4(),
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
        SlotTime::parse("09:00").unwrap(),
        SlotTime::parse("09:30").unwrap(),
        "fever".into(),
        None,
        5000,
        now,
    )
}
