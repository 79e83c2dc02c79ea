use thiserror::Error;
use uuid::Uuid;

use super::appointment::AppointmentStatus;
use super::store::StoreError;

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("slot {date} {start_time} is already booked for doctor {doctor_id}")]
    SlotConflict {
        doctor_id: Uuid,
        date: chrono::NaiveDate,
        start_time: String,
    },

    #[error("cannot change appointment status from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("{0}")]
    Forbidden(String),

    #[error("appointment {0} was modified concurrently, reload and retry")]
    ConcurrentUpdate(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BookingError {
    pub fn validation(msg: impl Into<String>) -> Self {
        BookingError::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        BookingError::Forbidden(msg.into())
    }
}
