//! Relationship-based access rules for appointments.
//!
//! A patient acts on appointments that name them as patient, a doctor on
//! appointments that name their doctor profile, an admin reads everything.
//! Doctors are always matched by doctor profile id, never by user id.

use uuid::Uuid;

use super::appointment::{Appointment, AppointmentStatus};
use super::error::BookingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
pub enum Role {
    Patient = 0,
    Admin = 1,
    Doctor = 2,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Admin => "admin",
            Role::Doctor => "doctor",
        }
    }
}

/// Authenticated caller, resolved server-side from the session.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
    /// Doctor profile id; set only for doctors that have a profile.
    pub doctor_id: Option<Uuid>,
}

impl Actor {
    pub fn is_patient_of(&self, appt: &Appointment) -> bool {
        self.role == Role::Patient && appt.patient_id == self.user_id
    }

    pub fn is_doctor_of(&self, appt: &Appointment) -> bool {
        self.role == Role::Doctor && self.doctor_id == Some(appt.doctor_id)
    }

    pub fn owns_doctor_profile(&self, doctor_id: Uuid) -> bool {
        self.role == Role::Doctor && self.doctor_id == Some(doctor_id)
    }
}

pub fn ensure_can_book(actor: &Actor) -> Result<(), BookingError> {
    if actor.role == Role::Patient {
        Ok(())
    } else {
        Err(BookingError::forbidden("only patients can book appointments"))
    }
}

pub fn ensure_can_edit_availability(actor: &Actor, doctor_id: Uuid) -> Result<(), BookingError> {
    if actor.owns_doctor_profile(doctor_id) {
        Ok(())
    } else {
        Err(BookingError::forbidden(
            "only the owning doctor can change this availability",
        ))
    }
}

pub fn ensure_can_read(actor: &Actor, appt: &Appointment) -> Result<(), BookingError> {
    if actor.role == Role::Admin || actor.is_patient_of(appt) || actor.is_doctor_of(appt) {
        Ok(())
    } else {
        Err(BookingError::forbidden("not your appointment"))
    }
}

/// Who may drive the lifecycle to `to`.
pub fn ensure_can_set_status(
    actor: &Actor,
    appt: &Appointment,
    to: AppointmentStatus,
) -> Result<(), BookingError> {
    let allowed = match to {
        AppointmentStatus::Completed => actor.is_doctor_of(appt),
        AppointmentStatus::Cancelled => actor.is_patient_of(appt) || actor.is_doctor_of(appt),
        AppointmentStatus::NoShow => actor.role == Role::Admin || actor.is_doctor_of(appt),
        AppointmentStatus::Scheduled => {
            actor.role == Role::Admin || actor.is_patient_of(appt) || actor.is_doctor_of(appt)
        }
    };

    if allowed {
        Ok(())
    } else {
        Err(BookingError::forbidden(format!(
            "you may not mark this appointment {to}"
        )))
    }
}

pub fn ensure_can_prescribe(actor: &Actor, appt: &Appointment) -> Result<(), BookingError> {
    if actor.is_doctor_of(appt) {
        Ok(())
    } else {
        Err(BookingError::forbidden(
            "only the appointment's doctor can issue a prescription",
        ))
    }
}

pub fn ensure_can_pay(actor: &Actor, appt: &Appointment) -> Result<(), BookingError> {
    if actor.is_patient_of(appt) {
        Ok(())
    } else {
        Err(BookingError::forbidden(
            "only the appointment's patient can update payment",
        ))
    }
}

/// Admins cannot be removed; anyone else can, by an admin.
pub fn ensure_can_delete_user(actor: &Actor, target_role: Role) -> Result<(), BookingError> {
    if actor.role != Role::Admin {
        return Err(BookingError::forbidden("only admins can delete users"));
    }
    if target_role == Role::Admin {
        return Err(BookingError::forbidden("admin accounts cannot be deleted"));
    }
    Ok(())
}
