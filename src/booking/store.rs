use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use super::appointment::{Appointment, AppointmentStatus};
use super::policy::Role;
use super::schedule::{SlotTime, WeeklySchedule};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("db error: {0}")]
    Database(#[from] sqlx::Error),

    /// A live appointment already holds `(doctor, date, start)`.
    #[error("slot already taken")]
    SlotTaken,

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone)]
pub struct DoctorProfile {
    pub doctor_id: Uuid,
    #[allow(dead_code)]
    pub user_id: Uuid,
    pub display_name: String,
    pub consultation_fee_cents: i32,
    pub availability: WeeklySchedule,
}

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub user_id: Uuid,
    pub role: Role,
}

pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const MAX_PAGE_SIZE: u32 = 500;

/// Window over an ordered listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppointmentFilter {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub page: Page,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeReport {
    pub doctor_profiles_deleted: u64,
    pub appointments_deleted: u64,
}

/// Persistence seam of the booking core.
///
/// Implementations own the double-booking invariant: `insert_appointment`
/// must refuse a second live appointment for the same doctor, date and start
/// time even under concurrent callers, and `update_appointment` is a
/// compare-and-swap on `version`.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn find_doctor(&self, doctor_id: Uuid) -> Result<Option<DoctorProfile>, StoreError>;

    /// Whole-document overwrite. `false` when the doctor does not exist.
    async fn replace_availability(
        &self,
        doctor_id: Uuid,
        schedule: &WeeklySchedule,
    ) -> Result<bool, StoreError>;

    async fn is_slot_taken(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        start_time: SlotTime,
    ) -> Result<bool, StoreError>;

    /// Live `(date, start)` pairs of a doctor in `[from, until]`.
    async fn taken_slots(
        &self,
        doctor_id: Uuid,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<(NaiveDate, SlotTime)>, StoreError>;

    async fn insert_appointment(&self, appt: &Appointment) -> Result<(), StoreError>;

    async fn find_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError>;

    /// Ordered by date, then start time, then id; windowed by `filter.page`.
    async fn list_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError>;

    /// Persist `appt` if the stored version still equals `appt.version`,
    /// bumping it. `false` when another writer got there first.
    async fn update_appointment(&self, appt: &Appointment) -> Result<bool, StoreError>;

    async fn find_user(&self, user_id: Uuid) -> Result<Option<UserRecord>, StoreError>;

    /// Remove a user, their doctor profile, every appointment naming either
    /// and their sessions.
    async fn delete_user_cascade(&self, user_id: Uuid) -> Result<CascadeReport, StoreError>;
}
