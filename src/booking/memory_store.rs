//! In-process [`BookingStore`] for tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::appointment::{Appointment, AppointmentStatus};
use super::policy::Role;
use super::schedule::{SlotTime, WeeklySchedule};
use super::store::{
    AppointmentFilter, BookingStore, CascadeReport, DoctorProfile, StoreError, UserRecord,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, UserRecord>,
    doctors: HashMap<Uuid, DoctorProfile>,
    appointments: HashMap<Uuid, Appointment>,
}

impl Tables {
    fn live_slot_holder(&self, doctor_id: Uuid, date: NaiveDate, start: SlotTime) -> Option<&Appointment> {
        self.appointments.values().find(|a| {
            a.doctor_id == doctor_id
                && a.appointment_date == date
                && a.start_time == start
                && a.status != AppointmentStatus::Cancelled
        })
    }
}

/// Every operation runs under one lock, so check-and-insert is atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub async fn add_user(&self, role: Role) -> Uuid {
        let user_id = Uuid::new_v4();
        self.tables
            .lock()
            .await
            .users
            .insert(user_id, UserRecord { user_id, role });
        user_id
    }

    /// Creates the doctor's user account and profile; returns `(user_id, doctor_id)`.
    pub async fn add_doctor(&self, fee_cents: i32, availability: WeeklySchedule) -> (Uuid, Uuid) {
        let user_id = self.add_user(Role::Doctor).await;
        let doctor_id = Uuid::new_v4();
        self.tables.lock().await.doctors.insert(
            doctor_id,
            DoctorProfile {
                doctor_id,
                user_id,
                display_name: "Dr. Test".into(),
                consultation_fee_cents: fee_cents,
                availability,
            },
        );
        (user_id, doctor_id)
    }

    pub async fn appointment_count(&self) -> usize {
        self.tables.lock().await.appointments.len()
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn find_doctor(&self, doctor_id: Uuid) -> Result<Option<DoctorProfile>, StoreError> {
        Ok(self.tables.lock().await.doctors.get(&doctor_id).cloned())
    }

    async fn replace_availability(
        &self,
        doctor_id: Uuid,
        schedule: &WeeklySchedule,
    ) -> Result<bool, StoreError> {
        let mut t = self.tables.lock().await;
        match t.doctors.get_mut(&doctor_id) {
            Some(d) => {
                d.availability = schedule.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn is_slot_taken(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        start_time: SlotTime,
    ) -> Result<bool, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .live_slot_holder(doctor_id, date, start_time)
            .is_some())
    }

    async fn taken_slots(
        &self,
        doctor_id: Uuid,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<(NaiveDate, SlotTime)>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .appointments
            .values()
            .filter(|a| {
                a.doctor_id == doctor_id
                    && a.status != AppointmentStatus::Cancelled
                    && (from..=until).contains(&a.appointment_date)
            })
            .map(|a| (a.appointment_date, a.start_time))
            .collect())
    }

    async fn insert_appointment(&self, appt: &Appointment) -> Result<(), StoreError> {
        let mut t = self.tables.lock().await;
        if t
            .live_slot_holder(appt.doctor_id, appt.appointment_date, appt.start_time)
            .is_some()
        {
            return Err(StoreError::SlotTaken);
        }
        t.appointments.insert(appt.appointment_id, appt.clone());
        Ok(())
    }

    async fn find_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        Ok(self.tables.lock().await.appointments.get(&appointment_id).cloned())
    }

    async fn list_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        let t = self.tables.lock().await;
        let mut out: Vec<Appointment> = t
            .appointments
            .values()
            .filter(|a| filter.patient_id.is_none_or(|p| a.patient_id == p))
            .filter(|a| filter.doctor_id.is_none_or(|d| a.doctor_id == d))
            .filter(|a| filter.status.is_none_or(|s| a.status == s))
            .cloned()
            .collect();
        out.sort_by_key(|a| (a.appointment_date, a.start_time, a.appointment_id));
        Ok(out
            .into_iter()
            .skip(filter.page.offset as usize)
            .take(filter.page.limit as usize)
            .collect())
    }

    async fn update_appointment(&self, appt: &Appointment) -> Result<bool, StoreError> {
        let mut t = self.tables.lock().await;
        match t.appointments.get_mut(&appt.appointment_id) {
            Some(stored) if stored.version == appt.version => {
                *stored = appt.clone();
                stored.version += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.tables.lock().await.users.get(&user_id).cloned())
    }

    async fn delete_user_cascade(&self, user_id: Uuid) -> Result<CascadeReport, StoreError> {
        let mut t = self.tables.lock().await;

        let profiles: Vec<Uuid> = t
            .doctors
            .values()
            .filter(|d| d.user_id == user_id)
            .map(|d| d.doctor_id)
            .collect();

        let before = t.appointments.len();
        t.appointments
            .retain(|_, a| a.patient_id != user_id && !profiles.contains(&a.doctor_id));
        let appointments_deleted = (before - t.appointments.len()) as u64;

        for id in &profiles {
            t.doctors.remove(id);
        }
        t.users.remove(&user_id);

        Ok(CascadeReport {
            doctor_profiles_deleted: profiles.len() as u64,
            appointments_deleted,
        })
    }
}
