// src/booking/pg_store.rs

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{types::Json, PgPool};
use tracing::debug;
use uuid::Uuid;

use super::appointment::{Appointment, AppointmentStatus, PaymentStatus, Prescription};
use super::policy::Role;
use super::schedule::{SlotTime, WeeklySchedule};
use super::store::{
    AppointmentFilter, BookingStore, CascadeReport, DoctorProfile, StoreError, UserRecord,
};

/// Partial unique index from migrations/0001_booking.sql.
const LIVE_SLOT_INDEX: &str = "appointment_live_slot_uq";

const CASCADE_LOCKS: [&str; 2] = [
    "SELECT user_id FROM app_user WHERE user_id = $1 FOR UPDATE",
    "SELECT doctor_id FROM doctor WHERE user_id = $1 FOR UPDATE",
];

const CASCADE_DELETE_APPOINTMENTS: &str = r#"
    DELETE FROM appointment
    WHERE patient_id = $1
       OR doctor_id IN (SELECT doctor_id FROM doctor WHERE user_id = $1)
"#;

const APPOINTMENT_COLUMNS: &str = r#"
    appointment_id, patient_id, doctor_id, appointment_date, start_time, end_time,
    status, symptoms, notes, prescription, payment_status, payment_amount_cents,
    version, created_at, updated_at
"#;

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/* -------------------------
   DB Row Models
--------------------------*/

#[derive(Debug, sqlx::FromRow)]
struct DoctorRow {
    doctor_id: Uuid,
    user_id: Uuid,
    display_name: String,
    consultation_fee_cents: i32,
    availability: Json<WeeklySchedule>,
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    user_id: Uuid,
    roles: Role,
}

#[derive(Debug, sqlx::FromRow)]
struct AppointmentRow {
    appointment_id: Uuid,
    patient_id: Uuid,
    doctor_id: Uuid,
    appointment_date: NaiveDate,
    start_time: String,
    end_time: String,
    status: AppointmentStatus,
    symptoms: String,
    notes: Option<String>,
    prescription: Option<Json<Prescription>>,
    payment_status: PaymentStatus,
    payment_amount_cents: i32,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct TakenRow {
    appointment_date: NaiveDate,
    start_time: String,
}

fn slot_time(raw: &str) -> Result<SlotTime, StoreError> {
    SlotTime::parse(raw).map_err(|e| StoreError::Corrupt(e.to_string()))
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = StoreError;

    fn try_from(r: AppointmentRow) -> Result<Self, Self::Error> {
        Ok(Appointment {
            appointment_id: r.appointment_id,
            patient_id: r.patient_id,
            doctor_id: r.doctor_id,
            appointment_date: r.appointment_date,
            start_time: slot_time(&r.start_time)?,
            end_time: slot_time(&r.end_time)?,
            status: r.status,
            symptoms: r.symptoms,
            notes: r.notes,
            prescription: r.prescription.map(|Json(p)| p),
            payment_status: r.payment_status,
            payment_amount_cents: r.payment_amount_cents,
            version: r.version,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

fn is_live_slot_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => {
            db.is_unique_violation() && db.constraint() == Some(LIVE_SLOT_INDEX)
        }
        _ => false,
    }
}

#[async_trait]
impl BookingStore for PgStore {
    async fn find_doctor(&self, doctor_id: Uuid) -> Result<Option<DoctorProfile>, StoreError> {
        let row = sqlx::query_as::<_, DoctorRow>(
            r#"
            SELECT doctor_id, user_id, display_name, consultation_fee_cents, availability
            FROM doctor
            WHERE doctor_id = $1
            "#,
        )
        .bind(doctor_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|r| DoctorProfile {
            doctor_id: r.doctor_id,
            user_id: r.user_id,
            display_name: r.display_name,
            consultation_fee_cents: r.consultation_fee_cents,
            availability: r.availability.0,
        }))
    }

    async fn replace_availability(
        &self,
        doctor_id: Uuid,
        schedule: &WeeklySchedule,
    ) -> Result<bool, StoreError> {
        let res = sqlx::query(
            r#"
            UPDATE doctor
            SET availability = $2, updated_at = now()
            WHERE doctor_id = $1
            "#,
        )
        .bind(doctor_id)
        .bind(Json(schedule))
        .execute(&self.db)
        .await?;

        Ok(res.rows_affected() > 0)
    }

    async fn is_slot_taken(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        start_time: SlotTime,
    ) -> Result<bool, StoreError> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
              SELECT 1 FROM appointment
              WHERE doctor_id = $1
                AND appointment_date = $2
                AND start_time = $3
                AND status <> $4
            )
            "#,
        )
        .bind(doctor_id)
        .bind(date)
        .bind(start_time.to_string())
        .bind(AppointmentStatus::Cancelled)
        .fetch_one(&self.db)
        .await?;

        Ok(taken)
    }

    async fn taken_slots(
        &self,
        doctor_id: Uuid,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<(NaiveDate, SlotTime)>, StoreError> {
        let rows = sqlx::query_as::<_, TakenRow>(
            r#"
            SELECT appointment_date, start_time
            FROM appointment
            WHERE doctor_id = $1
              AND appointment_date BETWEEN $2 AND $3
              AND status <> $4
            "#,
        )
        .bind(doctor_id)
        .bind(from)
        .bind(until)
        .bind(AppointmentStatus::Cancelled)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|r| -> Result<_, StoreError> { Ok((r.appointment_date, slot_time(&r.start_time)?)) })
            .collect()
    }

    async fn insert_appointment(&self, appt: &Appointment) -> Result<(), StoreError> {
        let res = sqlx::query(
            r#"
            INSERT INTO appointment (
              appointment_id, patient_id, doctor_id, appointment_date, start_time, end_time,
              status, symptoms, notes, prescription, payment_status, payment_amount_cents,
              version, created_at, updated_at
            )
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15)
            "#,
        )
        .bind(appt.appointment_id)
        .bind(appt.patient_id)
        .bind(appt.doctor_id)
        .bind(appt.appointment_date)
        .bind(appt.start_time.to_string())
        .bind(appt.end_time.to_string())
        .bind(appt.status)
        .bind(&appt.symptoms)
        .bind(appt.notes.as_deref())
        .bind(appt.prescription.as_ref().map(Json))
        .bind(appt.payment_status)
        .bind(appt.payment_amount_cents)
        .bind(appt.version)
        .bind(appt.created_at)
        .bind(appt.updated_at)
        .execute(&self.db)
        .await;

        match res {
            Ok(_) => Ok(()),
            Err(e) if is_live_slot_violation(&e) => Err(StoreError::SlotTaken),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointment WHERE appointment_id = $1");
        sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(appointment_id)
            .fetch_optional(&self.db)
            .await?
            .map(Appointment::try_from)
            .transpose()
    }

    async fn list_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        debug!(?filter, "listing appointments");
        let sql = format!(
            r#"
            SELECT {APPOINTMENT_COLUMNS}
            FROM appointment
            WHERE ($1::uuid IS NULL OR patient_id = $1)
              AND ($2::uuid IS NULL OR doctor_id = $2)
              AND ($3::smallint IS NULL OR status = $3)
            ORDER BY appointment_date ASC, start_time ASC, appointment_id ASC
            LIMIT $4 OFFSET $5
            "#
        );
        let rows = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(filter.patient_id)
            .bind(filter.doctor_id)
            .bind(filter.status)
            .bind(i64::from(filter.page.limit))
            .bind(i64::from(filter.page.offset))
            .fetch_all(&self.db)
            .await?;

        rows.into_iter().map(Appointment::try_from).collect()
    }

    async fn update_appointment(&self, appt: &Appointment) -> Result<bool, StoreError> {
        let res = sqlx::query(
            r#"
            UPDATE appointment
            SET status = $3,
                prescription = $4,
                payment_status = $5,
                notes = $6,
                updated_at = $7,
                version = version + 1
            WHERE appointment_id = $1
              AND version = $2
            "#,
        )
        .bind(appt.appointment_id)
        .bind(appt.version)
        .bind(appt.status)
        .bind(appt.prescription.as_ref().map(Json))
        .bind(appt.payment_status)
        .bind(appt.notes.as_deref())
        .bind(appt.updated_at)
        .execute(&self.db)
        .await?;

        Ok(res.rows_affected() == 1)
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT user_id, roles
            FROM app_user
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|r| UserRecord {
            user_id: r.user_id,
            role: r.roles,
        }))
    }

    async fn delete_user_cascade(&self, user_id: Uuid) -> Result<CascadeReport, StoreError> {
        let mut tx = self.db.begin().await?;

        // Row locks conflict with the FK check of a concurrent INSERT, so no
        // appointment can slip in between the deletes below.
        for sql in CASCADE_LOCKS {
            sqlx::query(sql).bind(user_id).execute(&mut *tx).await?;
        }

        let appointments = sqlx::query(CASCADE_DELETE_APPOINTMENTS)
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let doctors = sqlx::query(r#"DELETE FROM doctor WHERE user_id = $1"#)
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query(r#"DELETE FROM session_token WHERE user_id = $1"#)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(r#"DELETE FROM app_user WHERE user_id = $1"#)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(CascadeReport {
            doctor_profiles_deleted: doctors,
            appointments_deleted: appointments,
        })
    }
}
