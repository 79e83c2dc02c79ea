// src/booking/service.rs

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::appointment::{Appointment, AppointmentStatus, PaymentStatus, Prescription};
use super::error::BookingError;
use super::expansion::{expand, SlotInstance};
use super::notify::Notifier;
use super::policy::{self, Actor, Role};
use super::schedule::{DayInput, SlotTime, TimeSlot, WeeklySchedule};
use super::store::{
    AppointmentFilter, BookingStore, CascadeReport, DoctorProfile, Page, StoreError, DEFAULT_PAGE_SIZE,
    MAX_PAGE_SIZE,
};

/// POST /appointments body. Fields are optional so a missing one is reported
/// by name; malformed values are rejected while decoding.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub doctor_id: Option<Uuid>,
    pub appointment_date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub symptoms: Option<String>,
    pub notes: Option<String>,
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, BookingError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(BookingError::validation(format!("{field} is required"))),
    }
}

/// `YYYY-MM-DD`, or an RFC 3339 timestamp whose date part is used.
pub fn parse_date(raw: &str) -> Result<NaiveDate, BookingError> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.date_naive()))
        .map_err(|_| BookingError::validation(format!("invalid date {raw:?}, expected YYYY-MM-DD")))
}

/// Listing window from `?limit=&offset=`.
pub fn page(limit: Option<u32>, offset: Option<u32>) -> Result<Page, BookingError> {
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE);
    if limit == 0 || limit > MAX_PAGE_SIZE {
        return Err(BookingError::validation(format!(
            "limit must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }
    Ok(Page {
        limit,
        offset: offset.unwrap_or(0),
    })
}

#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn BookingStore>,
    notifier: Arc<dyn Notifier>,
    horizon_weeks: u32,
}

impl BookingService {
    pub fn new(store: Arc<dyn BookingStore>, notifier: Arc<dyn Notifier>, horizon_weeks: u32) -> Self {
        Self {
            store,
            notifier,
            horizon_weeks,
        }
    }

    async fn doctor(&self, doctor_id: Uuid) -> Result<DoctorProfile, BookingError> {
        self.store
            .find_doctor(doctor_id)
            .await?
            .ok_or(BookingError::NotFound("doctor"))
    }

    async fn appointment(&self, appointment_id: Uuid) -> Result<Appointment, BookingError> {
        self.store
            .find_appointment(appointment_id)
            .await?
            .ok_or(BookingError::NotFound("appointment"))
    }

    /* ============================================================
       Availability
       ============================================================ */

    pub async fn availability(&self, doctor_id: Uuid) -> Result<WeeklySchedule, BookingError> {
        Ok(self.doctor(doctor_id).await?.availability)
    }

    pub async fn set_availability(
        &self,
        actor: &Actor,
        doctor_id: Uuid,
        input: Vec<DayInput>,
    ) -> Result<WeeklySchedule, BookingError> {
        policy::ensure_can_edit_availability(actor, doctor_id)?;
        let schedule = WeeklySchedule::build(input)?;

        if !self.store.replace_availability(doctor_id, &schedule).await? {
            return Err(BookingError::NotFound("doctor"));
        }

        info!(%doctor_id, days = schedule.days().len(), "availability replaced");
        Ok(schedule)
    }

    /// Raw template slots for the weekday of `date`; bookings are not
    /// subtracted.
    pub async fn slots_for_date(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<TimeSlot>, BookingError> {
        let schedule = self.availability(doctor_id).await?;
        Ok(schedule.slots_on(date.weekday()).to_vec())
    }

    /// Expanded template over the booking horizon minus live bookings.
    pub async fn upcoming_slots(
        &self,
        doctor_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<SlotInstance>, BookingError> {
        let schedule = self.availability(doctor_id).await?;
        if schedule.is_empty() {
            return Ok(vec![]);
        }

        let today = now.date_naive();
        let until = today + Duration::weeks(i64::from(self.horizon_weeks));
        let taken: HashSet<(NaiveDate, SlotTime)> = self
            .store
            .taken_slots(doctor_id, today, until)
            .await?
            .into_iter()
            .collect();

        let mut slots: Vec<SlotInstance> = expand(&schedule, now.naive_utc(), self.horizon_weeks)
            .filter(|s| !taken.contains(&(s.date, s.start_time)))
            .collect();
        slots.sort_by_key(|s| (s.date, s.start_time));

        debug!(%doctor_id, free = slots.len(), taken = taken.len(), "upcoming slots");
        Ok(slots)
    }

    pub async fn is_slot_taken(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        start_time: SlotTime,
    ) -> Result<bool, BookingError> {
        Ok(self.store.is_slot_taken(doctor_id, date, start_time).await?)
    }

    /* ============================================================
       Booking
       ============================================================ */

    pub async fn book(
        &self,
        actor: &Actor,
        req: BookingRequest,
        now: DateTime<Utc>,
    ) -> Result<Appointment, BookingError> {
        policy::ensure_can_book(actor)?;

        let doctor_id = req
            .doctor_id
            .ok_or_else(|| BookingError::validation("doctorId is required"))?;
        let date = parse_date(required(&req.appointment_date, "appointmentDate")?)?;
        let start = SlotTime::parse(required(&req.start_time, "startTime")?)?;
        let end = SlotTime::parse(required(&req.end_time, "endTime")?)?;
        let symptoms = required(&req.symptoms, "symptoms")?.to_string();

        if start >= end {
            return Err(BookingError::validation("startTime must be before endTime"));
        }
        if date.and_time(start.as_naive()) < now.naive_utc() {
            return Err(BookingError::validation("appointment time is in the past"));
        }

        let doctor = self.doctor(doctor_id).await?;

        let conflict = || BookingError::SlotConflict {
            doctor_id,
            date,
            start_time: start.to_string(),
        };

        if self.store.is_slot_taken(doctor_id, date, start).await? {
            warn!(%doctor_id, %date, %start, "slot already booked");
            return Err(conflict());
        }

        let notes = req.notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        let appt = Appointment::schedule(
            actor.user_id,
            doctor.doctor_id,
            date,
            start,
            end,
            symptoms,
            notes,
            doctor.consultation_fee_cents,
            now,
        );

        // the store re-checks atomically; this catches the concurrent loser
        match self.store.insert_appointment(&appt).await {
            Ok(()) => {}
            Err(StoreError::SlotTaken) => {
                warn!(%doctor_id, %date, %start, "slot taken by concurrent booking");
                return Err(conflict());
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            appointment_id = %appt.appointment_id,
            %doctor_id,
            doctor = %doctor.display_name,
            patient_id = %actor.user_id,
            %date,
            %start,
            "appointment booked"
        );

        if let Err(e) = self.notifier.booking_confirmed(&appt).await {
            warn!(appointment_id = %appt.appointment_id, "booking confirmation failed: {e:#}");
        }

        Ok(appt)
    }

    /* ============================================================
       Reads
       ============================================================ */

    pub async fn list(
        &self,
        actor: &Actor,
        status: Option<AppointmentStatus>,
        page: Page,
    ) -> Result<Vec<Appointment>, BookingError> {
        let mut filter = AppointmentFilter {
            status,
            page,
            ..Default::default()
        };
        match actor.role {
            Role::Patient => filter.patient_id = Some(actor.user_id),
            Role::Doctor => {
                filter.doctor_id = Some(
                    actor
                        .doctor_id
                        .ok_or_else(|| BookingError::forbidden("doctor account has no doctor profile"))?,
                )
            }
            Role::Admin => {}
        }
        Ok(self.store.list_appointments(&filter).await?)
    }

    pub async fn get(&self, actor: &Actor, appointment_id: Uuid) -> Result<Appointment, BookingError> {
        let appt = self.appointment(appointment_id).await?;
        policy::ensure_can_read(actor, &appt)?;
        Ok(appt)
    }

    /* ============================================================
       Mutations
       ============================================================ */

    /// Reload, authorize, apply, compare-and-swap.
    async fn mutate<F>(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        apply: F,
    ) -> Result<Appointment, BookingError>
    where
        F: FnOnce(&Actor, &mut Appointment) -> Result<(), BookingError> + Send,
    {
        let mut appt = self.appointment(appointment_id).await?;
        apply(actor, &mut appt)?;

        if !self.store.update_appointment(&appt).await? {
            warn!(%appointment_id, "concurrent appointment update");
            return Err(BookingError::ConcurrentUpdate(appointment_id));
        }
        appt.version += 1;
        Ok(appt)
    }

    pub async fn set_status(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        status: AppointmentStatus,
        now: DateTime<Utc>,
    ) -> Result<Appointment, BookingError> {
        let appt = self
            .mutate(actor, appointment_id, |actor, appt| {
                policy::ensure_can_set_status(actor, appt, status)?;
                appt.transition(status, now)
            })
            .await?;
        info!(%appointment_id, %status, "appointment status changed");
        Ok(appt)
    }

    pub async fn prescribe(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        prescription: Prescription,
        now: DateTime<Utc>,
    ) -> Result<Appointment, BookingError> {
        let appt = self
            .mutate(actor, appointment_id, |actor, appt| {
                policy::ensure_can_prescribe(actor, appt)?;
                appt.attach_prescription(prescription, now)
            })
            .await?;
        info!(%appointment_id, "prescription issued");
        Ok(appt)
    }

    pub async fn cancel(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Appointment, BookingError> {
        let appt = self
            .mutate(actor, appointment_id, |actor, appt| {
                policy::ensure_can_set_status(actor, appt, AppointmentStatus::Cancelled)?;
                appt.cancel(now)
            })
            .await?;
        info!(%appointment_id, "appointment cancelled");
        Ok(appt)
    }

    pub async fn set_payment_status(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        payment_status: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Result<Appointment, BookingError> {
        self.mutate(actor, appointment_id, |actor, appt| {
            policy::ensure_can_pay(actor, appt)?;
            appt.set_payment_status(payment_status, now);
            Ok(())
        })
        .await
    }

    /* ============================================================
       Admin
       ============================================================ */

    pub async fn delete_user(&self, actor: &Actor, user_id: Uuid) -> Result<CascadeReport, BookingError> {
        if actor.role != Role::Admin {
            return Err(BookingError::forbidden("only admins can delete users"));
        }
        let target = self
            .store
            .find_user(user_id)
            .await?
            .ok_or(BookingError::NotFound("user"))?;
        policy::ensure_can_delete_user(actor, target.role)?;

        let report = self.store.delete_user_cascade(target.user_id).await?;
        info!(
            %user_id,
            admin_id = %actor.user_id,
            doctor_profiles = report.doctor_profiles_deleted,
            appointments = report.appointments_deleted,
            "user deleted"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::memory_store::MemoryStore;
    use crate::booking::notify::LogNotifier;
    use crate::booking::schedule::day;
    use async_trait::async_trait;
    use chrono::{NaiveDateTime, TimeZone};

    // Saturday 2026-10-17 10:00 UTC; next Monday is 2026-10-19
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 10, 0, 0).unwrap()
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        svc: BookingService,
        doctor: Actor,
        doctor_id: Uuid,
    }

    async fn fixture_with(notifier: Arc<dyn Notifier>) -> Fixture {
        let store = Arc::new(MemoryStore::default());
        let schedule = WeeklySchedule::build(vec![day("Monday", &[("09:00", "09:30"), ("09:30", "10:00")])]).unwrap();
        let (doctor_user, doctor_id) = store.add_doctor(7500, schedule).await;
        let svc = BookingService::new(store.clone(), notifier, 4);
        Fixture {
            store,
            svc,
            doctor: Actor { user_id: doctor_user, role: Role::Doctor, doctor_id: Some(doctor_id) },
            doctor_id,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(Arc::new(LogNotifier)).await
    }

    impl Fixture {
        async fn patient(&self) -> Actor {
            let user_id = self.store.add_user(Role::Patient).await;
            Actor { user_id, role: Role::Patient, doctor_id: None }
        }

        async fn admin(&self) -> Actor {
            let user_id = self.store.add_user(Role::Admin).await;
            Actor { user_id, role: Role::Admin, doctor_id: None }
        }

        fn request(&self, start: &str, end: &str) -> BookingRequest {
            BookingRequest {
                doctor_id: Some(self.doctor_id),
                appointment_date: Some("2026-10-19".into()),
                start_time: Some(start.into()),
                end_time: Some(end.into()),
                symptoms: Some("fever".into()),
                notes: None,
            }
        }
    }

    #[tokio::test]
    async fn test_book_then_double_book_conflicts() {
        let f = fixture().await;
        let a = f.patient().await;
        let b = f.patient().await;

        let appt = f.svc.book(&a, f.request("09:00", "09:30"), now()).await.unwrap();
        assert_eq!(appt.status, AppointmentStatus::Scheduled);
        assert_eq!(appt.payment_amount_cents, 7500);
        assert_eq!(appt.payment_status, PaymentStatus::Pending);
        assert_eq!(appt.appointment_date, monday());
        assert_eq!(appt.patient_id, a.user_id);
        assert!(f.svc.is_slot_taken(f.doctor_id, monday(), appt.start_time).await.unwrap());

        let err = f.svc.book(&b, f.request("09:00", "09:30"), now()).await.unwrap_err();
        assert!(matches!(err, BookingError::SlotConflict { .. }));
        assert_eq!(f.store.appointment_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_bookings_single_winner() {
        let f = fixture().await;
        let mut patients = Vec::new();
        for _ in 0..8 {
            patients.push(f.patient().await);
        }

        let mut handles = Vec::new();
        for p in patients {
            let svc = f.svc.clone();
            let req = f.request("09:30", "10:00");
            handles.push(tokio::spawn(async move { svc.book(&p, req, now()).await }));
        }

        let mut ok = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => ok += 1,
                Err(BookingError::SlotConflict { .. }) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(f.store.appointment_count().await, 1);
    }

    #[tokio::test]
    async fn test_cancel_frees_slot() {
        let f = fixture().await;
        let a = f.patient().await;
        let b = f.patient().await;

        let appt = f.svc.book(&a, f.request("09:00", "09:30"), now()).await.unwrap();
        f.svc.cancel(&a, appt.appointment_id, now()).await.unwrap();

        let rebooked = f.svc.book(&b, f.request("09:00", "09:30"), now()).await.unwrap();
        assert_eq!(rebooked.patient_id, b.user_id);
    }

    #[tokio::test]
    async fn test_only_patients_book() {
        let f = fixture().await;
        let err = f.svc.book(&f.doctor, f.request("09:00", "09:30"), now()).await.unwrap_err();
        assert!(matches!(err, BookingError::Forbidden(_)));

        let admin = f.admin().await;
        let err = f.svc.book(&admin, f.request("09:00", "09:30"), now()).await.unwrap_err();
        assert!(matches!(err, BookingError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_booking_validation() {
        let f = fixture().await;
        let a = f.patient().await;

        let mut req = f.request("09:00", "09:30");
        req.symptoms = Some("   ".into());
        assert!(matches!(
            f.svc.book(&a, req, now()).await,
            Err(BookingError::Validation(_))
        ));

        let mut req = f.request("09:00", "09:30");
        req.doctor_id = None;
        assert!(matches!(
            f.svc.book(&a, req, now()).await,
            Err(BookingError::Validation(_))
        ));

        assert!(matches!(
            f.svc.book(&a, f.request("10:00", "09:30"), now()).await,
            Err(BookingError::Validation(_))
        ));

        let mut req = f.request("09:00", "09:30");
        req.appointment_date = Some("2026-10-16".into());
        assert!(matches!(
            f.svc.book(&a, req, now()).await,
            Err(BookingError::Validation(_))
        ));

        let mut req = f.request("09:00", "09:30");
        req.doctor_id = Some(Uuid::new_v4());
        assert!(matches!(
            f.svc.book(&a, req, now()).await,
            Err(BookingError::NotFound("doctor"))
        ));
    }

    #[test]
    fn test_parse_date_forms() {
        assert_eq!(parse_date("2026-10-19").unwrap(), monday());
        assert_eq!(parse_date("2026-10-19T00:00:00.000Z").unwrap(), monday());
        assert!(parse_date("19/10/2026").is_err());
    }

    #[tokio::test]
    async fn test_prescription_completes_then_cancel_fails() {
        let f = fixture().await;
        let a = f.patient().await;
        let appt = f.svc.book(&a, f.request("09:00", "09:30"), now()).await.unwrap();

        let issued_at = now() + Duration::days(2);
        let rx = Prescription {
            diagnosis: Some("viral fever".into()),
            ..Default::default()
        };
        let done = f.svc.prescribe(&f.doctor, appt.appointment_id, rx, issued_at).await.unwrap();
        assert_eq!(done.status, AppointmentStatus::Completed);
        assert_eq!(done.prescription.as_ref().unwrap().issued_date, Some(issued_at));

        let err = f.svc.cancel(&a, appt.appointment_id, issued_at).await.unwrap_err();
        assert!(matches!(
            err,
            BookingError::InvalidTransition {
                from: AppointmentStatus::Completed,
                to: AppointmentStatus::Cancelled
            }
        ));

        // payment still moves after completion
        let paid = f
            .svc
            .set_payment_status(&a, appt.appointment_id, PaymentStatus::Completed, issued_at)
            .await
            .unwrap();
        assert_eq!(paid.payment_status, PaymentStatus::Completed);
        assert_eq!(paid.status, AppointmentStatus::Completed);
    }

    #[tokio::test]
    async fn test_access_is_by_relationship() {
        let f = fixture().await;
        let a = f.patient().await;
        let stranger = f.patient().await;
        let appt = f.svc.book(&a, f.request("09:00", "09:30"), now()).await.unwrap();
        let id = appt.appointment_id;

        assert!(f.svc.get(&a, id).await.is_ok());
        assert!(f.svc.get(&f.doctor, id).await.is_ok());
        assert!(matches!(f.svc.get(&stranger, id).await, Err(BookingError::Forbidden(_))));
        assert!(matches!(f.svc.cancel(&stranger, id, now()).await, Err(BookingError::Forbidden(_))));

        // other doctor
        let (other_user, other_profile) = f.store.add_doctor(100, WeeklySchedule::default()).await;
        let other = Actor { user_id: other_user, role: Role::Doctor, doctor_id: Some(other_profile) };
        assert!(f.svc.prescribe(&other, id, Prescription::default(), now()).await.is_err());

        // patient cannot complete; doctor cannot pay
        assert!(f.svc.set_status(&a, id, AppointmentStatus::Completed, now()).await.is_err());
        assert!(f.svc.set_payment_status(&f.doctor, id, PaymentStatus::Completed, now()).await.is_err());

        assert!(matches!(
            f.svc.get(&a, Uuid::new_v4()).await,
            Err(BookingError::NotFound("appointment"))
        ));
    }

    #[tokio::test]
    async fn test_list_scoped_to_actor() {
        let f = fixture().await;
        let a = f.patient().await;
        let b = f.patient().await;
        f.svc.book(&a, f.request("09:30", "10:00"), now()).await.unwrap();
        f.svc.book(&b, f.request("09:00", "09:30"), now()).await.unwrap();

        let mine = f.svc.list(&a, None, Page::default()).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].patient_id, a.user_id);

        let doctors = f.svc.list(&f.doctor, None, Page::default()).await.unwrap();
        assert_eq!(doctors.len(), 2);
        assert_eq!(doctors[0].start_time.to_string(), "09:00");

        let admin = f.admin().await;
        assert_eq!(f.svc.list(&admin, Some(AppointmentStatus::Scheduled), Page::default()).await.unwrap().len(), 2);
        assert!(f.svc.list(&admin, Some(AppointmentStatus::Cancelled), Page::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_pages_past_first_window() {
        let f = fixture().await;
        let a = f.patient().await;
        let admin = f.admin().await;
        // two Mondays x two slots
        for date in ["2026-10-19", "2026-10-26"] {
            for (start, end) in [("09:00", "09:30"), ("09:30", "10:00")] {
                let mut req = f.request(start, end);
                req.appointment_date = Some(date.into());
                f.svc.book(&a, req, now()).await.unwrap();
            }
        }

        let first = f.svc.list(&admin, None, page(Some(3), None).unwrap()).await.unwrap();
        assert_eq!(first.len(), 3);
        let rest = f.svc.list(&admin, None, page(Some(3), Some(3)).unwrap()).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].appointment_date, monday() + Duration::weeks(1));
        assert_eq!(rest[0].start_time.to_string(), "09:30");
        assert!(!first.iter().any(|x| x.appointment_id == rest[0].appointment_id));

        let all = f.svc.list(&admin, None, Page::default()).await.unwrap();
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn test_page_bounds() {
        assert_eq!(page(None, None).unwrap(), Page::default());
        assert_eq!(page(Some(MAX_PAGE_SIZE), Some(7)).unwrap(), Page { limit: MAX_PAGE_SIZE, offset: 7 });
        assert!(matches!(page(Some(0), None), Err(BookingError::Validation(_))));
        assert!(matches!(page(Some(MAX_PAGE_SIZE + 1), None), Err(BookingError::Validation(_))));
    }

    #[tokio::test]
    async fn test_no_show_and_terminal_states() {
        let f = fixture().await;
        let a = f.patient().await;
        let admin = f.admin().await;
        let appt = f.svc.book(&a, f.request("09:00", "09:30"), now()).await.unwrap();

        let ns = f
            .svc
            .set_status(&admin, appt.appointment_id, AppointmentStatus::NoShow, now())
            .await
            .unwrap();
        assert_eq!(ns.status, AppointmentStatus::NoShow);

        assert!(matches!(
            f.svc.set_status(&f.doctor, appt.appointment_id, AppointmentStatus::Completed, now()).await,
            Err(BookingError::InvalidTransition { .. })
        ));
        assert!(matches!(
            f.svc.cancel(&a, appt.appointment_id, now()).await,
            Err(BookingError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_stale_version_rejected() {
        let f = fixture().await;
        let a = f.patient().await;
        let appt = f.svc.book(&a, f.request("09:00", "09:30"), now()).await.unwrap();

        f.svc
            .set_payment_status(&a, appt.appointment_id, PaymentStatus::Completed, now())
            .await
            .unwrap();

        // a writer still holding version 0
        let mut stale = appt.clone();
        stale.cancel(now()).unwrap();
        assert!(!f.store.update_appointment(&stale).await.unwrap());

        let current = f.svc.get(&a, appt.appointment_id).await.unwrap();
        assert_eq!(current.status, AppointmentStatus::Scheduled);
        assert_eq!(current.version, 1);
    }

    #[tokio::test]
    async fn test_availability_owner_only_and_validated() {
        let f = fixture().await;
        let a = f.patient().await;

        let input = || vec![day("Tuesday", &[("10:00", "10:30")])];
        assert!(matches!(
            f.svc.set_availability(&a, f.doctor_id, input()).await,
            Err(BookingError::Forbidden(_))
        ));

        let overlapping = vec![day("Tuesday", &[("10:00", "11:00"), ("10:30", "11:30")])];
        assert!(matches!(
            f.svc.set_availability(&f.doctor, f.doctor_id, overlapping).await,
            Err(BookingError::Validation(_))
        ));

        // whole replacement: Monday is gone afterwards
        f.svc.set_availability(&f.doctor, f.doctor_id, input()).await.unwrap();
        let schedule = f.svc.availability(f.doctor_id).await.unwrap();
        assert_eq!(schedule.days().len(), 1);
        assert!(f.svc.slots_for_date(f.doctor_id, monday()).await.unwrap().is_empty());
        let tuesday = monday() + Duration::days(1);
        assert_eq!(f.svc.slots_for_date(f.doctor_id, tuesday).await.unwrap().len(), 1);

        assert!(matches!(
            f.svc.availability(Uuid::new_v4()).await,
            Err(BookingError::NotFound("doctor"))
        ));
    }

    #[tokio::test]
    async fn test_upcoming_slots_hide_booked() {
        let f = fixture().await;
        let a = f.patient().await;

        let before = f.svc.upcoming_slots(f.doctor_id, now()).await.unwrap();
        assert_eq!(before.len(), 2 * 4);
        assert_eq!(before[0].date, monday());
        assert_eq!(before[0].start_time.to_string(), "09:00");

        f.svc.book(&a, f.request("09:00", "09:30"), now()).await.unwrap();
        let after = f.svc.upcoming_slots(f.doctor_id, now()).await.unwrap();
        assert_eq!(after.len(), 2 * 4 - 1);
        assert!(!after
            .iter()
            .any(|s| s.date == monday() && s.start_time.to_string() == "09:00"));
        for w in after.windows(2) {
            assert!((w[0].date, w[0].start_time) <= (w[1].date, w[1].start_time));
        }
    }

    #[tokio::test]
    async fn test_admin_deletes_doctor_cascade() {
        let f = fixture().await;
        let a = f.patient().await;
        let admin = f.admin().await;
        f.svc.book(&a, f.request("09:00", "09:30"), now()).await.unwrap();
        f.svc.book(&a, f.request("09:30", "10:00"), now()).await.unwrap();

        let report = f.svc.delete_user(&admin, f.doctor.user_id).await.unwrap();
        assert_eq!(report.doctor_profiles_deleted, 1);
        assert_eq!(report.appointments_deleted, 2);
        assert_eq!(f.store.appointment_count().await, 0);
        assert!(matches!(
            f.svc.availability(f.doctor_id).await,
            Err(BookingError::NotFound("doctor"))
        ));
    }

    #[tokio::test]
    async fn test_admin_cannot_be_deleted() {
        let f = fixture().await;
        let admin = f.admin().await;
        let other_admin = f.admin().await;
        assert!(matches!(
            f.svc.delete_user(&admin, other_admin.user_id).await,
            Err(BookingError::Forbidden(_))
        ));

        let a = f.patient().await;
        assert!(matches!(
            f.svc.delete_user(&a, f.doctor.user_id).await,
            Err(BookingError::Forbidden(_))
        ));
        assert!(matches!(
            f.svc.delete_user(&admin, Uuid::new_v4()).await,
            Err(BookingError::NotFound("user"))
        ));
    }

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn booking_confirmed(&self, _appt: &Appointment) -> anyhow::Result<()> {
            anyhow::bail!("smtp relay unreachable")
        }
    }

    #[tokio::test]
    async fn test_notification_failure_keeps_booking() {
        let f = fixture_with(Arc::new(FailingNotifier)).await;
        let a = f.patient().await;
        let appt = f.svc.book(&a, f.request("09:00", "09:30"), now()).await.unwrap();
        assert_eq!(f.store.appointment_count().await, 1);
        assert!(f.svc.get(&a, appt.appointment_id).await.is_ok());
    }

    #[test]
    fn test_fixture_clock_is_saturday() {
        let n: NaiveDateTime = now().naive_utc();
        assert_eq!(n.weekday(), chrono::Weekday::Sat);
    }
}
