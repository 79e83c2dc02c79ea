// src/routes/appointment_routes.rs

use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use axum_extra::extract::WithRejection;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    booking::{
        appointment::{Appointment, AppointmentStatus, PaymentStatus, Prescription},
        service::{page, BookingRequest},
    },
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState},
};

/*
Roles (app_user.roles):
0 patient
1 admin
2 doctor

Ownership is checked by the booking service against the appointment as
stored; ids in request bodies are never trusted for authorization.
*/

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments", get(list_appointments).post(create_appointment))
        .route("/appointments/{appointment_id}", get(get_appointment).put(put_status))
        .route("/appointments/{appointment_id}/prescription", put(put_prescription))
        .route("/appointments/{appointment_id}/cancel", put(cancel_appointment))
        .route("/appointments/{appointment_id}/payment", put(put_payment))
}

/* ============================================================
   Request DTOs
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub payment_status: Option<String>,
}

fn require_field<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, ApiError> {
    value.as_deref().ok_or_else(|| {
        ApiError::BadRequest("VALIDATION_ERROR", format!("{name} is required"))
    })
}

/* ============================================================
   POST /appointments
   ============================================================ */

pub async fn create_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    WithRejection(Json(req), _): WithRejection<Json<BookingRequest>, ApiError>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    let appt = state.booking.book(&auth.actor(), req, Utc::now()).await?;
    Ok(Json(ApiOk { data: appt }))
}

/* ============================================================
   GET /appointments, GET /appointments/{id}
   ============================================================ */

/// `?status=&limit=&offset=`; a page shorter than `limit` is the last one.
pub async fn list_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
    WithRejection(Query(q), _): WithRejection<Query<ListQuery>, ApiError>,
) -> Result<Json<ApiOk<Vec<Appointment>>>, ApiError> {
    let status = q.status.as_deref().map(AppointmentStatus::parse).transpose()?;
    let page = page(q.limit, q.offset)?;
    let items = state.booking.list(&auth.actor(), status, page).await?;
    Ok(Json(ApiOk { data: items }))
}

pub async fn get_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    WithRejection(Path(appointment_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    let appt = state.booking.get(&auth.actor(), appointment_id).await?;
    Ok(Json(ApiOk { data: appt }))
}

/* ============================================================
   Status transitions
   ============================================================ */

pub async fn put_status(
    State(state): State<AppState>,
    auth: AuthContext,
    WithRejection(Path(appointment_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Json(req), _): WithRejection<Json<StatusRequest>, ApiError>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    let status = AppointmentStatus::parse(require_field(&req.status, "status")?)?;
    let appt = state
        .booking
        .set_status(&auth.actor(), appointment_id, status, Utc::now())
        .await?;
    Ok(Json(ApiOk { data: appt }))
}

pub async fn put_prescription(
    State(state): State<AppState>,
    auth: AuthContext,
    WithRejection(Path(appointment_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Json(prescription), _): WithRejection<Json<Prescription>, ApiError>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    let appt = state
        .booking
        .prescribe(&auth.actor(), appointment_id, prescription, Utc::now())
        .await?;
    Ok(Json(ApiOk { data: appt }))
}

pub async fn cancel_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    WithRejection(Path(appointment_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    let appt = state
        .booking
        .cancel(&auth.actor(), appointment_id, Utc::now())
        .await?;
    Ok(Json(ApiOk { data: appt }))
}

pub async fn put_payment(
    State(state): State<AppState>,
    auth: AuthContext,
    WithRejection(Path(appointment_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Json(req), _): WithRejection<Json<PaymentRequest>, ApiError>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    let payment_status = PaymentStatus::parse(require_field(&req.payment_status, "paymentStatus")?)?;
    let appt = state
        .booking
        .set_payment_status(&auth.actor(), appointment_id, payment_status, Utc::now())
        .await?;
    Ok(Json(ApiOk { data: appt }))
}
