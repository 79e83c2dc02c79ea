// src/routes/availability_routes.rs

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use axum_extra::extract::WithRejection;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    booking::{
        expansion::SlotInstance,
        schedule::{DayInput, SlotTime, TimeSlot, WeeklySchedule},
        service::parse_date,
    },
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/doctors/{doctor_id}/availability",
            get(get_availability).put(put_availability),
        )
        .route("/doctors/{doctor_id}/slots", get(get_slots_for_date))
        .route("/doctors/{doctor_id}/slots/upcoming", get(get_upcoming_slots))
        .route("/doctors/{doctor_id}/slots/check", get(check_slot))
}

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    // YYYY-MM-DD
    pub date: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotCheckQuery {
    pub date: String,
    pub start_time: String,
}

#[derive(Debug, Serialize)]
pub struct SlotCheck {
    pub taken: bool,
}

pub async fn get_availability(
    State(state): State<AppState>,
    _auth: AuthContext,
    WithRejection(Path(doctor_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<Json<ApiOk<WeeklySchedule>>, ApiError> {
    let schedule = state.booking.availability(doctor_id).await?;
    Ok(Json(ApiOk { data: schedule }))
}

/// Replace the whole weekly template.
pub async fn put_availability(
    State(state): State<AppState>,
    auth: AuthContext,
    WithRejection(Path(doctor_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Json(days), _): WithRejection<Json<Vec<DayInput>>, ApiError>,
) -> Result<Json<ApiOk<WeeklySchedule>>, ApiError> {
    let schedule = state
        .booking
        .set_availability(&auth.actor(), doctor_id, days)
        .await?;
    Ok(Json(ApiOk { data: schedule }))
}

pub async fn get_slots_for_date(
    State(state): State<AppState>,
    _auth: AuthContext,
    WithRejection(Path(doctor_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Query(q), _): WithRejection<Query<SlotsQuery>, ApiError>,
) -> Result<Json<ApiOk<Vec<TimeSlot>>>, ApiError> {
    let date = parse_date(&q.date)?;
    let slots = state.booking.slots_for_date(doctor_id, date).await?;
    Ok(Json(ApiOk { data: slots }))
}

pub async fn get_upcoming_slots(
    State(state): State<AppState>,
    _auth: AuthContext,
    WithRejection(Path(doctor_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<Json<ApiOk<Vec<SlotInstance>>>, ApiError> {
    let slots = state.booking.upcoming_slots(doctor_id, Utc::now()).await?;
    Ok(Json(ApiOk { data: slots }))
}

/// Whether a live appointment already holds the slot.
pub async fn check_slot(
    State(state): State<AppState>,
    _auth: AuthContext,
    WithRejection(Path(doctor_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Query(q), _): WithRejection<Query<SlotCheckQuery>, ApiError>,
) -> Result<Json<ApiOk<SlotCheck>>, ApiError> {
    let date = parse_date(&q.date)?;
    let start_time = SlotTime::parse(&q.start_time)?;
    let taken = state.booking.is_slot_taken(doctor_id, date, start_time).await?;
    Ok(Json(ApiOk { data: SlotCheck { taken } }))
}
