// src/routes/user_routes.rs

use axum::{
    extract::{Path, State},
    routing::delete,
    Json, Router,
};
use axum_extra::extract::WithRejection;
use uuid::Uuid;

use crate::{
    booking::store::CascadeReport,
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState},
};

pub fn router() -> Router<AppState> {
    Router::new()
        // /api/v1/users/{user_id}
        .route("/{user_id}", delete(delete_user))
}

/// Admin-only force delete. Takes the doctor profile and every appointment
/// of the user with it.
pub async fn delete_user(
    State(state): State<AppState>,
    auth: AuthContext,
    WithRejection(Path(user_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<Json<ApiOk<CascadeReport>>, ApiError> {
    let report = state.booking.delete_user(&auth.actor(), user_id).await?;
    Ok(Json(ApiOk { data: report }))
}
