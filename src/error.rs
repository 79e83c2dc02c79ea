use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::booking::BookingError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorObject,
}

#[derive(Debug, Serialize)]
pub struct ErrorObject {
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(&'static str, String),
    Forbidden(&'static str, String),
    BadRequest(&'static str, String),
    NotFound(&'static str, String),
    Conflict(&'static str, String),
    Internal(String),
}

impl ApiError {
    pub fn invalid_credentials() -> Self {
        ApiError::Unauthorized("INVALID_CREDENTIALS", "Username or password is incorrect".into())
    }

    pub fn session_expired() -> Self {
        ApiError::Unauthorized("SESSION_EXPIRED", "Session expired".into())
    }

    fn to_error_response(code: &str, message: &str) -> Json<ErrorResponse> {
        Json(ErrorResponse {
            error: ErrorObject {
                code: code.to_string(),
                message: message.to_string(),
            },
        })
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Unauthorized(code, _) => (StatusCode::UNAUTHORIZED, *code),
            ApiError::Forbidden(code, _) => (StatusCode::FORBIDDEN, *code),
            ApiError::BadRequest(code, _) => (StatusCode::BAD_REQUEST, *code),
            ApiError::NotFound(code, _) => (StatusCode::NOT_FOUND, *code),
            ApiError::Conflict(code, _) => (StatusCode::CONFLICT, *code),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        }
    }
}

impl From<BookingError> for ApiError {
    fn from(e: BookingError) -> Self {
        let msg = e.to_string();
        match e {
            BookingError::NotFound(_) => ApiError::NotFound("NOT_FOUND", msg),
            BookingError::Validation(_) => ApiError::BadRequest("VALIDATION_ERROR", msg),
            BookingError::SlotConflict { .. } => ApiError::Conflict("SLOT_CONFLICT", msg),
            BookingError::InvalidTransition { .. } => ApiError::Conflict("INVALID_TRANSITION", msg),
            BookingError::Forbidden(_) => ApiError::Forbidden("FORBIDDEN", msg),
            BookingError::ConcurrentUpdate(_) => ApiError::Conflict("CONCURRENT_UPDATE", msg),
            BookingError::Store(err) => {
                tracing::error!("store failure: {err}");
                ApiError::Internal("storage failure".into())
            }
        }
    }
}

// Extractor failures go through `WithRejection` so they share the JSON body.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest("VALIDATION_ERROR", rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest("VALIDATION_ERROR", rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest("VALIDATION_ERROR", rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let body = match &self {
            ApiError::Unauthorized(_, msg)
            | ApiError::Forbidden(_, msg)
            | ApiError::BadRequest(_, msg)
            | ApiError::NotFound(_, msg)
            | ApiError::Conflict(_, msg)
            | ApiError::Internal(msg) => ApiError::to_error_response(code, msg),
        };
        (status, body).into_response()
    }
}
