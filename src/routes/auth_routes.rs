// src/routes/auth_routes.rs

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use chrono::{Duration, Utc};

use crate::{
    auth::{generate_access_token, hash_access_token, verify_password},
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::*,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/logout", post(logout))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiOk<LoginResponseData>>, ApiError> {
    let username = req.username.trim();
    if username.is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "username and password are required".into(),
        ));
    }

    let user: UserRow = sqlx::query_as::<_, UserRow>(
        r#"
        SELECT u.user_id, u.username, u.display_name, u.password_hash, u.roles, u.is_active,
               d.doctor_id
        FROM app_user u
        LEFT JOIN doctor d ON d.user_id = u.user_id
        WHERE u.username = $1
        "#,
    )
    .bind(username)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
    .ok_or_else(ApiError::invalid_credentials)?;

    if !user.is_active {
        return Err(ApiError::Forbidden("FORBIDDEN", "Account is disabled".into()));
    }

    if !verify_password(&req.password, &user.password_hash) {
        return Err(ApiError::invalid_credentials());
    }

    let access_token = generate_access_token();
    let token_hash = hash_access_token(&access_token);
    let expires_at = Utc::now() + Duration::hours(state.session_ttl_hours);

    let session: SessionTokenRow = sqlx::query_as::<_, SessionTokenRow>(
        r#"
        INSERT INTO session_token
            (user_id, session_token_hash, device_name, expires_at)
        VALUES
            ($1, $2, $3, $4)
        RETURNING expires_at
        "#,
    )
    .bind(user.user_id)
    .bind(&token_hash)
    .bind(req.device_name.as_deref())
    .bind(expires_at)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    tracing::info!(user_id = %user.user_id, role = user.roles.as_str(), "login");

    Ok(Json(ApiOk {
        data: LoginResponseData {
            access_token,
            expires_at: session.expires_at,
            user: UserProfile {
                user_id: user.user_id,
                username: user.username,
                display_name: user.display_name,
                role: user.roles,
                doctor_id: user.doctor_id,
            },
        },
    }))
}

pub async fn me(auth: AuthContext) -> Result<Json<ApiOk<serde_json::Value>>, ApiError> {
    Ok(Json(ApiOk {
        data: serde_json::json!({
            "userId": auth.user_id,
            "role": auth.role,
            "doctorId": auth.doctor_id,
            "sessionTokenId": auth.session_token_id,
        }),
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    sqlx::query(
        r#"
        UPDATE session_token
        SET revoked_at = now()
        WHERE session_token_id = $1
          AND revoked_at IS NULL
        "#,
    )
    .bind(auth.session_token_id)
    .execute(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk {
        data: OkData { ok: true },
    }))
}
