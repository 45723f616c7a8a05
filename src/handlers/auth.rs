// src/handlers/auth.rs

use crate::{
    auth::{AuthUser, generate_token},
    errors::{AppError, AppResult},
    extract::AppJson,
    models::{AuthResponse, LoginRequest, SessionUser, UserCredentials},
    state::AppState,
};
use axum::{Json, extract::State};
use bcrypt::verify;
use tracing::info;

/// Login and receive a session token
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
    ),
    tag = "Auth"
)]
pub async fn login(
    State(state): State<AppState>,
    AppJson(body): AppJson<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let email = body.email.trim().to_lowercase();

    let user = sqlx::query_as::<_, UserCredentials>(
        r#"SELECT id, full_name, password_hash, role, branch_id, is_active
           FROM users WHERE email = $1"#,
    )
    .bind(&email)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::Unauthorized("Invalid email or password".to_string()))?;

    let valid = verify(&body.password, &user.password_hash)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    if !valid {
        return Err(AppError::Unauthorized(
            "Invalid email or password".to_string(),
        ));
    }

    if !user.is_active {
        return Err(AppError::Forbidden("Account is disabled".to_string()));
    }

    sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
        .bind(user.id)
        .execute(&state.db)
        .await?;

    let session = SessionUser {
        id: user.id,
        full_name: user.full_name,
        role: user.role,
        branch_id: user.branch_id,
    };
    let token = generate_token(&session, &state.keys)?;

    info!(user_id = %session.id, role = session.role.as_str(), "User logged in");

    Ok(Json(AuthResponse {
        token,
        user: session,
    }))
}

/// Current session context
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Session user", body = SessionUser),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn me(auth: AuthUser) -> AppResult<Json<SessionUser>> {
    Ok(Json(auth.session_user()))
}
