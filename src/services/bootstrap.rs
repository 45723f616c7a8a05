// src/services/bootstrap.rs

use crate::{
    config::AdminBootstrap,
    errors::{AppError, AppResult},
    models::Role,
};
use bcrypt::{DEFAULT_COST, hash};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

/// Create the configured administrator unless a user with that email already exists.
/// Returns `true` when an account was created.
pub async fn ensure_admin(db: &PgPool, admin: &AdminBootstrap) -> AppResult<bool> {
    let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE email = $1")
        .bind(&admin.email)
        .fetch_optional(db)
        .await?;

    if existing.is_some() {
        return Ok(false);
    }

    let password_hash =
        hash(&admin.password, DEFAULT_COST).map_err(|e| AppError::Internal(e.to_string()))?;

    // Another instance may have won the race; the unique email makes this a no-op.
    let inserted = sqlx::query(
        r#"INSERT INTO users (id, full_name, email, password_hash, role, is_active, created_at)
           VALUES ($1, $2, $3, $4, $5, TRUE, NOW())
           ON CONFLICT (email) DO NOTHING"#,
    )
    .bind(Uuid::new_v4())
    .bind(&admin.full_name)
    .bind(&admin.email)
    .bind(password_hash)
    .bind(Role::Admin)
    .execute(db)
    .await?
    .rows_affected();

    if inserted > 0 {
        info!(email = %admin.email, "Bootstrap administrator created");
    }
    Ok(inserted > 0)
}
