// src/handlers/branches.rs

use crate::{
    auth::AuthUser,
    errors::{AppError, AppResult},
    extract::AppJson,
    models::{Branch, CreateBranchRequest, Role},
    services::audit::{self, AuditAction, AuditRecord},
    state::AppState,
};
use axum::{Json, extract::State, http::StatusCode};
use uuid::Uuid;

/// List branches visible to the session
#[utoipa::path(
    get,
    path = "/api/v1/branches",
    responses(
        (status = 200, description = "Branches", body = Vec<Branch>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Branches"
)]
pub async fn list_branches(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<Branch>>> {
    let branches = match auth.scoped_branch() {
        Some(branch_id) => {
            sqlx::query_as::<_, Branch>(
                "SELECT id, name, city, created_at FROM branches WHERE id = $1",
            )
            .bind(branch_id)
            .fetch_all(&state.db)
            .await?
        }
        None => {
            sqlx::query_as::<_, Branch>(
                "SELECT id, name, city, created_at FROM branches ORDER BY name",
            )
            .fetch_all(&state.db)
            .await?
        }
    };

    Ok(Json(branches))
}

/// Create a branch
#[utoipa::path(
    post,
    path = "/api/v1/branches",
    request_body = CreateBranchRequest,
    responses(
        (status = 201, description = "Branch created", body = Branch),
        (status = 400, description = "Empty name"),
        (status = 403, description = "Admins only"),
        (status = 409, description = "Branch name already exists"),
    ),
    security(("bearer_auth" = [])),
    tag = "Branches"
)]
pub async fn create_branch(
    auth: AuthUser,
    State(state): State<AppState>,
    AppJson(body): AppJson<CreateBranchRequest>,
) -> AppResult<(StatusCode, Json<Branch>)> {
    auth.require_any(&[Role::Admin])?;

    let name = body.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::Validation(
            "Branch name must not be empty".to_string(),
        ));
    }

    let existing: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM branches WHERE LOWER(name) = LOWER($1)")
            .bind(&name)
            .fetch_optional(&state.db)
            .await?;

    if existing.is_some() {
        return Err(AppError::Conflict(format!(
            "Branch '{}' already exists",
            name
        )));
    }

    let mut tx = state.db.begin().await?;

    let branch = sqlx::query_as::<_, Branch>(
        r#"INSERT INTO branches (id, name, city, created_at)
           VALUES ($1, $2, $3, NOW())
           RETURNING id, name, city, created_at"#,
    )
    .bind(Uuid::new_v4())
    .bind(&name)
    .bind(body.city.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()))
    .fetch_one(&mut *tx)
    .await?;

    audit::record(
        &mut *tx,
        AuditRecord::new(&auth, AuditAction::BranchCreate, branch.id)
            .branch(Some(branch.id))
            .detail("name", name),
    )
    .await?;

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(branch)))
}
