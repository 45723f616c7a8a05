// src/handlers/comments.rs

use crate::{
    auth::AuthUser,
    errors::{AppError, AppResult},
    extract::{AppJson, AppPath},
    models::{Comment, CreateCommentRequest, Role},
    services::{
        audit::{self, AuditAction, AuditRecord},
        orders,
    },
    state::AppState,
};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use uuid::Uuid;

const COMMENT_COLUMNS: &str = "id, order_id, author, text, created_at";

/// List comments on an order, newest first
#[utoipa::path(
    get,
    path = "/api/v1/orders/{order_id}/comments",
    params(("order_id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Comments", body = Vec<Comment>),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Order not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Comments"
)]
pub async fn list_comments(
    auth: AuthUser,
    State(state): State<AppState>,
    AppPath(order_id): AppPath<Uuid>,
) -> AppResult<Json<Vec<Comment>>> {
    orders::fetch_visible_order(&state.db, &auth, order_id).await?;

    let comments = sqlx::query_as::<_, Comment>(&format!(
        "SELECT {COMMENT_COLUMNS} FROM comments WHERE order_id = $1 ORDER BY created_at DESC, id"
    ))
    .bind(order_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(comments))
}

/// Add a comment to an order
#[utoipa::path(
    post,
    path = "/api/v1/orders/{order_id}/comments",
    request_body = CreateCommentRequest,
    params(("order_id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 201, description = "Comment added", body = Comment),
        (status = 400, description = "Empty comment"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Order not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Comments"
)]
pub async fn add_comment(
    auth: AuthUser,
    State(state): State<AppState>,
    AppPath(order_id): AppPath<Uuid>,
    AppJson(body): AppJson<CreateCommentRequest>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    auth.require_any(&[Role::Admin, Role::Manager, Role::Staff])?;

    let text = body.text.trim().to_string();
    if text.is_empty() {
        return Err(AppError::Validation("Comment must not be empty".to_string()));
    }
    let author = body
        .author
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| auth.name.clone());

    let order = orders::fetch_visible_order(&state.db, &auth, order_id).await?;

    let mut tx = state.db.begin().await?;

    let comment = sqlx::query_as::<_, Comment>(&format!(
        r#"INSERT INTO comments (id, order_id, author, text, created_at)
           VALUES ($1, $2, $3, $4, NOW())
           RETURNING {COMMENT_COLUMNS}"#
    ))
    .bind(Uuid::new_v4())
    .bind(order_id)
    .bind(author)
    .bind(text)
    .fetch_one(&mut *tx)
    .await?;

    audit::record(
        &mut *tx,
        AuditRecord::new(&auth, AuditAction::CommentCreate, comment.id)
            .branch(order.branch_id)
            .detail("order_id", order_id.to_string()),
    )
    .await?;

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(comment)))
}

/// Delete a comment
#[utoipa::path(
    delete,
    path = "/api/v1/orders/{order_id}/comments/{comment_id}",
    params(
        ("order_id" = Uuid, Path, description = "Order ID"),
        ("comment_id" = Uuid, Path, description = "Comment ID"),
    ),
    responses(
        (status = 204, description = "Comment deleted"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Comment not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Comments"
)]
pub async fn delete_comment(
    auth: AuthUser,
    State(state): State<AppState>,
    AppPath((order_id, comment_id)): AppPath<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    auth.require_any(&[Role::Admin, Role::Manager])?;
    let order = orders::fetch_visible_order(&state.db, &auth, order_id).await?;

    let mut tx = state.db.begin().await?;

    let deleted = sqlx::query("DELETE FROM comments WHERE id = $1 AND order_id = $2")
        .bind(comment_id)
        .bind(order_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(AppError::NotFound(format!(
            "Comment {} not found",
            comment_id
        )));
    }

    audit::record(
        &mut *tx,
        AuditRecord::new(&auth, AuditAction::CommentDelete, comment_id)
            .branch(order.branch_id)
            .detail("order_id", order_id.to_string()),
    )
    .await?;

    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}
