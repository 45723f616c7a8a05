// src/handlers/payments.rs

use crate::{
    auth::AuthUser,
    errors::AppResult,
    extract::{AppJson, AppPath, AppQuery},
    models::{ApplyPaymentRequest, Payment, PaymentPreview, PaymentReceipt, PreviewQuery, Role},
    services::{
        orders,
        payments::{self, NewPayment},
    },
    state::AppState,
};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use uuid::Uuid;

/// Record a payment against an order
#[utoipa::path(
    post,
    path = "/api/v1/orders/{order_id}/payments",
    request_body = ApplyPaymentRequest,
    params(("order_id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 201, description = "Payment recorded", body = PaymentReceipt),
        (status = 400, description = "Amount must be positive"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Concurrent update, retry"),
        (status = 503, description = "Storage unavailable, retry"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn apply_payment(
    auth: AuthUser,
    State(state): State<AppState>,
    AppPath(order_id): AppPath<Uuid>,
    AppJson(body): AppJson<ApplyPaymentRequest>,
) -> AppResult<(StatusCode, Json<PaymentReceipt>)> {
    // Bad input is rejected before any I/O.
    let input = NewPayment::new(body.amount, &body.method, body.note, body.paid_at)?;
    auth.require_any(&[Role::Admin, Role::Manager, Role::Accountant])?;

    let receipt = payments::apply_payment(&state.db, &auth, order_id, input).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// List the payments of an order
#[utoipa::path(
    get,
    path = "/api/v1/orders/{order_id}/payments",
    params(("order_id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Payments, oldest first", body = Vec<Payment>),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Order not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn list_order_payments(
    auth: AuthUser,
    State(state): State<AppState>,
    AppPath(order_id): AppPath<Uuid>,
) -> AppResult<Json<Vec<Payment>>> {
    orders::fetch_visible_order(&state.db, &auth, order_id).await?;
    let payments = payments::list_payments(&state.db, order_id).await?;
    Ok(Json(payments))
}

/// Project the ledger figures for an unsaved amount
#[utoipa::path(
    get,
    path = "/api/v1/orders/{order_id}/payments/preview",
    params(
        ("order_id" = Uuid, Path, description = "Order ID"),
        PreviewQuery,
    ),
    responses(
        (status = 200, description = "Projected figures, nothing persisted", body = PaymentPreview),
        (status = 400, description = "Negative amount"),
        (status = 404, description = "Order not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn preview_payment(
    auth: AuthUser,
    State(state): State<AppState>,
    AppPath(order_id): AppPath<Uuid>,
    AppQuery(query): AppQuery<PreviewQuery>,
) -> AppResult<Json<PaymentPreview>> {
    let order = orders::fetch_visible_order(&state.db, &auth, order_id).await?;
    Ok(Json(payments::preview(&order, query.amount)?))
}
