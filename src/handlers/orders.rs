// src/handlers/orders.rs

use crate::{
    auth::AuthUser,
    errors::{AppError, AppResult},
    extract::{AppJson, AppPath, AppQuery},
    models::{
        CreateOrderRequest, DayQuery, ORDER_COLUMNS, Order, OrderDetail, OrderListQuery,
        OrderRow, OrdersByDate, PaymentMethod, Role, SetPaymentMethodRequest,
        SetWorkflowStatusRequest, WorkflowStatus,
    },
    services::{
        audit::{self, AuditAction, AuditRecord},
        filters,
        orders::{self, ListCriteria},
        payments,
    },
    state::AppState,
};
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

pub const TOTAL_COUNT_HEADER: &str = "x-total-count";

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Create a new order
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = Order),
        (status = 400, description = "Invalid order data"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Unknown branch or manager"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn create_order(
    auth: AuthUser,
    State(state): State<AppState>,
    AppJson(body): AppJson<CreateOrderRequest>,
) -> AppResult<(StatusCode, Json<Order>)> {
    auth.require_any(&[Role::Admin, Role::Manager, Role::Staff])?;

    let client_name = body.client_name.trim().to_string();
    if client_name.is_empty() {
        return Err(AppError::Validation(
            "Client name must not be empty".to_string(),
        ));
    }
    if body.total_amount < 0 {
        return Err(AppError::Validation(
            "Total amount must not be negative".to_string(),
        ));
    }
    if let Some(deadline) = body.deadline {
        if deadline < Utc::now().date_naive() {
            return Err(AppError::Validation(
                "Deadline must not be in the past".to_string(),
            ));
        }
    }

    let branch_id = body.branch_id.or(auth.branch_id);
    let manager_id = body.manager_id.or(Some(auth.id));
    auth.ensure_access(branch_id, manager_id)?;

    if let Some(branch_id) = branch_id {
        filters::ensure_branch_exists(&state.db, branch_id).await?;
    }
    if let Some(manager_id) = body.manager_id {
        filters::ensure_user_exists(&state.db, manager_id).await?;
    }

    let payment_method = match non_blank(body.payment_method) {
        Some(raw) => Some(PaymentMethod::parse(&raw)?),
        None => None,
    };

    let mut tx = state.db.begin().await?;

    let row = sqlx::query_as::<_, OrderRow>(&format!(
        r#"INSERT INTO orders (
            id, client_name, client_phone, branch_id, manager_id, customer_type, doc_type,
            country, payment_method, notes, workflow_status, total_amount, paid_sum,
            payment_state, deadline, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,'not_started',$11,0,'UNPAID',$12,NOW(),NOW())
        RETURNING {ORDER_COLUMNS}"#
    ))
    .bind(Uuid::new_v4())
    .bind(&client_name)
    .bind(non_blank(body.client_phone))
    .bind(branch_id)
    .bind(manager_id)
    .bind(non_blank(body.customer_type))
    .bind(non_blank(body.doc_type))
    .bind(non_blank(body.country))
    .bind(payment_method.as_ref().map(|m| m.as_str().to_string()))
    .bind(non_blank(body.notes))
    .bind(body.total_amount)
    .bind(body.deadline)
    .fetch_one(&mut *tx)
    .await?;

    audit::record(
        &mut *tx,
        AuditRecord::new(&auth, AuditAction::OrderCreate, row.id)
            .branch(row.branch_id)
            .detail("client_name", client_name)
            .detail("total_amount", row.total_amount),
    )
    .await?;

    tx.commit().await?;

    info!(order_id = %row.id, total_amount = row.total_amount, "Order created");
    Ok((StatusCode::CREATED, Json(Order::from(row))))
}

/// List orders visible to the session
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(OrderListQuery),
    responses(
        (status = 200, description = "Page of orders; total in x-total-count", body = Vec<Order>),
        (status = 400, description = "Invalid range"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Unknown branch or manager"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    auth: AuthUser,
    State(state): State<AppState>,
    AppQuery(query): AppQuery<OrderListQuery>,
) -> AppResult<(HeaderMap, Json<Vec<Order>>)> {
    let filter = filters::resolve(&state.db, &query.filter(), &auth).await?;
    let criteria = ListCriteria {
        search: query.q.clone(),
        payment_state: query.payment_state,
        debt_only: query.debt_only,
    };

    let search = criteria.search.as_deref();
    let (offset, size) = orders::page_window(query.page, query.size);

    let (total, page): (i64, Vec<Order>) = if criteria.needs_derivation() {
        let matching: Vec<Order> = orders::load_orders(&state.db, &filter, search)
            .await?
            .into_iter()
            .filter(|o| criteria.admits(o))
            .collect();
        let total = matching.len() as i64;
        (total, matching.into_iter().skip(offset).take(size).collect())
    } else {
        let total = orders::count_orders(&state.db, &filter, search).await?;
        let page = orders::load_orders_page(&state.db, &filter, search, offset, size).await?;
        (total, page)
    };

    let mut headers = HeaderMap::new();
    headers.insert(TOTAL_COUNT_HEADER, HeaderValue::from(total));

    Ok((headers, Json(page)))
}

/// Orders created, or due, on one day
#[utoipa::path(
    get,
    path = "/api/v1/orders/by-date",
    params(DayQuery),
    responses(
        (status = 200, description = "Orders of the day visible to the session", body = OrdersByDate),
        (status = 400, description = "Invalid date or mode"),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn orders_by_date(
    auth: AuthUser,
    State(state): State<AppState>,
    AppQuery(query): AppQuery<DayQuery>,
) -> AppResult<Json<OrdersByDate>> {
    let mode = query.mode()?;
    let rows = orders::load_orders_on(&state.db, &auth, query.date, mode).await?;

    Ok(Json(OrdersByDate {
        date: query.date,
        total: rows.len(),
        rows,
    }))
}

/// Get an order with its payments
#[utoipa::path(
    get,
    path = "/api/v1/orders/{order_id}",
    params(("order_id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order detail", body = OrderDetail),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Order not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    auth: AuthUser,
    State(state): State<AppState>,
    AppPath(order_id): AppPath<Uuid>,
) -> AppResult<Json<OrderDetail>> {
    let order = orders::fetch_visible_order(&state.db, &auth, order_id).await?;
    let payments = payments::list_payments(&state.db, order_id).await?;

    let recorded = payments::payments_total(&payments);
    if recorded != order.paid_sum {
        warn!(
            order_id = %order_id,
            paid_sum = order.paid_sum,
            recorded,
            "Order paid_sum disagrees with its payment rows"
        );
    }

    Ok(Json(OrderDetail { order, payments }))
}

/// Soft-delete an order
#[utoipa::path(
    delete,
    path = "/api/v1/orders/{order_id}",
    params(("order_id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 204, description = "Order deleted"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Order not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn delete_order(
    auth: AuthUser,
    State(state): State<AppState>,
    AppPath(order_id): AppPath<Uuid>,
) -> AppResult<StatusCode> {
    auth.require_any(&[Role::Admin, Role::Manager])?;
    let order = orders::fetch_visible_order(&state.db, &auth, order_id).await?;

    let mut tx = state.db.begin().await?;

    let deleted = sqlx::query(
        "UPDATE orders SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(order_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if deleted == 0 {
        return Err(AppError::NotFound(format!("Order {} not found", order_id)));
    }

    audit::record(
        &mut *tx,
        AuditRecord::new(&auth, AuditAction::OrderDelete, order_id)
            .branch(order.branch_id)
            .detail("client_name", order.client_name),
    )
    .await?;

    tx.commit().await?;

    info!(order_id = %order_id, "Order deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Set an order's workflow status
#[utoipa::path(
    patch,
    path = "/api/v1/orders/{order_id}/status",
    request_body = SetWorkflowStatusRequest,
    params(("order_id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Status updated", body = Order),
        (status = 400, description = "Unknown status"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Order not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn set_workflow_status(
    auth: AuthUser,
    State(state): State<AppState>,
    AppPath(order_id): AppPath<Uuid>,
    AppJson(body): AppJson<SetWorkflowStatusRequest>,
) -> AppResult<Json<Order>> {
    auth.require_any(&[Role::Admin, Role::Manager, Role::Staff])?;
    let status: WorkflowStatus = body.status.parse()?;

    let order = payments::set_workflow_status(&state.db, &auth, order_id, status).await?;
    Ok(Json(order))
}

/// Set an order's default payment method
#[utoipa::path(
    patch,
    path = "/api/v1/orders/{order_id}/payment-method",
    request_body = SetPaymentMethodRequest,
    params(("order_id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Payment method updated", body = Order),
        (status = 400, description = "Empty method"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Order not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn set_payment_method(
    auth: AuthUser,
    State(state): State<AppState>,
    AppPath(order_id): AppPath<Uuid>,
    AppJson(body): AppJson<SetPaymentMethodRequest>,
) -> AppResult<Json<Order>> {
    auth.require_any(&[Role::Admin, Role::Manager, Role::Staff])?;
    let method = PaymentMethod::parse(&body.method)?;

    let order = payments::set_payment_method_default(&state.db, &auth, order_id, method).await?;
    Ok(Json(order))
}
