// src/services/orders.rs

use crate::{
    auth::AuthUser,
    errors::{AppError, AppResult},
    models::{DashboardFilter, DayMode, ORDER_COLUMNS, Order, OrderRow, PaymentState},
    services::filters::{self, NormalizedFilter},
};
use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 200;

/// Extra list-view criteria on top of the reporting filter.
#[derive(Debug, Default, Clone)]
pub struct ListCriteria {
    pub search: Option<String>,
    pub payment_state: Option<PaymentState>,
    pub debt_only: bool,
}

impl ListCriteria {
    /// Applied after derivation so the cached state column is never consulted.
    pub fn admits(&self, order: &Order) -> bool {
        if self.debt_only && order.balance <= 0 {
            return false;
        }
        self.payment_state
            .is_none_or(|state| order.payment_state == state)
    }

    /// True when rows must be derived before filtering, so paging cannot run in SQL.
    pub fn needs_derivation(&self) -> bool {
        self.payment_state.is_some() || self.debt_only
    }
}

/// `head` over live orders, narrowed by `filter` and the optional name/phone search.
fn live_orders<'a>(
    head: &str,
    filter: &NormalizedFilter,
    search: Option<&str>,
) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::new(format!("{head} FROM orders WHERE deleted_at IS NULL"));
    filter.push_conditions(&mut qb);

    if let Some(q) = search.map(str::trim).filter(|q| !q.is_empty()) {
        let like = format!("%{}%", q);
        qb.push(" AND (client_name ILIKE ")
            .push_bind(like.clone())
            .push(" OR client_phone ILIKE ")
            .push_bind(like)
            .push(")");
    }
    qb
}

const NEWEST_FIRST: &str = " ORDER BY created_at DESC, id DESC";

/// Live orders matching `filter`, newest first.
pub async fn load_orders(
    db: &PgPool,
    filter: &NormalizedFilter,
    search: Option<&str>,
) -> AppResult<Vec<Order>> {
    let mut qb = live_orders(&format!("SELECT {ORDER_COLUMNS}"), filter, search);
    qb.push(NEWEST_FIRST);

    let rows = qb.build_query_as::<OrderRow>().fetch_all(db).await?;
    Ok(rows.into_iter().map(Order::from).collect())
}

pub async fn count_orders(
    db: &PgPool,
    filter: &NormalizedFilter,
    search: Option<&str>,
) -> AppResult<i64> {
    let total = live_orders("SELECT COUNT(*)", filter, search)
        .build_query_scalar::<i64>()
        .fetch_one(db)
        .await?;
    Ok(total)
}

/// One page of `load_orders`, cut by the database.
pub async fn load_orders_page(
    db: &PgPool,
    filter: &NormalizedFilter,
    search: Option<&str>,
    offset: usize,
    size: usize,
) -> AppResult<Vec<Order>> {
    let mut qb = live_orders(&format!("SELECT {ORDER_COLUMNS}"), filter, search);
    qb.push(NEWEST_FIRST)
        .push(" LIMIT ")
        .push_bind(size as i64)
        .push(" OFFSET ")
        .push_bind(offset as i64);

    let rows = qb.build_query_as::<OrderRow>().fetch_all(db).await?;
    Ok(rows.into_iter().map(Order::from).collect())
}

/// Live orders visible to `session` that were created, or fall due, on `day`.
pub async fn load_orders_on(
    db: &PgPool,
    session: &AuthUser,
    day: NaiveDate,
    mode: DayMode,
) -> AppResult<Vec<Order>> {
    match mode {
        DayMode::Created => {
            let window = DashboardFilter {
                date_from: Some(day),
                date_to: Some(day),
                ..Default::default()
            };
            let filter = filters::normalize(&window, session)?;
            load_orders(db, &filter, None).await
        }
        DayMode::Deadline => {
            let scope = filters::normalize(&DashboardFilter::default(), session)?;
            let mut qb = live_orders(&format!("SELECT {ORDER_COLUMNS}"), &scope, None);
            qb.push(" AND deadline = ").push_bind(day).push(NEWEST_FIRST);

            let rows = qb.build_query_as::<OrderRow>().fetch_all(db).await?;
            Ok(rows.into_iter().map(Order::from).collect())
        }
    }
}

/// One live order the session is allowed to see.
pub async fn fetch_visible_order(
    db: &PgPool,
    session: &AuthUser,
    order_id: Uuid,
) -> AppResult<Order> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND deleted_at IS NULL"
    ))
    .bind(order_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))?;

    session.ensure_access(row.branch_id, row.manager_id)?;
    Ok(Order::from(row))
}

/// Clamp `page`/`size` query values into a `(offset, size)` window.
pub fn page_window(page: Option<u32>, size: Option<u32>) -> (usize, usize) {
    let size = size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE) as usize;
    let page = page.unwrap_or(1).max(1) as usize;
    ((page - 1) * size, size)
}
