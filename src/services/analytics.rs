// src/services/analytics.rs
//
// Dashboard aggregation. Loading narrows the scan in SQL; the aggregation itself is
// pure and re-applies the filter, so it can be exercised without a database.

use crate::{
    errors::AppResult,
    models::{
        Bucket, DashboardReport, DashboardSummary, Granularity, Order, PAYMENT_COLUMNS,
        Payment, StateBreakdown, TopBreakdowns, TopItem, WorkflowStatus,
    },
    services::{filters::NormalizedFilter, ledger, orders},
};
use chrono::{Datelike, Days, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;
use uuid::Uuid;

const UNKNOWN_LABEL: &str = "Unknown";

/// First day of the bucket containing `date`.
pub fn bucket_start(date: NaiveDate, granularity: Granularity) -> NaiveDate {
    match granularity {
        Granularity::Day => date,
        Granularity::Week => {
            let offset = u64::from(date.weekday().num_days_from_monday());
            date.checked_sub_days(Days::new(offset)).unwrap_or(date)
        }
        Granularity::Month => date.with_day(1).unwrap_or(date),
    }
}

pub fn bucket_key(start: NaiveDate, granularity: Granularity) -> String {
    match granularity {
        Granularity::Day => start.format("%Y-%m-%d").to_string(),
        Granularity::Week => {
            let week = start.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        }
        Granularity::Month => start.format("%Y-%m").to_string(),
    }
}

fn in_scope<'a>(filter: &'a NormalizedFilter, orders: &'a [Order]) -> impl Iterator<Item = &'a Order> {
    orders.iter().filter(move |o| filter.admits(o))
}

pub fn summarize(
    filter: &NormalizedFilter,
    orders: &[Order],
    payments: &[Payment],
    today: NaiveDate,
) -> DashboardSummary {
    let mut summary = DashboardSummary::default();
    let mut ids = HashSet::new();

    for order in in_scope(filter, orders) {
        ids.insert(order.id);
        summary.orders_total += 1;
        if order.workflow_status == WorkflowStatus::Completed {
            summary.orders_completed += 1;
        } else {
            summary.orders_in_progress += 1;
            if order.deadline.is_some_and(|d| d < today) {
                summary.orders_overdue += 1;
            }
        }
        summary.payments_debt += ledger::balance(order.total_amount, order.paid_sum);
    }

    summary.payments_sum = payments
        .iter()
        .filter(|p| ids.contains(&p.order_id) && filter.admits_date(p.paid_at))
        .map(|p| p.amount)
        .sum();

    summary
}

/// One bucket per populated window, ascending. Empty windows are omitted.
pub fn timeline(
    filter: &NormalizedFilter,
    orders: &[Order],
    granularity: Granularity,
) -> Vec<Bucket> {
    let mut buckets: BTreeMap<NaiveDate, Bucket> = BTreeMap::new();

    for order in in_scope(filter, orders) {
        let start = bucket_start(order.created_at.date_naive(), granularity);
        let bucket = buckets.entry(start).or_insert_with(|| Bucket {
            bucket_key: bucket_key(start, granularity),
            order_count: 0,
            payment_sum: 0,
            total_amount_sum: 0,
            states: StateBreakdown::default(),
        });

        // Re-derived from raw figures, not taken from the order's cached state.
        let state = ledger::derive_state(order.total_amount, order.paid_sum);
        let balance = ledger::balance(order.total_amount, order.paid_sum);

        bucket.order_count += 1;
        bucket.payment_sum += order.paid_sum;
        bucket.total_amount_sum += order.total_amount;

        let totals = bucket.states.get_mut(state);
        totals.count += 1;
        totals.total_amount += order.total_amount;
        totals.paid_amount += order.paid_sum;
        totals.balance += balance;
    }

    buckets.into_values().collect()
}

fn label_of(value: Option<&String>) -> String {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN_LABEL)
        .to_string()
}

/// Count descending, then label ascending.
fn rank(counts: HashMap<String, i64>, limit: Option<usize>) -> Vec<TopItem> {
    let mut items: Vec<TopItem> = counts
        .into_iter()
        .map(|(label, value)| TopItem { label, value })
        .collect();
    items.sort_by(|a, b| b.value.cmp(&a.value).then_with(|| a.label.cmp(&b.label)));
    if let Some(limit) = limit {
        items.truncate(limit);
    }
    items
}

pub fn top_breakdowns(
    filter: &NormalizedFilter,
    orders: &[Order],
    limit: Option<usize>,
) -> TopBreakdowns {
    let mut doc_types: HashMap<String, i64> = HashMap::new();
    let mut customer_types: HashMap<String, i64> = HashMap::new();

    for order in in_scope(filter, orders) {
        *doc_types.entry(label_of(order.doc_type.as_ref())).or_default() += 1;
        *customer_types
            .entry(label_of(order.customer_type.as_ref()))
            .or_default() += 1;
    }

    TopBreakdowns {
        doc_types: rank(doc_types, limit),
        customer_types: rank(customer_types, limit),
    }
}

pub fn aggregate(
    filter: &NormalizedFilter,
    orders: &[Order],
    payments: &[Payment],
    granularity: Granularity,
    today: NaiveDate,
) -> DashboardReport {
    DashboardReport {
        granularity,
        summary: summarize(filter, orders, payments, today),
        timeline: timeline(filter, orders, granularity),
        top: top_breakdowns(filter, orders, None),
    }
}

// ─── Loading ──────────────────────────────────────────────────────────────────

/// Committed orders in scope plus their payments inside the date window.
pub async fn load_scope(
    db: &PgPool,
    filter: &NormalizedFilter,
) -> AppResult<(Vec<Order>, Vec<Payment>)> {
    let orders = orders::load_orders(db, filter, None).await?;
    if orders.is_empty() {
        return Ok((orders, Vec::new()));
    }

    let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let mut qb = QueryBuilder::<Postgres>::new(format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = ANY("
    ));
    qb.push_bind(ids).push(")");
    if let Some(from) = filter.date_from {
        qb.push(" AND paid_at >= ").push_bind(from);
    }
    if let Some(to) = filter.date_to {
        qb.push(" AND paid_at <= ").push_bind(to);
    }

    let payments = qb.build_query_as::<Payment>().fetch_all(db).await?;
    debug!(
        orders = orders.len(),
        payments = payments.len(),
        "Loaded dashboard scope"
    );
    Ok((orders, payments))
}

pub async fn report(
    db: &PgPool,
    filter: &NormalizedFilter,
    granularity: Granularity,
) -> AppResult<DashboardReport> {
    let (orders, payments) = load_scope(db, filter).await?;
    Ok(aggregate(
        filter,
        &orders,
        &payments,
        granularity,
        Utc::now().date_naive(),
    ))
}
