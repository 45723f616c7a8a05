// src/services/filters.rs
//
// Turns a raw `DashboardFilter` plus the caller's session into a `NormalizedFilter`.
// Unknown branch/manager references are hard errors (404), never an empty report.

use crate::{
    auth::AuthUser,
    errors::{AppError, AppResult},
    models::{DashboardFilter, Order, Role},
};
use chrono::{DateTime, Days, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

/// A single filter dimension after resolution.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Constraint<T> {
    #[default]
    Any,
    Exactly(T),
}

impl<T: PartialEq> Constraint<T> {
    /// Exact match; a missing value never satisfies a concrete constraint.
    pub fn admits(&self, value: Option<&T>) -> bool {
        match self {
            Constraint::Any => true,
            Constraint::Exactly(expected) => value == Some(expected),
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Constraint::Any => None,
            Constraint::Exactly(v) => Some(v),
        }
    }
}

/// Filter ready to hand to the aggregator or a listing query unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedFilter {
    /// Inclusive, on the UTC date of `created_at` (and `paid_at` for payments)
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub branch: Constraint<Uuid>,
    pub manager: Constraint<Uuid>,
    pub customer_type: Constraint<String>,
    pub doc_type: Constraint<String>,
}

impl NormalizedFilter {
    /// Half-open `[start, end)` instant range covering the inclusive date window.
    pub fn created_range(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let start = self.date_from.map(start_of_day);
        let end = self
            .date_to
            .and_then(|d| d.checked_add_days(Days::new(1)))
            .map(start_of_day);
        (start, end)
    }

    pub fn admits_date(&self, date: NaiveDate) -> bool {
        self.date_from.is_none_or(|from| date >= from) && self.date_to.is_none_or(|to| date <= to)
    }

    pub fn admits(&self, order: &Order) -> bool {
        self.admits_date(order.created_at.date_naive())
            && self.branch.admits(order.branch_id.as_ref())
            && self.manager.admits(order.manager_id.as_ref())
            && self.customer_type.admits(order.customer_type.as_ref())
            && self.doc_type.admits(order.doc_type.as_ref())
    }

    /// Append ` AND ...` conditions on the `orders` columns.
    pub fn push_conditions(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        let (start, end) = self.created_range();
        if let Some(start) = start {
            qb.push(" AND created_at >= ").push_bind(start);
        }
        if let Some(end) = end {
            qb.push(" AND created_at < ").push_bind(end);
        }
        if let Constraint::Exactly(branch_id) = self.branch {
            qb.push(" AND branch_id = ").push_bind(branch_id);
        }
        if let Constraint::Exactly(manager_id) = self.manager {
            qb.push(" AND manager_id = ").push_bind(manager_id);
        }
        if let Constraint::Exactly(customer_type) = &self.customer_type {
            qb.push(" AND customer_type = ").push_bind(customer_type.clone());
        }
        if let Constraint::Exactly(doc_type) = &self.doc_type {
            qb.push(" AND doc_type = ").push_bind(doc_type.clone());
        }
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

fn text_constraint(raw: Option<&String>) -> Constraint<String> {
    match raw.map(|s| s.trim()).filter(|s| !s.is_empty()) {
        Some(value) => Constraint::Exactly(value.to_string()),
        None => Constraint::Any,
    }
}

/// Validate and normalise a raw filter against the session scope. Pure.
pub fn normalize(raw: &DashboardFilter, session: &AuthUser) -> AppResult<NormalizedFilter> {
    if let (Some(from), Some(to)) = (raw.date_from, raw.date_to) {
        if from > to {
            return Err(AppError::Validation(format!(
                "Invalid range: date_from {} is after date_to {}",
                from, to
            )));
        }
    }

    let branch = match (session.scoped_branch(), raw.branch_id) {
        (Some(scope), Some(requested)) if requested != scope => {
            return Err(AppError::Forbidden("Branch access denied".to_string()));
        }
        (Some(scope), _) => Constraint::Exactly(scope),
        (None, Some(_)) if session.role == Role::Staff => {
            return Err(AppError::Forbidden("Branch access denied".to_string()));
        }
        (None, Some(requested)) => Constraint::Exactly(requested),
        (None, None) => Constraint::Any,
    };

    let manager = match (session.scoped_manager(), raw.manager_id) {
        (Some(me), Some(requested)) if requested != me => {
            return Err(AppError::Forbidden(
                "Manager filter is not allowed".to_string(),
            ));
        }
        (Some(me), _) => Constraint::Exactly(me),
        (None, Some(requested)) => Constraint::Exactly(requested),
        (None, None) => Constraint::Any,
    };

    Ok(NormalizedFilter {
        date_from: raw.date_from,
        date_to: raw.date_to,
        branch,
        manager,
        customer_type: text_constraint(raw.customer_type.as_ref()),
        doc_type: text_constraint(raw.doc_type.as_ref()),
    })
}

/// Normalise, then check that referenced branch/manager records exist.
pub async fn resolve(
    db: &PgPool,
    raw: &DashboardFilter,
    session: &AuthUser,
) -> AppResult<NormalizedFilter> {
    let filter = normalize(raw, session)?;
    if let Some(branch_id) = raw.branch_id {
        ensure_branch_exists(db, branch_id).await?;
    }
    if let Some(manager_id) = raw.manager_id {
        ensure_user_exists(db, manager_id).await?;
    }
    Ok(filter)
}

pub async fn ensure_branch_exists(db: &PgPool, branch_id: Uuid) -> AppResult<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM branches WHERE id = $1)")
        .bind(branch_id)
        .fetch_one(db)
        .await?;
    if !exists {
        return Err(AppError::NotFound(format!("Branch {} not found", branch_id)));
    }
    Ok(())
}

pub async fn ensure_user_exists(db: &PgPool, user_id: Uuid) -> AppResult<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
        .bind(user_id)
        .fetch_one(db)
        .await?;
    if !exists {
        return Err(AppError::NotFound(format!("Manager {} not found", user_id)));
    }
    Ok(())
}
