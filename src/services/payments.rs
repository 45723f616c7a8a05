// src/services/payments.rs
//
// Ledger mutations. Each runs in one transaction that first takes the order's row
// lock (`FOR UPDATE`), so writes to the same order serialize while different orders
// never contend.

use crate::{
    auth::AuthUser,
    errors::{AppError, AppResult},
    models::{
        ORDER_COLUMNS, Order, OrderRow, PAYMENT_COLUMNS, Payment, PaymentMethod, PaymentPreview,
        PaymentReceipt, WorkflowStatus,
    },
    services::{
        audit::{self, AuditAction, AuditRecord},
        ledger,
    },
};
use chrono::{NaiveDate, Utc};
use sqlx::{FromRow, PgConnection, PgPool};
use tracing::{info, instrument};
use uuid::Uuid;

/// Validated input for [`apply_payment`].
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub amount: i64,
    pub method: PaymentMethod,
    pub note: Option<String>,
    pub paid_at: Option<NaiveDate>,
}

impl NewPayment {
    pub fn new(
        amount: i64,
        method: &str,
        note: Option<String>,
        paid_at: Option<NaiveDate>,
    ) -> AppResult<Self> {
        if amount <= 0 {
            return Err(AppError::Validation(
                "Payment amount must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            amount,
            method: PaymentMethod::parse(method)?,
            note: note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            paid_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct LockedLedger {
    total_amount: i64,
    paid_sum: i64,
    branch_id: Option<Uuid>,
    manager_id: Option<Uuid>,
}

/// Take the row lock on a live order. Held until the transaction ends.
async fn lock_order(conn: &mut PgConnection, order_id: Uuid) -> AppResult<LockedLedger> {
    sqlx::query_as::<_, LockedLedger>(
        r#"SELECT total_amount, paid_sum, branch_id, manager_id
           FROM orders
           WHERE id = $1 AND deleted_at IS NULL
           FOR UPDATE"#,
    )
    .bind(order_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))
}

/// Append a payment and recompute the order's derived figures atomically.
#[instrument(skip(db, actor, input), fields(actor = %actor.id, amount = input.amount))]
pub async fn apply_payment(
    db: &PgPool,
    actor: &AuthUser,
    order_id: Uuid,
    input: NewPayment,
) -> AppResult<PaymentReceipt> {
    if input.amount <= 0 {
        return Err(AppError::Validation(
            "Payment amount must be greater than zero".to_string(),
        ));
    }

    let mut tx = db.begin().await?;

    let ledger_row = lock_order(&mut tx, order_id).await?;
    actor.ensure_access(ledger_row.branch_id, ledger_row.manager_id)?;

    let paid_sum = ledger_row
        .paid_sum
        .checked_add(input.amount)
        .ok_or_else(|| AppError::Validation("Payment amount is too large".to_string()))?;
    let payment_state = ledger::derive_state(ledger_row.total_amount, paid_sum);
    let balance = ledger::balance(ledger_row.total_amount, paid_sum);
    let paid_at = input.paid_at.unwrap_or_else(|| Utc::now().date_naive());

    // Stamped after the lock is held, so created_at follows commit order per order.
    let payment = sqlx::query_as::<_, Payment>(&format!(
        r#"INSERT INTO payments (id, order_id, amount, method, note, paid_at, created_by, created_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, clock_timestamp())
           RETURNING {PAYMENT_COLUMNS}"#
    ))
    .bind(Uuid::new_v4())
    .bind(order_id)
    .bind(input.amount)
    .bind(input.method.as_str())
    .bind(&input.note)
    .bind(paid_at)
    .bind(actor.id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        r#"UPDATE orders
           SET paid_sum = $1, payment_state = $2, updated_at = clock_timestamp()
           WHERE id = $3"#,
    )
    .bind(paid_sum)
    .bind(payment_state)
    .bind(order_id)
    .execute(&mut *tx)
    .await?;

    audit::record(
        &mut *tx,
        AuditRecord::new(actor, AuditAction::PaymentCreate, payment.id)
            .branch(ledger_row.branch_id)
            .detail("order_id", order_id.to_string())
            .detail("amount", input.amount)
            .detail("method", input.method.as_str())
            .detail("paid_sum", paid_sum)
            .detail("payment_state", payment_state.as_str()),
    )
    .await?;

    tx.commit().await?;

    info!(
        order_id = %order_id,
        payment_id = %payment.id,
        paid_sum,
        balance,
        state = %payment_state,
        "Payment applied"
    );

    Ok(PaymentReceipt {
        payment,
        paid_sum,
        balance,
        payment_state,
    })
}

/// Overwrite the workflow status. Never touches the payment figures.
#[instrument(skip(db, actor), fields(actor = %actor.id))]
pub async fn set_workflow_status(
    db: &PgPool,
    actor: &AuthUser,
    order_id: Uuid,
    status: WorkflowStatus,
) -> AppResult<Order> {
    let mut tx = db.begin().await?;

    let ledger_row = lock_order(&mut tx, order_id).await?;
    actor.ensure_access(ledger_row.branch_id, ledger_row.manager_id)?;

    let row = sqlx::query_as::<_, OrderRow>(&format!(
        r#"UPDATE orders SET workflow_status = $1, updated_at = clock_timestamp()
           WHERE id = $2
           RETURNING {ORDER_COLUMNS}"#
    ))
    .bind(status)
    .bind(order_id)
    .fetch_one(&mut *tx)
    .await?;

    audit::record(
        &mut *tx,
        AuditRecord::new(actor, AuditAction::OrderStatus, order_id)
            .branch(ledger_row.branch_id)
            .detail("status", status.as_str()),
    )
    .await?;

    tx.commit().await?;

    info!(order_id = %order_id, status = status.as_str(), "Workflow status set");
    Ok(Order::from(row))
}

/// Overwrite the order's default payment method. Existing payments keep theirs.
#[instrument(skip(db, actor), fields(actor = %actor.id))]
pub async fn set_payment_method_default(
    db: &PgPool,
    actor: &AuthUser,
    order_id: Uuid,
    method: PaymentMethod,
) -> AppResult<Order> {
    let mut tx = db.begin().await?;

    let ledger_row = lock_order(&mut tx, order_id).await?;
    actor.ensure_access(ledger_row.branch_id, ledger_row.manager_id)?;

    let row = sqlx::query_as::<_, OrderRow>(&format!(
        r#"UPDATE orders SET payment_method = $1, updated_at = clock_timestamp()
           WHERE id = $2
           RETURNING {ORDER_COLUMNS}"#
    ))
    .bind(method.as_str())
    .bind(order_id)
    .fetch_one(&mut *tx)
    .await?;

    audit::record(
        &mut *tx,
        AuditRecord::new(actor, AuditAction::OrderPaymentMethod, order_id)
            .branch(ledger_row.branch_id)
            .detail("method", method.as_str()),
    )
    .await?;

    tx.commit().await?;

    info!(order_id = %order_id, method = method.as_str(), "Default payment method set");
    Ok(Order::from(row))
}

pub async fn list_payments(db: &PgPool, order_id: Uuid) -> AppResult<Vec<Payment>> {
    let payments = sqlx::query_as::<_, Payment>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1 ORDER BY created_at, id"
    ))
    .bind(order_id)
    .fetch_all(db)
    .await?;

    Ok(payments)
}

/// Sum of recorded payment rows; must equal the order's `paid_sum`.
pub fn payments_total(payments: &[Payment]) -> i64 {
    payments.iter().map(|p| p.amount).sum()
}

/// What-if figures for an unsaved amount, computed with the same rule as commits.
pub fn preview(order: &Order, pending_amount: i64) -> AppResult<PaymentPreview> {
    if pending_amount < 0 {
        return Err(AppError::Validation(
            "Pending amount must not be negative".to_string(),
        ));
    }
    let projection = ledger::project(order.total_amount, order.paid_sum, pending_amount);
    Ok(PaymentPreview {
        order_id: order.id,
        total_amount: order.total_amount,
        paid_sum: order.paid_sum,
        pending_amount,
        projected_paid_sum: projection.paid_sum,
        projected_balance: projection.balance,
        projected_state: projection.state,
    })
}
