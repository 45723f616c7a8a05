// src/models/mod.rs

use crate::{errors::AppError, services::ledger};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use tracing::warn;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

// ─── Users & Session ──────────────────────────────────────────────────────────

// sqlx 0.8: custom Postgres enums need #[sqlx(type_name = "...")] on the enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, ToSchema, PartialEq, Eq)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Staff,
    Accountant,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Staff => "staff",
            Role::Accountant => "accountant",
            Role::Viewer => "viewer",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct UserCredentials {
    pub id: Uuid,
    pub full_name: String,
    pub password_hash: String,
    pub role: Role,
    pub branch_id: Option<Uuid>,
    pub is_active: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionUser {
    pub id: Uuid,
    pub full_name: String,
    pub role: Role,
    pub branch_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: SessionUser,
}

// ─── Branches ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Branch {
    pub id: Uuid,
    pub name: String,
    pub city: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateBranchRequest {
    pub name: String,
    pub city: Option<String>,
}

// ─── Ledger Enums ─────────────────────────────────────────────────────────────

/// Derived classification of an order's payment progress.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, ToSchema, PartialEq, Eq, Hash,
)]
#[sqlx(type_name = "payment_state", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentState {
    Unpaid,
    Partial,
    Paid,
}

impl PaymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Unpaid => "UNPAID",
            PaymentState::Partial => "PARTIAL",
            PaymentState::Paid => "PAID",
        }
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Production/delivery stage, independent of payment state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, ToSchema, PartialEq, Eq)]
#[sqlx(type_name = "workflow_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::NotStarted => "not_started",
            WorkflowStatus::InProgress => "in_progress",
            WorkflowStatus::Completed => "completed",
        }
    }
}

impl FromStr for WorkflowStatus {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let key = raw.trim().to_lowercase().replace(['-', ' '], "_");
        match key.as_str() {
            "not_started" | "new" | "pending" => Ok(WorkflowStatus::NotStarted),
            "in_progress" | "started" | "processing" => Ok(WorkflowStatus::InProgress),
            "completed" | "ready" | "delivered" | "done" => Ok(WorkflowStatus::Completed),
            _ => Err(AppError::Validation(format!(
                "Unknown workflow status '{}'",
                raw.trim()
            ))),
        }
    }
}

/// Payment method. Known values are normalised; anything else is kept as a label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PaymentMethod {
    Cash,
    Card,
    Terminal,
    BankTransfer,
    Online,
    Other(String),
}

impl PaymentMethod {
    pub fn as_str(&self) -> &str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Terminal => "terminal",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Online => "online",
            PaymentMethod::Other(label) => label,
        }
    }

    /// Parse a client-supplied method, rejecting blanks.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        if raw.trim().is_empty() {
            return Err(AppError::Validation(
                "Payment method must not be empty".to_string(),
            ));
        }
        Ok(Self::from(raw.to_string()))
    }
}

impl From<String> for PaymentMethod {
    fn from(raw: String) -> Self {
        let key = raw.trim().to_lowercase();
        match key.as_str() {
            "cash" | "naqd" => PaymentMethod::Cash,
            "card" => PaymentMethod::Card,
            "terminal" | "pos" => PaymentMethod::Terminal,
            "bank" | "bank_transfer" | "transfer" | "wire" => PaymentMethod::BankTransfer,
            "online" | "payme" => PaymentMethod::Online,
            _ => PaymentMethod::Other(key),
        }
    }
}

impl From<PaymentMethod> for String {
    fn from(method: PaymentMethod) -> Self {
        method.as_str().to_string()
    }
}

// ─── Orders ───────────────────────────────────────────────────────────────────

/// Raw `orders` row. Converted into [`Order`] so derived fields are recomputed on read.
#[derive(Debug, Clone, FromRow)]
pub struct OrderRow {
    pub id: Uuid,
    pub client_name: String,
    pub client_phone: Option<String>,
    pub branch_id: Option<Uuid>,
    pub manager_id: Option<Uuid>,
    pub customer_type: Option<String>,
    pub doc_type: Option<String>,
    pub country: Option<String>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
    pub workflow_status: WorkflowStatus,
    pub total_amount: i64,
    pub paid_sum: i64,
    pub payment_state: PaymentState,
    pub deadline: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Column list matching [`OrderRow`].
pub const ORDER_COLUMNS: &str = "id, client_name, client_phone, branch_id, manager_id, \
    customer_type, doc_type, country, payment_method, notes, workflow_status, \
    total_amount, paid_sum, payment_state, deadline, created_at, updated_at";

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub client_name: String,
    pub client_phone: Option<String>,
    pub branch_id: Option<Uuid>,
    pub manager_id: Option<Uuid>,
    pub customer_type: Option<String>,
    pub doc_type: Option<String>,
    pub country: Option<String>,
    #[schema(value_type = Option<String>, example = "cash")]
    pub payment_method: Option<PaymentMethod>,
    pub notes: Option<String>,
    pub workflow_status: WorkflowStatus,
    /// Minor currency units
    pub total_amount: i64,
    pub paid_sum: i64,
    pub balance: i64,
    pub payment_state: PaymentState,
    pub deadline: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        let payment_state = ledger::derive_state(row.total_amount, row.paid_sum);
        if payment_state != row.payment_state {
            warn!(
                order_id = %row.id,
                cached = %row.payment_state,
                derived = %payment_state,
                "Cached payment state drifted from ledger figures; using derived value"
            );
        }

        Order {
            id: row.id,
            client_name: row.client_name,
            client_phone: row.client_phone,
            branch_id: row.branch_id,
            manager_id: row.manager_id,
            customer_type: row.customer_type,
            doc_type: row.doc_type,
            country: row.country,
            payment_method: row.payment_method.map(PaymentMethod::from),
            notes: row.notes,
            workflow_status: row.workflow_status,
            total_amount: row.total_amount,
            paid_sum: row.paid_sum,
            balance: ledger::balance(row.total_amount, row.paid_sum),
            payment_state,
            deadline: row.deadline,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub payments: Vec<Payment>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub client_name: String,
    pub client_phone: Option<String>,
    pub branch_id: Option<Uuid>,
    pub manager_id: Option<Uuid>,
    pub customer_type: Option<String>,
    pub doc_type: Option<String>,
    pub country: Option<String>,
    #[schema(value_type = Option<String>, example = "cash")]
    pub payment_method: Option<String>,
    pub deadline: Option<NaiveDate>,
    /// Minor currency units, must not be negative
    #[serde(default)]
    pub total_amount: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetWorkflowStatusRequest {
    /// not_started | in_progress | completed (aliases: ready, delivered)
    pub status: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetPaymentMethodRequest {
    pub method: String,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrderListQuery {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub branch_id: Option<Uuid>,
    pub manager_id: Option<Uuid>,
    pub customer_type: Option<String>,
    pub doc_type: Option<String>,
    /// Substring of client name or phone
    pub q: Option<String>,
    #[param(value_type = Option<String>, example = "PARTIAL")]
    pub payment_state: Option<PaymentState>,
    #[serde(default)]
    pub debt_only: bool,
    pub page: Option<u32>,
    pub size: Option<u32>,
}

impl OrderListQuery {
    pub fn filter(&self) -> DashboardFilter {
        DashboardFilter {
            date_from: self.date_from,
            date_to: self.date_to,
            branch_id: self.branch_id,
            manager_id: self.manager_id,
            customer_type: self.customer_type.clone(),
            doc_type: self.doc_type.clone(),
        }
    }
}

/// Which order date a one-day listing matches on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DayMode {
    #[default]
    Created,
    Deadline,
}

impl FromStr for DayMode {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "" | "created" => Ok(DayMode::Created),
            "deadline" => Ok(DayMode::Deadline),
            _ => Err(AppError::Validation(format!(
                "Unknown mode '{}', expected created or deadline",
                raw.trim()
            ))),
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DayQuery {
    /// Day to list, `YYYY-MM-DD`
    pub date: NaiveDate,
    /// `created` (default) or `deadline`
    #[param(example = "deadline")]
    pub mode: Option<String>,
}

impl DayQuery {
    pub fn mode(&self) -> Result<DayMode, AppError> {
        self.mode.as_deref().map_or(Ok(DayMode::default()), str::parse)
    }
}

/// Orders of one day, newest first.
#[derive(Debug, Serialize, ToSchema)]
pub struct OrdersByDate {
    pub date: NaiveDate,
    pub total: usize,
    pub rows: Vec<Order>,
}

// ─── Payments ─────────────────────────────────────────────────────────────────

/// Immutable payment record.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub amount: i64,
    #[sqlx(try_from = "String")]
    #[schema(value_type = String, example = "cash")]
    pub method: PaymentMethod,
    pub note: Option<String>,
    pub paid_at: NaiveDate,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

pub const PAYMENT_COLUMNS: &str =
    "id, order_id, amount, method, note, paid_at, created_by, created_at";

#[derive(Debug, Deserialize, ToSchema)]
pub struct ApplyPaymentRequest {
    /// Minor currency units, must be positive
    pub amount: i64,
    #[schema(example = "cash")]
    pub method: String,
    pub note: Option<String>,
    /// Defaults to today
    pub paid_at: Option<NaiveDate>,
}

/// Ledger figures after a payment committed.
#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub paid_sum: i64,
    pub balance: i64,
    pub payment_state: PaymentState,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PreviewQuery {
    /// Pending (unsaved) amount in minor units
    pub amount: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentPreview {
    pub order_id: Uuid,
    pub total_amount: i64,
    pub paid_sum: i64,
    pub pending_amount: i64,
    pub projected_paid_sum: i64,
    pub projected_balance: i64,
    pub projected_state: PaymentState,
}

// ─── Dashboard ────────────────────────────────────────────────────────────────

/// Raw reporting filter as received from the client. Every dimension is optional.
#[derive(Debug, Default, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DashboardFilter {
    /// Inclusive lower bound on order creation date
    pub date_from: Option<NaiveDate>,
    /// Inclusive upper bound on order creation date
    pub date_to: Option<NaiveDate>,
    pub branch_id: Option<Uuid>,
    pub manager_id: Option<Uuid>,
    pub customer_type: Option<String>,
    pub doc_type: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    #[serde(alias = "daily")]
    Day,
    #[serde(alias = "weekly")]
    Week,
    #[serde(alias = "monthly")]
    Month,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GranularityQuery {
    #[serde(default)]
    #[param(value_type = Option<String>, example = "day")]
    pub granularity: Granularity,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TopQuery {
    /// Keep only the first N entries of each breakdown
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct DashboardSummary {
    pub orders_total: i64,
    pub orders_in_progress: i64,
    pub orders_completed: i64,
    pub orders_overdue: i64,
    pub payments_sum: i64,
    pub payments_debt: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct StateTotals {
    pub count: i64,
    pub total_amount: i64,
    pub paid_amount: i64,
    pub balance: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct StateBreakdown {
    #[serde(rename = "UNPAID")]
    pub unpaid: StateTotals,
    #[serde(rename = "PARTIAL")]
    pub partial: StateTotals,
    #[serde(rename = "PAID")]
    pub paid: StateTotals,
}

impl StateBreakdown {
    pub fn get(&self, state: PaymentState) -> &StateTotals {
        match state {
            PaymentState::Unpaid => &self.unpaid,
            PaymentState::Partial => &self.partial,
            PaymentState::Paid => &self.paid,
        }
    }

    pub fn get_mut(&mut self, state: PaymentState) -> &mut StateTotals {
        match state {
            PaymentState::Unpaid => &mut self.unpaid,
            PaymentState::Partial => &mut self.partial,
            PaymentState::Paid => &mut self.paid,
        }
    }
}

/// One time-window of the analytics timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Bucket {
    pub bucket_key: String,
    pub order_count: i64,
    pub payment_sum: i64,
    pub total_amount_sum: i64,
    pub states: StateBreakdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct TopItem {
    pub label: String,
    pub value: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct TopBreakdowns {
    pub doc_types: Vec<TopItem>,
    pub customer_types: Vec<TopItem>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DashboardReport {
    pub granularity: Granularity,
    pub summary: DashboardSummary,
    pub timeline: Vec<Bucket>,
    pub top: TopBreakdowns,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct ManagerOption {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
    pub branch_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FilterOptions {
    pub branches: Vec<Branch>,
    pub managers: Vec<ManagerOption>,
    pub doc_types: Vec<String>,
    pub customer_types: Vec<String>,
}

// ─── Audit Log ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct AuditLogEntry {
    pub id: i64,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
    pub actor_name: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ActivityQuery {
    /// Defaults to 10, capped at 100
    pub limit: Option<i64>,
}

// ─── Comments ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Comment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub author: Option<String>,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCommentRequest {
    pub text: String,
    pub author: Option<String>,
}

// ─── JWT Claims ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub name: String,
    pub role: Role,
    pub branch_id: Option<Uuid>,
    pub exp: usize,
    pub iat: usize,
}
