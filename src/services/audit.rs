// src/services/audit.rs

use crate::{
    auth::AuthUser,
    errors::AppResult,
    models::{AuditLogEntry, Role},
};
use serde_json::{Map, Value};
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

pub const DEFAULT_ACTIVITY_LIMIT: i64 = 10;
pub const MAX_ACTIVITY_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    OrderCreate,
    OrderDelete,
    OrderStatus,
    OrderPaymentMethod,
    PaymentCreate,
    CommentCreate,
    CommentDelete,
    BranchCreate,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::OrderCreate => "order.create",
            AuditAction::OrderDelete => "order.delete",
            AuditAction::OrderStatus => "order.status",
            AuditAction::OrderPaymentMethod => "order.payment_method",
            AuditAction::PaymentCreate => "payment.create",
            AuditAction::CommentCreate => "comment.create",
            AuditAction::CommentDelete => "comment.delete",
            AuditAction::BranchCreate => "branch.create",
        }
    }

    pub fn entity_type(&self) -> &'static str {
        match self {
            AuditAction::OrderCreate
            | AuditAction::OrderDelete
            | AuditAction::OrderStatus
            | AuditAction::OrderPaymentMethod => "order",
            AuditAction::PaymentCreate => "payment",
            AuditAction::CommentCreate | AuditAction::CommentDelete => "comment",
            AuditAction::BranchCreate => "branch",
        }
    }
}

/// A pending audit row.
#[derive(Debug)]
pub struct AuditRecord<'a> {
    pub actor: Option<&'a AuthUser>,
    pub action: AuditAction,
    pub entity_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
    pub details: Map<String, Value>,
}

impl<'a> AuditRecord<'a> {
    pub fn new(actor: &'a AuthUser, action: AuditAction, entity_id: Uuid) -> Self {
        Self {
            actor: Some(actor),
            action,
            entity_id: Some(entity_id),
            branch_id: None,
            details: Map::new(),
        }
    }

    pub fn branch(mut self, branch_id: Option<Uuid>) -> Self {
        self.branch_id = branch_id;
        self
    }

    pub fn detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    fn details_text(&self) -> Option<String> {
        if self.details.is_empty() {
            None
        } else {
            Some(Value::Object(self.details.clone()).to_string())
        }
    }
}

/// Append an entry. Pass the open transaction so the entry commits with the mutation.
pub async fn record<'e, E>(executor: E, entry: AuditRecord<'_>) -> AppResult<i64>
where
    E: PgExecutor<'e>,
{
    // Branch defaults to the actor's own, mirroring how activity is scoped on read.
    let branch_id = entry
        .branch_id
        .or_else(|| entry.actor.and_then(|a| a.branch_id));

    let id: i64 = sqlx::query_scalar(
        r#"INSERT INTO audit_logs (user_id, branch_id, action, entity_type, entity_id, details, created_at)
           VALUES ($1, $2, $3, $4, $5, $6, clock_timestamp())
           RETURNING id"#,
    )
    .bind(entry.actor.map(|a| a.id))
    .bind(branch_id)
    .bind(entry.action.as_str())
    .bind(entry.action.entity_type())
    .bind(entry.entity_id)
    .bind(entry.details_text())
    .fetch_one(executor)
    .await?;

    Ok(id)
}

pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit
        .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
        .clamp(1, MAX_ACTIVITY_LIMIT)
}

/// Newest entries first, ties broken by insertion order.
pub async fn recent(
    db: &PgPool,
    session: &AuthUser,
    limit: Option<i64>,
) -> AppResult<Vec<AuditLogEntry>> {
    let mut qb = QueryBuilder::<Postgres>::new(
        r#"SELECT a.id, a.action, a.entity_type, a.entity_id, a.details, a.created_at,
                  u.full_name AS actor_name
           FROM audit_logs a
           LEFT JOIN users u ON u.id = a.user_id
           WHERE TRUE"#,
    );

    if session.role != Role::Admin {
        qb.push(" AND (a.user_id = ").push_bind(session.id);
        if let Some(branch_id) = session.branch_id {
            qb.push(" OR a.branch_id = ").push_bind(branch_id);
        }
        qb.push(")");
    }

    qb.push(" ORDER BY a.created_at DESC, a.id DESC LIMIT ")
        .push_bind(clamp_limit(limit));

    let entries = qb
        .build_query_as::<AuditLogEntry>()
        .fetch_all(db)
        .await?;

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_defaults_and_caps() {
        assert_eq!(clamp_limit(None), DEFAULT_ACTIVITY_LIMIT);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(5_000)), MAX_ACTIVITY_LIMIT);
        assert_eq!(clamp_limit(Some(25)), 25);
    }

    #[test]
    fn details_are_serialised_as_json_object() {
        let actor = AuthUser {
            id: Uuid::new_v4(),
            name: "Kassir".to_string(),
            role: Role::Accountant,
            branch_id: None,
        };
        let entry = AuditRecord::new(&actor, AuditAction::PaymentCreate, Uuid::new_v4())
            .detail("amount", 40_000)
            .detail("method", "cash");
        let text = entry.details_text().unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["amount"], 40_000);
        assert_eq!(parsed["method"], "cash");
    }

    #[test]
    fn actions_map_to_entity_types() {
        assert_eq!(AuditAction::PaymentCreate.entity_type(), "payment");
        assert_eq!(AuditAction::OrderStatus.entity_type(), "order");
        assert_eq!(AuditAction::OrderStatus.as_str(), "order.status");
    }
}
