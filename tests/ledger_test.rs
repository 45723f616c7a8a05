//! Database-backed ledger tests. Run with `TEST_DATABASE_URL` set and `--ignored`.

mod common;

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{
    bearer, db_state, get_request, insert_branch, insert_user, json_request, router, send,
    session,
};
use order_ledger::{
    auth::AuthUser,
    models::{DashboardFilter, Granularity, PaymentState, Role},
    services::{
        analytics, audit,
        filters::{self, Constraint},
        orders,
        payments::{self, NewPayment},
    },
    state::AppState,
};
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

async fn create_order(state: &AppState, auth: &str, branch_id: Uuid, total: i64) -> Uuid {
    let (response, body) = send(
        router(state.clone()),
        json_request(
            "POST",
            "/api/v1/orders",
            Some(auth),
            json!({
                "client_name": "Ledger Client",
                "branch_id": branch_id,
                "doc_type": "passport",
                "customer_type": "individual",
                "total_amount": total,
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED, "{body}");
    Uuid::parse_str(body["id"].as_str().unwrap()).unwrap()
}

async fn admin_in_branch(state: &AppState) -> (AuthUser, Uuid, String) {
    let branch = insert_branch(&state.db, "Branch").await;
    let mut admin = session(Role::Admin, None);
    admin.name = format!("Admin {}", admin.id);
    insert_user(&state.db, &admin).await;
    let auth = bearer(state, &admin);
    (admin, branch, auth)
}

async fn pay(
    state: &AppState,
    auth: &str,
    order_id: Uuid,
    amount: i64,
) -> (StatusCode, serde_json::Value) {
    let (response, body) = send(
        router(state.clone()),
        json_request(
            "POST",
            &format!("/api/v1/orders/{}/payments", order_id),
            Some(auth),
            json!({ "amount": amount, "method": "cash" }),
        ),
    )
    .await;
    (response.status(), body)
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn payments_move_order_from_unpaid_to_paid() {
    let state = db_state().await;
    let (_, branch, auth) = admin_in_branch(&state).await;
    let order_id = create_order(&state, &auth, branch, 100_000).await;

    let (_, detail) = send(
        router(state.clone()),
        get_request(&format!("/api/v1/orders/{}", order_id), Some(&auth)),
    )
    .await;
    assert_eq!(detail["payment_state"], "UNPAID");
    assert_eq!(detail["balance"], 100_000);

    let (status, receipt) = pay(&state, &auth, order_id, 40_000).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(receipt["paid_sum"], 40_000);
    assert_eq!(receipt["payment_state"], "PARTIAL");
    assert_eq!(receipt["balance"], 60_000);

    let (status, receipt) = pay(&state, &auth, order_id, 60_000).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(receipt["paid_sum"], 100_000);
    assert_eq!(receipt["payment_state"], "PAID");
    assert_eq!(receipt["balance"], 0);

    let recorded = payments::list_payments(&state.db, order_id).await.unwrap();
    assert_eq!(recorded.len(), 2);
    assert_eq!(payments::payments_total(&recorded), 100_000);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn zero_payment_leaves_ledger_untouched() {
    let state = db_state().await;
    let (admin, branch, auth) = admin_in_branch(&state).await;
    let order_id = create_order(&state, &auth, branch, 100_000).await;

    let (status, _) = pay(&state, &auth, order_id, 0).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let order = orders::fetch_visible_order(&state.db, &admin, order_id)
        .await
        .unwrap();
    assert_eq!(order.paid_sum, 0);
    assert_eq!(order.payment_state, PaymentState::Unpaid);
    assert!(
        payments::list_payments(&state.db, order_id)
            .await
            .unwrap()
            .is_empty()
    );

    let logged: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM audit_logs WHERE action = 'payment.create' AND user_id = $1",
    )
    .bind(admin.id)
    .fetch_one(&state.db)
    .await
    .unwrap();
    assert_eq!(logged, 0);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn concurrent_payments_on_one_order_are_not_lost() {
    let state = db_state().await;
    let (admin, branch, auth) = admin_in_branch(&state).await;
    let order_id = create_order(&state, &auth, branch, 50_000).await;

    let mut handles = Vec::new();
    for _ in 0..20 {
        let db = state.db.clone();
        let actor = admin.clone();
        handles.push(tokio::spawn(async move {
            let input = NewPayment::new(1_000, "cash", None, None).unwrap();
            payments::apply_payment(&db, &actor, order_id, input).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let order = orders::fetch_visible_order(&state.db, &admin, order_id)
        .await
        .unwrap();
    let recorded = payments::list_payments(&state.db, order_id).await.unwrap();
    assert_eq!(order.paid_sum, 20_000);
    assert_eq!(payments::payments_total(&recorded), order.paid_sum);
    assert_eq!(order.payment_state, PaymentState::Partial);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn same_day_orders_land_in_one_bucket() {
    let state = db_state().await;
    let (admin, branch, auth) = admin_in_branch(&state).await;
    let paid = create_order(&state, &auth, branch, 50_000).await;
    create_order(&state, &auth, branch, 50_000).await;
    pay(&state, &auth, paid, 50_000).await;

    let raw = DashboardFilter {
        branch_id: Some(branch),
        ..Default::default()
    };
    let filter = filters::resolve(&state.db, &raw, &admin).await.unwrap();
    assert_eq!(filter.branch, Constraint::Exactly(branch));

    let report = analytics::report(&state.db, &filter, Granularity::Day)
        .await
        .unwrap();
    assert_eq!(report.timeline.len(), 1);
    let bucket = &report.timeline[0];
    assert_eq!(bucket.order_count, 2);
    assert_eq!(bucket.states.paid.count, 1);
    assert_eq!(bucket.states.unpaid.count, 1);
    assert_eq!(bucket.payment_sum, 50_000);

    let counted: i64 = report.timeline.iter().map(|b| b.order_count).sum();
    assert_eq!(counted, report.summary.orders_total);
    assert_eq!(report.summary.payments_sum, 50_000);
    assert_eq!(report.summary.payments_debt, 50_000);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn unknown_branch_filter_is_not_found() {
    let state = db_state().await;
    let (_, _, auth) = admin_in_branch(&state).await;

    let (response, body) = send(
        router(state.clone()),
        get_request(
            &format!("/api/v1/dashboard/summary?branch_id={}", Uuid::new_v4()),
            Some(&auth),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["kind"], "not_found");
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn deleted_orders_reject_payments() {
    let state = db_state().await;
    let (_, branch, auth) = admin_in_branch(&state).await;
    let order_id = create_order(&state, &auth, branch, 10_000).await;

    let (response, _) = send(
        router(state.clone()),
        json_request(
            "DELETE",
            &format!("/api/v1/orders/{}", order_id),
            Some(&auth),
            json!({}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let (status, _) = pay(&state, &auth, order_id, 5_000).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn manager_only_sees_own_branch() {
    let state = db_state().await;
    let (_, branch, auth) = admin_in_branch(&state).await;
    let other_branch = insert_branch(&state.db, "Other").await;
    let foreign = create_order(&state, &auth, other_branch, 10_000).await;

    let manager = session(Role::Manager, Some(branch));
    insert_user(&state.db, &manager).await;

    let err = orders::fetch_visible_order(&state.db, &manager, foreign)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn mutations_are_audited_newest_first() {
    let state = db_state().await;
    let (admin, branch, auth) = admin_in_branch(&state).await;
    let order_id = create_order(&state, &auth, branch, 10_000).await;
    pay(&state, &auth, order_id, 2_500).await;

    let (response, _) = send(
        router(state.clone()),
        json_request(
            "PATCH",
            &format!("/api/v1/orders/{}/status", order_id),
            Some(&auth),
            json!({ "status": "ready" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let entries = audit::recent(&state.db, &admin, Some(100)).await.unwrap();
    let mine: Vec<&str> = entries
        .iter()
        .filter(|e| e.actor_name.as_deref() == Some(admin.name.as_str()))
        .take(3)
        .map(|e| e.action.as_str())
        .collect();
    assert_eq!(mine, vec!["order.status", "payment.create", "order.create"]);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn payment_waiting_on_the_row_lock_is_stamped_after_release() {
    let state = db_state().await;
    let (admin, branch, auth) = admin_in_branch(&state).await;
    let order_id = create_order(&state, &auth, branch, 10_000).await;

    let mut holder = state.db.begin().await.unwrap();
    sqlx::query("SELECT id FROM orders WHERE id = $1 FOR UPDATE")
        .bind(order_id)
        .execute(&mut *holder)
        .await
        .unwrap();

    let db = state.db.clone();
    let actor = admin.clone();
    let waiting = tokio::spawn(async move {
        let input = NewPayment::new(1_000, "cash", None, None).unwrap();
        payments::apply_payment(&db, &actor, order_id, input).await
    });
    // Let the payment open its transaction and block on the lock.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let released_at: DateTime<Utc> = sqlx::query_scalar("SELECT clock_timestamp()")
        .fetch_one(&mut *holder)
        .await
        .unwrap();
    holder.commit().await.unwrap();

    let receipt = waiting.await.unwrap().unwrap();
    assert!(receipt.payment.created_at >= released_at);

    let audited_at: DateTime<Utc> = sqlx::query_scalar(
        "SELECT created_at FROM audit_logs WHERE action = 'payment.create' AND entity_id = $1",
    )
    .bind(receipt.payment.id)
    .fetch_one(&state.db)
    .await
    .unwrap();
    assert!(audited_at >= released_at);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn payment_method_default_keeps_paid_sum_and_is_audited() {
    let state = db_state().await;
    let (_, branch, auth) = admin_in_branch(&state).await;
    let order_id = create_order(&state, &auth, branch, 100).await;
    let (status, _) = pay(&state, &auth, order_id, 30).await;
    assert_eq!(status, StatusCode::CREATED);

    let (response, body) = send(
        router(state.clone()),
        json_request(
            "PATCH",
            &format!("/api/v1/orders/{}/payment-method", order_id),
            Some(&auth),
            json!({ "method": "Payme" }),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK, "{body}");
    assert_eq!(body["payment_method"], "online");
    assert_eq!(body["paid_sum"], 30);
    assert_eq!(body["payment_state"], "PARTIAL");
    assert_eq!(body["balance"], 70);

    let logged: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM audit_logs WHERE action = 'order.payment_method' AND entity_id = $1",
    )
    .bind(order_id)
    .fetch_one(&state.db)
    .await
    .unwrap();
    assert_eq!(logged, 1);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn day_listing_by_deadline_stays_in_branch_scope() {
    let state = db_state().await;
    let (_, branch, auth) = admin_in_branch(&state).await;
    let due = Utc::now().date_naive() + chrono::Days::new(3);

    let (response, created) = send(
        router(state.clone()),
        json_request(
            "POST",
            "/api/v1/orders",
            Some(&auth),
            json!({
                "client_name": "Deadline Client",
                "branch_id": branch,
                "total_amount": 20_000,
                "deadline": due,
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED, "{created}");
    create_order(&state, &auth, branch, 10_000).await;
    let other_branch = insert_branch(&state.db, "Other").await;
    send(
        router(state.clone()),
        json_request(
            "POST",
            "/api/v1/orders",
            Some(&auth),
            json!({
                "client_name": "Elsewhere",
                "branch_id": other_branch,
                "total_amount": 5_000,
                "deadline": due,
            }),
        ),
    )
    .await;

    let manager = session(Role::Manager, Some(branch));
    insert_user(&state.db, &manager).await;
    let manager_auth = bearer(&state, &manager);

    let (response, body) = send(
        router(state.clone()),
        get_request(
            &format!("/api/v1/orders/by-date?date={}&mode=deadline", due),
            Some(&manager_auth),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK, "{body}");
    let rows = body["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(body["total"], 1);
    assert_eq!(rows[0]["id"], created["id"]);
    assert_eq!(rows[0]["deadline"], due.to_string());
    assert_eq!(rows[0]["payment_state"], "UNPAID");
    assert_eq!(rows[0]["balance"], 20_000);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn unfiltered_listing_pages_in_the_database() {
    let state = db_state().await;
    let (_, branch, auth) = admin_in_branch(&state).await;
    for total in [1_000, 2_000, 3_000] {
        create_order(&state, &auth, branch, total).await;
    }

    let list = |page: u32| {
        get_request(
            &format!("/api/v1/orders?branch_id={}&size=2&page={}", branch, page),
            Some(&auth),
        )
    };

    let (response, first) = send(router(state.clone()), list(1)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-total-count"], "3");
    assert_eq!(first.as_array().unwrap().len(), 2);
    assert_eq!(first[0]["total_amount"], 3_000);

    let (response, second) = send(router(state.clone()), list(2)).await;
    assert_eq!(response.headers()["x-total-count"], "3");
    let second = second.as_array().unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0]["total_amount"], 1_000);
}
