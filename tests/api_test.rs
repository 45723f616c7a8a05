//! Router-level tests for paths that are decided before any query runs.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use common::{bearer, get_request, json_request, lazy_state, router, send, session};
use order_ledger::models::Role;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let (response, body) = send(router(lazy_state()), get_request("/api/v1/orders", None)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["kind"], "unauthorized");
    assert_eq!(body["error"]["code"], 401);
}

#[tokio::test]
async fn garbage_token_is_unauthorized() {
    let (response, _) = send(
        router(lazy_state()),
        get_request("/api/v1/dashboard/summary", Some("Bearer not.a.token")),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_from_another_secret_is_rejected() {
    let state = lazy_state();
    let mut other = common::test_config("postgres://unused");
    other.jwt_secret = "some-other-secret".to_string();
    let foreign_keys = order_ledger::state::SessionKeys::from_config(&other);
    let user = session(Role::Admin, None);
    let token = order_ledger::auth::generate_token(&user.session_user(), &foreign_keys).unwrap();

    let (response, _) = send(
        router(state),
        get_request("/api/v1/auth/me", Some(&format!("Bearer {}", token))),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_echoes_the_session() {
    let state = lazy_state();
    let user = session(Role::Accountant, Some(Uuid::new_v4()));
    let auth = bearer(&state, &user);

    let (response, body) = send(router(state), get_request("/api/v1/auth/me", Some(&auth))).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body["id"], user.id.to_string());
    assert_eq!(body["role"], "accountant");
}

#[tokio::test]
async fn zero_payment_is_rejected_as_validation() {
    let state = lazy_state();
    let auth = bearer(&state, &session(Role::Accountant, None));
    let uri = format!("/api/v1/orders/{}/payments", Uuid::new_v4());

    let (response, body) = send(
        router(state),
        json_request("POST", &uri, Some(&auth), json!({ "amount": 0, "method": "cash" })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "validation");
    assert_eq!(body["error"]["retryable"], false);
}

#[tokio::test]
async fn negative_payment_is_rejected_as_validation() {
    let state = lazy_state();
    let auth = bearer(&state, &session(Role::Admin, None));
    let uri = format!("/api/v1/orders/{}/payments", Uuid::new_v4());

    let (response, _) = send(
        router(state),
        json_request("POST", &uri, Some(&auth), json!({ "amount": -500, "method": "cash" })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn viewer_cannot_record_payments() {
    let state = lazy_state();
    let auth = bearer(&state, &session(Role::Viewer, None));
    let uri = format!("/api/v1/orders/{}/payments", Uuid::new_v4());

    let (response, body) = send(
        router(state),
        json_request("POST", &uri, Some(&auth), json!({ "amount": 1000, "method": "card" })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["kind"], "forbidden");
}

#[tokio::test]
async fn unknown_workflow_status_is_rejected() {
    let state = lazy_state();
    let auth = bearer(&state, &session(Role::Manager, None));
    let uri = format!("/api/v1/orders/{}/status", Uuid::new_v4());

    let (response, body) = send(
        router(state),
        json_request("PATCH", &uri, Some(&auth), json!({ "status": "archived" })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(
        body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("archived")
    );
}

#[tokio::test]
async fn reversed_date_range_is_rejected() {
    let state = lazy_state();
    let auth = bearer(&state, &session(Role::Admin, None));

    let (response, body) = send(
        router(state),
        get_request(
            "/api/v1/dashboard/summary?date_from=2024-05-10&date_to=2024-05-01",
            Some(&auth),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(
        body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("Invalid range")
    );
}

#[tokio::test]
async fn foreign_branch_filter_is_forbidden_for_managers() {
    let state = lazy_state();
    let auth = bearer(&state, &session(Role::Manager, Some(Uuid::new_v4())));
    let uri = format!("/api/v1/dashboard/timeline?branch_id={}", Uuid::new_v4());

    let (response, _) = send(router(state), get_request(&uri, Some(&auth))).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn blank_client_name_is_rejected() {
    let state = lazy_state();
    let auth = bearer(&state, &session(Role::Manager, None));

    let (response, body) = send(
        router(state),
        json_request(
            "POST",
            "/api/v1/orders",
            Some(&auth),
            json!({ "client_name": "   ", "total_amount": 100000 }),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "validation");
}

#[tokio::test]
async fn negative_total_is_rejected() {
    let state = lazy_state();
    let auth = bearer(&state, &session(Role::Admin, None));

    let (response, _) = send(
        router(state),
        json_request(
            "POST",
            "/api/v1/orders",
            Some(&auth),
            json!({ "client_name": "Ali", "total_amount": -1 }),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_granularity_gets_the_json_error_body() {
    let state = lazy_state();
    let auth = bearer(&state, &session(Role::Admin, None));

    let (response, body) = send(
        router(state),
        get_request("/api/v1/dashboard/timeline?granularity=hourly", Some(&auth)),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "validation");
    assert_eq!(body["error"]["code"], 400);
}

#[tokio::test]
async fn empty_branch_id_gets_the_json_error_body() {
    let state = lazy_state();
    let auth = bearer(&state, &session(Role::Admin, None));

    let (response, body) = send(
        router(state),
        get_request("/api/v1/dashboard/summary?branch_id=", Some(&auth)),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "validation");
    assert_eq!(body["error"]["retryable"], false);
}

#[tokio::test]
async fn malformed_payment_body_gets_the_json_error_body() {
    let state = lazy_state();
    let auth = bearer(&state, &session(Role::Accountant, None));
    let request = Request::builder()
        .method("POST")
        .uri(format!("/api/v1/orders/{}/payments", Uuid::new_v4()))
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, &auth)
        .body(Body::from(r#"{"amount": 100, "method": "#))
        .unwrap();

    let (response, body) = send(router(state), request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "validation");
}

#[tokio::test]
async fn non_uuid_order_id_gets_the_json_error_body() {
    let state = lazy_state();
    let auth = bearer(&state, &session(Role::Admin, None));

    let (response, body) = send(
        router(state),
        get_request("/api/v1/orders/not-an-id", Some(&auth)),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "validation");
}

#[tokio::test]
async fn unknown_day_mode_is_rejected() {
    let state = lazy_state();
    let auth = bearer(&state, &session(Role::Viewer, Some(Uuid::new_v4())));

    let (response, body) = send(
        router(state),
        get_request("/api/v1/orders/by-date?date=2024-05-01&mode=paid", Some(&auth)),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].as_str().unwrap().contains("paid"));
}

#[tokio::test]
async fn day_listing_requires_a_date() {
    let state = lazy_state();
    let auth = bearer(&state, &session(Role::Admin, None));

    let (response, body) = send(
        router(state),
        get_request("/api/v1/orders/by-date?mode=deadline", Some(&auth)),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "validation");
}

#[tokio::test]
async fn landing_page_and_openapi_are_served() {
    let (response, _) = send(router(lazy_state()), get_request("/", None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let (response, spec) = send(
        router(lazy_state()),
        get_request("/api-docs/openapi.json", None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(spec["paths"]["/api/v1/orders/{order_id}/payments"].is_object());
    assert!(spec["paths"]["/api/v1/dashboard/timeline"].is_object());
    assert!(spec["paths"]["/api/v1/orders/by-date"].is_object());
}
