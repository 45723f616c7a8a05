// src/routes/mod.rs

use crate::{
    handlers::{
        auth::{login, me},
        branches::{create_branch, list_branches},
        comments::{add_comment, delete_comment, list_comments},
        dashboard::{activity, filter_options, payment_stats, report, summary, timeline, top},
        general::{health_handler, root_handler},
        orders::{
            create_order, delete_order, get_order, list_orders, orders_by_date,
            set_payment_method, set_workflow_status,
        },
        payments::{apply_payment, list_order_payments, preview_payment},
    },
    openapi::ApiDoc,
    state::AppState,
};
use axum::{
    Router,
    routing::{delete, get, patch, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // ─── Auth ─────────────────────────────────────────────
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
        // ─── Branches ─────────────────────────────────────────
        .route("/branches", get(list_branches).post(create_branch))
        // ─── Orders ───────────────────────────────────────────
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/by-date", get(orders_by_date))
        .route("/orders/stats/payments", get(payment_stats))
        .route("/orders/{order_id}", get(get_order).delete(delete_order))
        .route("/orders/{order_id}/status", patch(set_workflow_status))
        .route("/orders/{order_id}/payment-method", patch(set_payment_method))
        // ─── Payments ─────────────────────────────────────────
        .route(
            "/orders/{order_id}/payments",
            post(apply_payment).get(list_order_payments),
        )
        .route("/orders/{order_id}/payments/preview", get(preview_payment))
        // ─── Comments ─────────────────────────────────────────
        .route(
            "/orders/{order_id}/comments",
            get(list_comments).post(add_comment),
        )
        .route(
            "/orders/{order_id}/comments/{comment_id}",
            delete(delete_comment),
        )
        // ─── Dashboard ────────────────────────────────────────
        .route("/dashboard/summary", get(summary))
        .route("/dashboard/timeline", get(timeline))
        .route("/dashboard/top", get(top))
        .route("/dashboard/report", get(report))
        .route("/dashboard/activity", get(activity))
        .route("/dashboard/filters", get(filter_options))
}

/// Full application router: landing page, health, versioned API and Swagger UI.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .nest("/api/v1", api_routes())
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
