// src/openapi.rs

use crate::models::{
    ApplyPaymentRequest, AuditLogEntry, AuthResponse, Branch, Bucket, Comment,
    CreateBranchRequest, CreateCommentRequest, CreateOrderRequest, DashboardReport,
    DashboardSummary, FilterOptions, Granularity, LoginRequest, ManagerOption, Order,
    OrderDetail, OrdersByDate, Payment, PaymentPreview, PaymentReceipt, PaymentState, Role, SessionUser,
    SetPaymentMethodRequest, SetWorkflowStatusRequest, StateBreakdown, StateTotals,
    TopBreakdowns, TopItem, WorkflowStatus,
};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            )
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Order Ledger API",
        version = "1.0.0",
        description = "Order financial ledger for a service business. Records payments \
            against orders, derives each order's payment state from its raw figures, and \
            aggregates orders into filtered, time-bucketed dashboard reports.",
        license(name = "MIT")
    ),
    paths(
        // Auth
        crate::handlers::auth::login,
        crate::handlers::auth::me,
        // Branches
        crate::handlers::branches::list_branches,
        crate::handlers::branches::create_branch,
        // Orders
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::orders_by_date,
        crate::handlers::orders::get_order,
        crate::handlers::orders::delete_order,
        crate::handlers::orders::set_workflow_status,
        crate::handlers::orders::set_payment_method,
        // Payments
        crate::handlers::payments::apply_payment,
        crate::handlers::payments::list_order_payments,
        crate::handlers::payments::preview_payment,
        // Comments
        crate::handlers::comments::list_comments,
        crate::handlers::comments::add_comment,
        crate::handlers::comments::delete_comment,
        // Dashboard
        crate::handlers::dashboard::summary,
        crate::handlers::dashboard::timeline,
        crate::handlers::dashboard::top,
        crate::handlers::dashboard::report,
        crate::handlers::dashboard::activity,
        crate::handlers::dashboard::payment_stats,
        crate::handlers::dashboard::filter_options,
    ),
    components(
        schemas(
            LoginRequest, AuthResponse, SessionUser, Role,
            Branch, CreateBranchRequest,
            Order, OrderDetail, OrdersByDate, CreateOrderRequest, WorkflowStatus, PaymentState,
            SetWorkflowStatusRequest, SetPaymentMethodRequest,
            Payment, ApplyPaymentRequest, PaymentReceipt, PaymentPreview,
            Comment, CreateCommentRequest,
            DashboardSummary, DashboardReport, Granularity, Bucket, StateBreakdown,
            StateTotals, TopItem, TopBreakdowns, FilterOptions, ManagerOption, AuditLogEntry,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Auth", description = "Login and inspect the current session"),
        (name = "Branches", description = "Branches orders and users belong to"),
        (name = "Orders", description = "Create, list and update orders"),
        (name = "Payments", description = "Record payments and preview their effect"),
        (name = "Comments", description = "Free-text notes on orders"),
        (name = "Dashboard", description = "Filtered summaries, timelines and activity"),
    )
)]
pub struct ApiDoc;
