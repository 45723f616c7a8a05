// src/handlers/dashboard.rs

use crate::{
    auth::AuthUser,
    errors::AppResult,
    extract::AppQuery,
    models::{
        ActivityQuery, AuditLogEntry, Branch, Bucket, DashboardFilter, DashboardReport,
        DashboardSummary, FilterOptions, GranularityQuery, ManagerOption, Role, TopBreakdowns,
        TopQuery,
    },
    services::{
        analytics, audit,
        filters::{self, NormalizedFilter},
        orders,
    },
    state::AppState,
};
use axum::{
    Json,
    extract::State,
};
use chrono::Utc;
use sqlx::{PgPool, Postgres, QueryBuilder};

/// Dashboard headline figures
#[utoipa::path(
    get,
    path = "/api/v1/dashboard/summary",
    params(DashboardFilter),
    responses(
        (status = 200, description = "Summary over the filtered orders", body = DashboardSummary),
        (status = 400, description = "Invalid range"),
        (status = 403, description = "Filter outside session scope"),
        (status = 404, description = "Unknown branch or manager"),
    ),
    security(("bearer_auth" = [])),
    tag = "Dashboard"
)]
pub async fn summary(
    auth: AuthUser,
    State(state): State<AppState>,
    AppQuery(raw): AppQuery<DashboardFilter>,
) -> AppResult<Json<DashboardSummary>> {
    let filter = filters::resolve(&state.db, &raw, &auth).await?;
    let (orders, payments) = analytics::load_scope(&state.db, &filter).await?;

    Ok(Json(analytics::summarize(
        &filter,
        &orders,
        &payments,
        Utc::now().date_naive(),
    )))
}

/// Orders grouped into day/week/month buckets
#[utoipa::path(
    get,
    path = "/api/v1/dashboard/timeline",
    params(DashboardFilter, GranularityQuery),
    responses(
        (status = 200, description = "Buckets in ascending order, empty windows omitted", body = Vec<Bucket>),
        (status = 400, description = "Invalid range or granularity"),
        (status = 404, description = "Unknown branch or manager"),
    ),
    security(("bearer_auth" = [])),
    tag = "Dashboard"
)]
pub async fn timeline(
    auth: AuthUser,
    State(state): State<AppState>,
    AppQuery(raw): AppQuery<DashboardFilter>,
    AppQuery(params): AppQuery<GranularityQuery>,
) -> AppResult<Json<Vec<Bucket>>> {
    let filter = filters::resolve(&state.db, &raw, &auth).await?;
    let orders = orders::load_orders(&state.db, &filter, None).await?;

    Ok(Json(analytics::timeline(
        &filter,
        &orders,
        params.granularity,
    )))
}

/// Most frequent document and customer types
#[utoipa::path(
    get,
    path = "/api/v1/dashboard/top",
    params(DashboardFilter, TopQuery),
    responses(
        (status = 200, description = "Counts sorted descending, ties by label", body = TopBreakdowns),
        (status = 404, description = "Unknown branch or manager"),
    ),
    security(("bearer_auth" = [])),
    tag = "Dashboard"
)]
pub async fn top(
    auth: AuthUser,
    State(state): State<AppState>,
    AppQuery(raw): AppQuery<DashboardFilter>,
    AppQuery(params): AppQuery<TopQuery>,
) -> AppResult<Json<TopBreakdowns>> {
    let filter = filters::resolve(&state.db, &raw, &auth).await?;
    let orders = orders::load_orders(&state.db, &filter, None).await?;

    Ok(Json(analytics::top_breakdowns(&filter, &orders, params.limit)))
}

/// Summary, timeline and top breakdowns in one pass
#[utoipa::path(
    get,
    path = "/api/v1/dashboard/report",
    params(DashboardFilter, GranularityQuery),
    responses(
        (status = 200, description = "Full dashboard report", body = DashboardReport),
        (status = 400, description = "Invalid range"),
        (status = 404, description = "Unknown branch or manager"),
    ),
    security(("bearer_auth" = [])),
    tag = "Dashboard"
)]
pub async fn report(
    auth: AuthUser,
    State(state): State<AppState>,
    AppQuery(raw): AppQuery<DashboardFilter>,
    AppQuery(params): AppQuery<GranularityQuery>,
) -> AppResult<Json<DashboardReport>> {
    let filter = filters::resolve(&state.db, &raw, &auth).await?;
    let report = analytics::report(&state.db, &filter, params.granularity).await?;
    Ok(Json(report))
}

/// Recent audit entries, newest first
#[utoipa::path(
    get,
    path = "/api/v1/dashboard/activity",
    params(ActivityQuery),
    responses(
        (status = 200, description = "Audit entries", body = Vec<AuditLogEntry>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Dashboard"
)]
pub async fn activity(
    auth: AuthUser,
    State(state): State<AppState>,
    AppQuery(query): AppQuery<ActivityQuery>,
) -> AppResult<Json<Vec<AuditLogEntry>>> {
    let entries = audit::recent(&state.db, &auth, query.limit).await?;
    Ok(Json(entries))
}

/// Payment statistics per bucket. Only the date window applies.
#[utoipa::path(
    get,
    path = "/api/v1/orders/stats/payments",
    params(DashboardFilter, GranularityQuery),
    responses(
        (status = 200, description = "Buckets over every visible order", body = Vec<Bucket>),
        (status = 400, description = "Invalid range"),
    ),
    security(("bearer_auth" = [])),
    tag = "Dashboard"
)]
pub async fn payment_stats(
    auth: AuthUser,
    State(state): State<AppState>,
    AppQuery(raw): AppQuery<DashboardFilter>,
    AppQuery(params): AppQuery<GranularityQuery>,
) -> AppResult<Json<Vec<Bucket>>> {
    let window = DashboardFilter {
        date_from: raw.date_from,
        date_to: raw.date_to,
        ..Default::default()
    };
    let filter = filters::normalize(&window, &auth)?;
    let orders = orders::load_orders(&state.db, &filter, None).await?;

    Ok(Json(analytics::timeline(
        &filter,
        &orders,
        params.granularity,
    )))
}

/// Values the dashboard filter controls can offer
#[utoipa::path(
    get,
    path = "/api/v1/dashboard/filters",
    responses(
        (status = 200, description = "Filter options visible to the session", body = FilterOptions),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Dashboard"
)]
pub async fn filter_options(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<FilterOptions>> {
    let scope = filters::normalize(&DashboardFilter::default(), &auth)?;

    let branches = if auth.role == Role::Admin {
        sqlx::query_as::<_, Branch>("SELECT id, name, city, created_at FROM branches ORDER BY name")
            .fetch_all(&state.db)
            .await?
    } else if let Some(branch_id) = auth.branch_id {
        sqlx::query_as::<_, Branch>("SELECT id, name, city, created_at FROM branches WHERE id = $1")
            .bind(branch_id)
            .fetch_all(&state.db)
            .await?
    } else {
        Vec::new()
    };

    let mut managers = QueryBuilder::<Postgres>::new(
        "SELECT id, full_name AS name, role, branch_id FROM users WHERE is_active",
    );
    if auth.role == Role::Staff {
        managers.push(" AND id = ").push_bind(auth.id);
    } else if auth.role != Role::Admin {
        if let Some(branch_id) = auth.branch_id {
            managers.push(" AND branch_id = ").push_bind(branch_id);
        }
    }
    managers.push(" ORDER BY full_name");
    let managers = managers
        .build_query_as::<ManagerOption>()
        .fetch_all(&state.db)
        .await?;

    Ok(Json(FilterOptions {
        branches,
        managers,
        doc_types: distinct_labels(&state.db, &scope, "doc_type").await?,
        customer_types: distinct_labels(&state.db, &scope, "customer_type").await?,
    }))
}

/// Distinct non-blank values of a text column over the visible orders.
async fn distinct_labels(
    db: &PgPool,
    scope: &NormalizedFilter,
    column: &'static str,
) -> AppResult<Vec<String>> {
    let mut qb = QueryBuilder::<Postgres>::new(format!(
        "SELECT DISTINCT TRIM({column}) FROM orders WHERE deleted_at IS NULL \
         AND {column} IS NOT NULL AND TRIM({column}) <> ''"
    ));
    scope.push_conditions(&mut qb);
    qb.push(" ORDER BY 1");

    let labels = qb.build_query_scalar::<String>().fetch_all(db).await?;
    Ok(labels)
}
