use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
};
use uuid::Uuid;

use crate::{
    dto::subscriptions::{
        CreatePlanRequest, PlanList, SubscribeRequest, SubscribeResponse, SubscriptionList,
        UpdatePlanRequest,
    },
    error::AppResult,
    extract::{Json, Path, Query},
    middleware::{auth::AuthUser, currency::DetectedCurrency},
    models::{Subscription, SubscriptionPlan},
    response::ApiResponse,
    routes::params::FilterQuery,
    services::subscription_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/plans", get(list_plans).post(create_plan))
        .route("/plans/{id}", put(update_plan).delete(delete_plan))
        .route("/", get(list_subscriptions).post(subscribe))
        .route("/me", get(my_subscriptions))
        .route("/{id}/cancel", post(cancel_subscription))
}

#[utoipa::path(
    get,
    path = "/api/subscriptions/plans",
    responses((status = 200, description = "Active membership plans", body = ApiResponse<PlanList>)),
    tag = "Subscriptions"
)]
pub async fn list_plans(State(state): State<AppState>) -> AppResult<Json<ApiResponse<PlanList>>> {
    Ok(Json(subscription_service::list_plans(&state).await?))
}

#[utoipa::path(
    post,
    path = "/api/subscriptions/plans",
    request_body = CreatePlanRequest,
    responses(
        (status = 201, description = "Plan created", body = ApiResponse<SubscriptionPlan>),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Subscriptions"
)]
pub async fn create_plan(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreatePlanRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<SubscriptionPlan>>)> {
    let resp = subscription_service::create_plan(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    put,
    path = "/api/subscriptions/plans/{id}",
    params(("id" = Uuid, Path, description = "Plan ID")),
    request_body = UpdatePlanRequest,
    responses(
        (status = 200, description = "Plan updated", body = ApiResponse<SubscriptionPlan>),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Subscriptions"
)]
pub async fn update_plan(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePlanRequest>,
) -> AppResult<Json<ApiResponse<SubscriptionPlan>>> {
    Ok(Json(subscription_service::update_plan(&state, &user, id, payload).await?))
}

#[utoipa::path(
    delete,
    path = "/api/subscriptions/plans/{id}",
    params(("id" = Uuid, Path, description = "Plan ID")),
    responses(
        (status = 200, description = "Deleted, or deactivated when subscribed to", body = ApiResponse<serde_json::Value>),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Subscriptions"
)]
pub async fn delete_plan(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    Ok(Json(subscription_service::delete_plan(&state, &user, id).await?))
}

#[utoipa::path(
    post,
    path = "/api/subscriptions",
    request_body = SubscribeRequest,
    responses(
        (status = 201, description = "Pending subscription; follow payment.checkout_url", body = ApiResponse<SubscribeResponse>),
        (status = 400, description = "Coupon, provider or currency problem"),
        (status = 404, description = "Plan not found"),
        (status = 502, description = "Payment provider failed")
    ),
    security(("bearer_auth" = [])),
    tag = "Subscriptions"
)]
pub async fn subscribe(
    State(state): State<AppState>,
    user: AuthUser,
    currency: DetectedCurrency,
    Json(payload): Json<SubscribeRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<SubscribeResponse>>)> {
    let resp = subscription_service::subscribe(&state, &user, currency, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    get,
    path = "/api/subscriptions/me",
    responses((status = 200, description = "Own subscriptions", body = ApiResponse<SubscriptionList>)),
    security(("bearer_auth" = [])),
    tag = "Subscriptions"
)]
pub async fn my_subscriptions(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<SubscriptionList>>> {
    Ok(Json(subscription_service::my_subscriptions(&state, &user).await?))
}

#[utoipa::path(
    post,
    path = "/api/subscriptions/{id}/cancel",
    params(("id" = Uuid, Path, description = "Subscription ID")),
    responses(
        (status = 200, description = "Subscription cancelled", body = ApiResponse<Subscription>),
        (status = 400, description = "Already cancelled or expired"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Subscriptions"
)]
pub async fn cancel_subscription(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Subscription>>> {
    Ok(Json(subscription_service::cancel_subscription(&state, &user, id).await?))
}

#[utoipa::path(
    get,
    path = "/api/subscriptions",
    params(FilterQuery),
    responses(
        (status = 200, description = "All subscriptions (admin only)", body = ApiResponse<SubscriptionList>),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Subscriptions"
)]
pub async fn list_subscriptions(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<FilterQuery>,
) -> AppResult<Json<ApiResponse<SubscriptionList>>> {
    Ok(Json(subscription_service::list_subscriptions(&state, &user, query).await?))
}
