use std::collections::HashMap;

use axum::{
    Router,
    extract::State,
    http::HeaderMap,
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::payments::{PaymentList, PaymentListQuery, WebhookAck},
    enums::PaymentProvider,
    error::AppResult,
    extract::{Json, Path, Query},
    middleware::auth::AuthUser,
    models::Payment,
    response::ApiResponse,
    services::payment_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_payments))
        .route("/me", get(list_my_payments))
        .route("/{id}", get(get_payment))
        .route("/{id}/refund", post(refund_payment))
        .route("/webhooks/paymob", post(paymob_webhook))
        .route("/webhooks/tabby", post(tabby_webhook))
}

#[utoipa::path(
    get,
    path = "/api/payments/me",
    params(PaymentListQuery),
    responses((status = 200, description = "Own payments", body = ApiResponse<PaymentList>)),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn list_my_payments(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<PaymentListQuery>,
) -> AppResult<Json<ApiResponse<PaymentList>>> {
    Ok(Json(payment_service::list_my_payments(&state, &user, query).await?))
}

#[utoipa::path(
    get,
    path = "/api/payments/{id}",
    params(("id" = Uuid, Path, description = "Payment ID")),
    responses(
        (status = 200, description = "Payment", body = ApiResponse<Payment>),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn get_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    Ok(Json(payment_service::get_payment(&state, &user, id).await?))
}

#[utoipa::path(
    get,
    path = "/api/payments",
    params(PaymentListQuery),
    responses(
        (status = 200, description = "All payments (admin only)", body = ApiResponse<PaymentList>),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn list_payments(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<PaymentListQuery>,
) -> AppResult<Json<ApiResponse<PaymentList>>> {
    Ok(Json(payment_service::list_payments(&state, &user, query).await?))
}

#[utoipa::path(
    post,
    path = "/api/payments/{id}/refund",
    params(("id" = Uuid, Path, description = "Payment ID")),
    responses(
        (status = 200, description = "Payment marked refunded", body = ApiResponse<Payment>),
        (status = 400, description = "Payment is not paid"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn refund_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    Ok(Json(payment_service::refund_payment(&state, &user, id).await?))
}

#[utoipa::path(
    post,
    path = "/api/payments/webhooks/paymob",
    params(("hmac" = String, Query, description = "HMAC-SHA512 of the transaction fields")),
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Callback applied", body = ApiResponse<WebhookAck>),
        (status = 401, description = "Signature mismatch")
    ),
    tag = "Payments"
)]
pub async fn paymob_webhook(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> AppResult<Json<ApiResponse<WebhookAck>>> {
    let resp =
        payment_service::handle_webhook(&state, PaymentProvider::Paymob, query, headers, body).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/payments/webhooks/tabby",
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Callback applied", body = ApiResponse<WebhookAck>),
        (status = 401, description = "Missing or wrong webhook header")
    ),
    tag = "Payments"
)]
pub async fn tabby_webhook(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> AppResult<Json<ApiResponse<WebhookAck>>> {
    let resp =
        payment_service::handle_webhook(&state, PaymentProvider::Tabby, query, headers, body).await?;
    Ok(Json(resp))
}
