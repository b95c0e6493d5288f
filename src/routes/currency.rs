use axum::Json;

use crate::{
    middleware::currency::DetectedCurrency,
    response::{ApiResponse, Meta},
};

#[utoipa::path(
    get,
    path = "/api/currency",
    responses((status = 200, description = "Currency prices and charges will use for this request", body = ApiResponse<DetectedCurrency>)),
    tag = "Currency"
)]
pub async fn detect_currency(currency: DetectedCurrency) -> Json<ApiResponse<DetectedCurrency>> {
    Json(ApiResponse::success("Currency", currency, Some(Meta::empty())))
}
