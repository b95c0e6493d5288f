use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::programmes::{
        CreateProgrammeRequest, ProgrammeList, PurchaseList, PurchaseProgrammeRequest,
        PurchaseResponse, UpdateProgrammeRequest,
    },
    error::AppResult,
    extract::{Json, Path, Query},
    middleware::{auth::AuthUser, currency::DetectedCurrency},
    models::Programme,
    response::ApiResponse,
    routes::params::FilterQuery,
    services::programme_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_programmes).post(create_programme))
        .route("/purchases", get(list_purchases))
        .route("/purchases/me", get(my_purchases))
        .route(
            "/{id}",
            get(get_programme).put(update_programme).delete(delete_programme),
        )
        .route("/{id}/purchase", post(purchase_programme))
}

#[utoipa::path(
    get,
    path = "/api/programmes",
    responses((status = 200, description = "Active programmes", body = ApiResponse<ProgrammeList>)),
    tag = "Programmes"
)]
pub async fn list_programmes(State(state): State<AppState>) -> AppResult<Json<ApiResponse<ProgrammeList>>> {
    Ok(Json(programme_service::list_programmes(&state).await?))
}

#[utoipa::path(
    get,
    path = "/api/programmes/{id}",
    params(("id" = Uuid, Path, description = "Programme ID")),
    responses(
        (status = 200, description = "Programme", body = ApiResponse<Programme>),
        (status = 404, description = "Not found")
    ),
    tag = "Programmes"
)]
pub async fn get_programme(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Programme>>> {
    Ok(Json(programme_service::get_programme(&state, id).await?))
}

#[utoipa::path(
    post,
    path = "/api/programmes",
    request_body = CreateProgrammeRequest,
    responses(
        (status = 201, description = "Programme created", body = ApiResponse<Programme>),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Programmes"
)]
pub async fn create_programme(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateProgrammeRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Programme>>)> {
    let resp = programme_service::create_programme(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    put,
    path = "/api/programmes/{id}",
    params(("id" = Uuid, Path, description = "Programme ID")),
    request_body = UpdateProgrammeRequest,
    responses(
        (status = 200, description = "Programme updated", body = ApiResponse<Programme>),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Programmes"
)]
pub async fn update_programme(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProgrammeRequest>,
) -> AppResult<Json<ApiResponse<Programme>>> {
    Ok(Json(programme_service::update_programme(&state, &user, id, payload).await?))
}

#[utoipa::path(
    delete,
    path = "/api/programmes/{id}",
    params(("id" = Uuid, Path, description = "Programme ID")),
    responses(
        (status = 200, description = "Deleted, or deactivated when purchased", body = ApiResponse<serde_json::Value>),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Programmes"
)]
pub async fn delete_programme(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    Ok(Json(programme_service::delete_programme(&state, &user, id).await?))
}

#[utoipa::path(
    post,
    path = "/api/programmes/{id}/purchase",
    params(("id" = Uuid, Path, description = "Programme ID")),
    request_body = PurchaseProgrammeRequest,
    responses(
        (status = 201, description = "Pending purchase; follow payment.checkout_url", body = ApiResponse<PurchaseResponse>),
        (status = 404, description = "Programme not found"),
        (status = 409, description = "Already owned"),
        (status = 502, description = "Payment provider failed")
    ),
    security(("bearer_auth" = [])),
    tag = "Programmes"
)]
pub async fn purchase_programme(
    State(state): State<AppState>,
    user: AuthUser,
    currency: DetectedCurrency,
    Path(id): Path<Uuid>,
    Json(payload): Json<PurchaseProgrammeRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<PurchaseResponse>>)> {
    let resp = programme_service::purchase_programme(&state, &user, currency, id, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    get,
    path = "/api/programmes/purchases/me",
    responses((status = 200, description = "Own programme purchases", body = ApiResponse<PurchaseList>)),
    security(("bearer_auth" = [])),
    tag = "Programmes"
)]
pub async fn my_purchases(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<PurchaseList>>> {
    Ok(Json(programme_service::my_purchases(&state, &user).await?))
}

#[utoipa::path(
    get,
    path = "/api/programmes/purchases",
    params(FilterQuery),
    responses(
        (status = 200, description = "All purchases (admin only)", body = ApiResponse<PurchaseList>),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Programmes"
)]
pub async fn list_purchases(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<FilterQuery>,
) -> AppResult<Json<ApiResponse<PurchaseList>>> {
    Ok(Json(programme_service::list_purchases(&state, &user, query).await?))
}
