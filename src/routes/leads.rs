use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{delete, get, patch},
};
use uuid::Uuid;

use crate::{
    dto::leads::{CreateLeadRequest, LeadList, UpdateLeadStatusRequest},
    error::AppResult,
    extract::{Json, Path, Query},
    middleware::auth::AuthUser,
    models::Lead,
    response::ApiResponse,
    routes::params::FilterQuery,
    services::lead_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_leads).post(create_lead))
        .route("/{id}/status", patch(update_lead_status))
        .route("/{id}", delete(delete_lead))
}

#[utoipa::path(
    post,
    path = "/api/leads",
    request_body = CreateLeadRequest,
    responses(
        (status = 201, description = "Contact request received", body = ApiResponse<Lead>),
        (status = 400, description = "Validation failed")
    ),
    tag = "Leads"
)]
pub async fn create_lead(
    State(state): State<AppState>,
    Json(payload): Json<CreateLeadRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Lead>>)> {
    let resp = lead_service::create_lead(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    get,
    path = "/api/leads",
    params(FilterQuery),
    responses(
        (status = 200, description = "Leads (admin only)", body = ApiResponse<LeadList>),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Leads"
)]
pub async fn list_leads(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<FilterQuery>,
) -> AppResult<Json<ApiResponse<LeadList>>> {
    Ok(Json(lead_service::list_leads(&state, &user, query).await?))
}

#[utoipa::path(
    patch,
    path = "/api/leads/{id}/status",
    params(("id" = Uuid, Path, description = "Lead ID")),
    request_body = UpdateLeadStatusRequest,
    responses(
        (status = 200, description = "Lead status updated", body = ApiResponse<Lead>),
        (status = 400, description = "Unknown status"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Leads"
)]
pub async fn update_lead_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLeadStatusRequest>,
) -> AppResult<Json<ApiResponse<Lead>>> {
    Ok(Json(lead_service::update_lead_status(&state, &user, id, payload).await?))
}

#[utoipa::path(
    delete,
    path = "/api/leads/{id}",
    params(("id" = Uuid, Path, description = "Lead ID")),
    responses(
        (status = 200, description = "Lead deleted", body = ApiResponse<serde_json::Value>),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Leads"
)]
pub async fn delete_lead(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    Ok(Json(lead_service::delete_lead(&state, &user, id).await?))
}
