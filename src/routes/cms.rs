use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{get, put},
};
use uuid::Uuid;

use crate::{
    dto::cms::{
        CreatePopupRequest, CreateTransformationRequest, PopupList, TransformationList,
        UpdatePopupRequest, UpdateTransformationRequest,
    },
    error::AppResult,
    extract::{Json, Path},
    middleware::auth::AuthUser,
    models::{HomepagePopup, Transformation},
    response::ApiResponse,
    services::cms_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/transformations",
            get(list_transformations).post(create_transformation),
        )
        .route("/transformations/all", get(list_all_transformations))
        .route(
            "/transformations/{id}",
            put(update_transformation).delete(delete_transformation),
        )
        .route("/popup", get(active_popup))
        .route("/popups", get(list_popups).post(create_popup))
        .route("/popups/{id}", put(update_popup).delete(delete_popup))
}

#[utoipa::path(
    get,
    path = "/api/cms/transformations",
    responses((status = 200, description = "Published before/after stories", body = ApiResponse<TransformationList>)),
    tag = "CMS"
)]
pub async fn list_transformations(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<TransformationList>>> {
    Ok(Json(cms_service::list_transformations(&state).await?))
}

#[utoipa::path(
    get,
    path = "/api/cms/transformations/all",
    responses(
        (status = 200, description = "All stories including drafts (admin only)", body = ApiResponse<TransformationList>),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "CMS"
)]
pub async fn list_all_transformations(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<TransformationList>>> {
    Ok(Json(cms_service::list_all_transformations(&state, &user).await?))
}

#[utoipa::path(
    post,
    path = "/api/cms/transformations",
    request_body = CreateTransformationRequest,
    responses(
        (status = 201, description = "Story created", body = ApiResponse<Transformation>),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "CMS"
)]
pub async fn create_transformation(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateTransformationRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Transformation>>)> {
    let resp = cms_service::create_transformation(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    put,
    path = "/api/cms/transformations/{id}",
    params(("id" = Uuid, Path, description = "Transformation ID")),
    request_body = UpdateTransformationRequest,
    responses(
        (status = 200, description = "Story updated", body = ApiResponse<Transformation>),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "CMS"
)]
pub async fn update_transformation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTransformationRequest>,
) -> AppResult<Json<ApiResponse<Transformation>>> {
    Ok(Json(cms_service::update_transformation(&state, &user, id, payload).await?))
}

#[utoipa::path(
    delete,
    path = "/api/cms/transformations/{id}",
    params(("id" = Uuid, Path, description = "Transformation ID")),
    responses(
        (status = 200, description = "Story deleted", body = ApiResponse<serde_json::Value>),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "CMS"
)]
pub async fn delete_transformation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    Ok(Json(cms_service::delete_transformation(&state, &user, id).await?))
}

#[utoipa::path(
    get,
    path = "/api/cms/popup",
    responses((status = 200, description = "Popup to show on the homepage now, if any", body = ApiResponse<Option<HomepagePopup>>)),
    tag = "CMS"
)]
pub async fn active_popup(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<Option<HomepagePopup>>>> {
    Ok(Json(cms_service::active_popup(&state).await?))
}

#[utoipa::path(
    get,
    path = "/api/cms/popups",
    responses(
        (status = 200, description = "All popups (admin only)", body = ApiResponse<PopupList>),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "CMS"
)]
pub async fn list_popups(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<PopupList>>> {
    Ok(Json(cms_service::list_popups(&state, &user).await?))
}

#[utoipa::path(
    post,
    path = "/api/cms/popups",
    request_body = CreatePopupRequest,
    responses(
        (status = 201, description = "Popup created", body = ApiResponse<HomepagePopup>),
        (status = 400, description = "Window ends before it starts")
    ),
    security(("bearer_auth" = [])),
    tag = "CMS"
)]
pub async fn create_popup(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreatePopupRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<HomepagePopup>>)> {
    let resp = cms_service::create_popup(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    put,
    path = "/api/cms/popups/{id}",
    params(("id" = Uuid, Path, description = "Popup ID")),
    request_body = UpdatePopupRequest,
    responses(
        (status = 200, description = "Popup updated", body = ApiResponse<HomepagePopup>),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "CMS"
)]
pub async fn update_popup(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePopupRequest>,
) -> AppResult<Json<ApiResponse<HomepagePopup>>> {
    Ok(Json(cms_service::update_popup(&state, &user, id, payload).await?))
}

#[utoipa::path(
    delete,
    path = "/api/cms/popups/{id}",
    params(("id" = Uuid, Path, description = "Popup ID")),
    responses(
        (status = 200, description = "Popup deleted", body = ApiResponse<serde_json::Value>),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "CMS"
)]
pub async fn delete_popup(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    Ok(Json(cms_service::delete_popup(&state, &user, id).await?))
}
