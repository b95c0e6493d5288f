use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::videos::{CreateVideoRequest, UpdateVideoRequest, VideoList, VideoQuery},
    error::AppResult,
    extract::{Json, Path, Query},
    middleware::auth::AuthUser,
    models::Video,
    response::ApiResponse,
    services::video_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_videos).post(create_video))
        .route("/{id}", get(get_video).put(update_video).delete(delete_video))
}

#[utoipa::path(
    get,
    path = "/api/videos",
    params(VideoQuery),
    responses((status = 200, description = "Published workout videos", body = ApiResponse<VideoList>)),
    tag = "Videos"
)]
pub async fn list_videos(
    State(state): State<AppState>,
    Query(query): Query<VideoQuery>,
) -> AppResult<Json<ApiResponse<VideoList>>> {
    Ok(Json(video_service::list_videos(&state, query).await?))
}

#[utoipa::path(
    get,
    path = "/api/videos/{id}",
    params(("id" = Uuid, Path, description = "Video ID")),
    responses(
        (status = 200, description = "Video", body = ApiResponse<Video>),
        (status = 404, description = "Not found")
    ),
    tag = "Videos"
)]
pub async fn get_video(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Video>>> {
    Ok(Json(video_service::get_video(&state, id).await?))
}

#[utoipa::path(
    post,
    path = "/api/videos",
    request_body = CreateVideoRequest,
    responses(
        (status = 201, description = "Video created", body = ApiResponse<Video>),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Videos"
)]
pub async fn create_video(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateVideoRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Video>>)> {
    let resp = video_service::create_video(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    put,
    path = "/api/videos/{id}",
    params(("id" = Uuid, Path, description = "Video ID")),
    request_body = UpdateVideoRequest,
    responses(
        (status = 200, description = "Video updated", body = ApiResponse<Video>),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Videos"
)]
pub async fn update_video(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateVideoRequest>,
) -> AppResult<Json<ApiResponse<Video>>> {
    Ok(Json(video_service::update_video(&state, &user, id, payload).await?))
}

#[utoipa::path(
    delete,
    path = "/api/videos/{id}",
    params(("id" = Uuid, Path, description = "Video ID")),
    responses(
        (status = 200, description = "Video deleted", body = ApiResponse<serde_json::Value>),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Videos"
)]
pub async fn delete_video(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    Ok(Json(video_service::delete_video(&state, &user, id).await?))
}
