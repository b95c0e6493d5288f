use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::notifications::{
        MarkAllReadResult, NotificationList, NotificationQuery, SendNotificationRequest,
        SendNotificationResult,
    },
    error::AppResult,
    extract::{Json, Path, Query},
    middleware::auth::AuthUser,
    models::Notification,
    response::ApiResponse,
    services::notification_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notifications).post(send_notification))
        .route("/read-all", post(mark_all_read))
        .route("/{id}/read", post(mark_read))
}

#[utoipa::path(
    get,
    path = "/api/notifications",
    params(NotificationQuery),
    responses((status = 200, description = "Own notifications with unread count", body = ApiResponse<NotificationList>)),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<NotificationQuery>,
) -> AppResult<Json<ApiResponse<NotificationList>>> {
    Ok(Json(notification_service::list_notifications(&state, &user, query).await?))
}

#[utoipa::path(
    post,
    path = "/api/notifications/{id}/read",
    params(("id" = Uuid, Path, description = "Notification ID")),
    responses(
        (status = 200, description = "Marked read", body = ApiResponse<Notification>),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Notification>>> {
    Ok(Json(notification_service::mark_read(&state, &user, id).await?))
}

#[utoipa::path(
    post,
    path = "/api/notifications/read-all",
    responses((status = 200, description = "All marked read", body = ApiResponse<MarkAllReadResult>)),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn mark_all_read(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<MarkAllReadResult>>> {
    Ok(Json(notification_service::mark_all_read(&state, &user).await?))
}

#[utoipa::path(
    post,
    path = "/api/notifications",
    request_body = SendNotificationRequest,
    responses(
        (status = 201, description = "Notification sent (admin only)", body = ApiResponse<SendNotificationResult>),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Target user not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn send_notification(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<SendNotificationRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<SendNotificationResult>>)> {
    let resp = notification_service::send_notification(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}
