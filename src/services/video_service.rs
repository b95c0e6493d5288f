use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::videos::{CreateVideoRequest, UpdateVideoRequest, VideoList, VideoQuery},
    entity::videos::{self, Column, Entity as Videos},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Video,
    response::{ApiResponse, Meta},
    state::AppState,
    validation::{Validator, clean_optional},
};

pub async fn list_videos(state: &AppState, query: VideoQuery) -> AppResult<ApiResponse<VideoList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all().add(Column::IsPublished.eq(true));
    if let Some(category) = query.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        condition = condition.add(Column::Category.eq(category));
    }

    let finder = Videos::find()
        .filter(condition)
        .order_by_asc(Column::DisplayOrder)
        .order_by_desc(Column::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Video::from)
        .collect();

    Ok(ApiResponse::success(
        "Videos",
        VideoList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn get_video(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Video>> {
    let video = Videos::find_by_id(id)
        .filter(Column::IsPublished.eq(true))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success("Video", video.into(), None))
}

pub async fn create_video(
    state: &AppState,
    user: &AuthUser,
    payload: CreateVideoRequest,
) -> AppResult<ApiResponse<Video>> {
    ensure_admin(user)?;
    Validator::new()
        .required(&payload.title, "title")
        .url(payload.url.trim(), "url")
        .finish()?;

    let video = videos::ActiveModel {
        id: Set(Uuid::new_v4()),
        title: Set(payload.title.trim().to_string()),
        description: Set(clean_optional(payload.description)),
        url: Set(payload.url.trim().to_string()),
        thumbnail_url: Set(clean_optional(payload.thumbnail_url)),
        category: Set(clean_optional(payload.category)),
        is_published: Set(payload.is_published.unwrap_or(true)),
        display_order: Set(payload.display_order.unwrap_or(0)),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "video_create",
        "videos",
        serde_json::json!({ "video_id": video.id }),
    )
    .await;

    Ok(ApiResponse::success("Video created", video.into(), Some(Meta::empty())))
}

pub async fn update_video(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateVideoRequest,
) -> AppResult<ApiResponse<Video>> {
    ensure_admin(user)?;
    let mut validator = Validator::new();
    if let Some(title) = payload.title.as_deref() {
        validator.required(title, "title");
    }
    if let Some(url) = payload.url.as_deref() {
        validator.url(url.trim(), "url");
    }
    validator.finish()?;

    let existing = Videos::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: videos::ActiveModel = existing.into();
    if let Some(title) = payload.title {
        active.title = Set(title.trim().to_string());
    }
    if payload.description.is_some() {
        active.description = Set(clean_optional(payload.description));
    }
    if let Some(url) = payload.url {
        active.url = Set(url.trim().to_string());
    }
    if payload.thumbnail_url.is_some() {
        active.thumbnail_url = Set(clean_optional(payload.thumbnail_url));
    }
    if payload.category.is_some() {
        active.category = Set(clean_optional(payload.category));
    }
    if let Some(published) = payload.is_published {
        active.is_published = Set(published);
    }
    if let Some(order) = payload.display_order {
        active.display_order = Set(order);
    }
    let video = active.update(&state.orm).await?;

    Ok(ApiResponse::success("Video updated", video.into(), Some(Meta::empty())))
}

pub async fn delete_video(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = Videos::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.orm,
        Some(user.user_id),
        "video_delete",
        "videos",
        serde_json::json!({ "video_id": id }),
    )
    .await;

    Ok(ApiResponse::success("Deleted", serde_json::json!({}), Some(Meta::empty())))
}
