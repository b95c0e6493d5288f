//! Marketing content: before/after transformations and the homepage popup.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::cms::{
        CreatePopupRequest, CreateTransformationRequest, PopupList, TransformationList,
        UpdatePopupRequest, UpdateTransformationRequest,
    },
    entity::{
        homepage_popups::{self, Column as PopupCol, Entity as Popups},
        transformations::{self, Column as TransformationCol, Entity as Transformations},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{HomepagePopup, Transformation},
    response::{ApiResponse, Meta},
    state::AppState,
    validation::{Validator, clean_optional},
};

pub async fn list_transformations(state: &AppState) -> AppResult<ApiResponse<TransformationList>> {
    let items = Transformations::find()
        .filter(TransformationCol::IsPublished.eq(true))
        .order_by_asc(TransformationCol::DisplayOrder)
        .order_by_desc(TransformationCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Transformation::from)
        .collect();
    Ok(ApiResponse::success("Transformations", TransformationList { items }, None))
}

/// Admin view including unpublished items.
pub async fn list_all_transformations(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<TransformationList>> {
    ensure_admin(user)?;
    let items = Transformations::find()
        .order_by_asc(TransformationCol::DisplayOrder)
        .order_by_desc(TransformationCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Transformation::from)
        .collect();
    Ok(ApiResponse::success("Transformations", TransformationList { items }, None))
}

pub async fn create_transformation(
    state: &AppState,
    user: &AuthUser,
    payload: CreateTransformationRequest,
) -> AppResult<ApiResponse<Transformation>> {
    ensure_admin(user)?;
    Validator::new()
        .required(&payload.title, "title")
        .url(payload.before_image_url.trim(), "before_image_url")
        .url(payload.after_image_url.trim(), "after_image_url")
        .finish()?;

    let item = transformations::ActiveModel {
        id: Set(Uuid::new_v4()),
        title: Set(payload.title.trim().to_string()),
        description: Set(clean_optional(payload.description)),
        before_image_url: Set(payload.before_image_url.trim().to_string()),
        after_image_url: Set(payload.after_image_url.trim().to_string()),
        is_published: Set(payload.is_published.unwrap_or(true)),
        display_order: Set(payload.display_order.unwrap_or(0)),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "transformation_create",
        "transformations",
        serde_json::json!({ "transformation_id": item.id }),
    )
    .await;

    Ok(ApiResponse::success("Transformation created", item.into(), Some(Meta::empty())))
}

pub async fn update_transformation(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateTransformationRequest,
) -> AppResult<ApiResponse<Transformation>> {
    ensure_admin(user)?;
    let mut validator = Validator::new();
    if let Some(title) = payload.title.as_deref() {
        validator.required(title, "title");
    }
    if let Some(url) = payload.before_image_url.as_deref() {
        validator.url(url.trim(), "before_image_url");
    }
    if let Some(url) = payload.after_image_url.as_deref() {
        validator.url(url.trim(), "after_image_url");
    }
    validator.finish()?;

    let existing = Transformations::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: transformations::ActiveModel = existing.into();
    if let Some(title) = payload.title {
        active.title = Set(title.trim().to_string());
    }
    if payload.description.is_some() {
        active.description = Set(clean_optional(payload.description));
    }
    if let Some(url) = payload.before_image_url {
        active.before_image_url = Set(url.trim().to_string());
    }
    if let Some(url) = payload.after_image_url {
        active.after_image_url = Set(url.trim().to_string());
    }
    if let Some(published) = payload.is_published {
        active.is_published = Set(published);
    }
    if let Some(order) = payload.display_order {
        active.display_order = Set(order);
    }
    let item = active.update(&state.orm).await?;

    Ok(ApiResponse::success("Transformation updated", item.into(), Some(Meta::empty())))
}

pub async fn delete_transformation(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = Transformations::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.orm,
        Some(user.user_id),
        "transformation_delete",
        "transformations",
        serde_json::json!({ "transformation_id": id }),
    )
    .await;

    Ok(ApiResponse::success("Deleted", serde_json::json!({}), Some(Meta::empty())))
}

fn validate_window(starts_at: Option<DateTime<Utc>>, ends_at: Option<DateTime<Utc>>) -> AppResult<()> {
    match (starts_at, ends_at) {
        (Some(start), Some(end)) if end <= start => Err(AppError::BadRequest(
            "ends_at must be after starts_at".into(),
        )),
        _ => Ok(()),
    }
}

/// The popup to show right now: active, inside its window, newest first.
pub async fn active_popup(state: &AppState) -> AppResult<ApiResponse<Option<HomepagePopup>>> {
    let now = Utc::now();
    let popup = Popups::find()
        .filter(PopupCol::IsActive.eq(true))
        .filter(
            Condition::any()
                .add(PopupCol::StartsAt.is_null())
                .add(PopupCol::StartsAt.lte(now)),
        )
        .filter(
            Condition::any()
                .add(PopupCol::EndsAt.is_null())
                .add(PopupCol::EndsAt.gt(now)),
        )
        .order_by_desc(PopupCol::CreatedAt)
        .one(&state.orm)
        .await?
        .map(HomepagePopup::from);
    Ok(ApiResponse::success("Popup", popup, None))
}

pub async fn list_popups(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<PopupList>> {
    ensure_admin(user)?;
    let items = Popups::find()
        .order_by_desc(PopupCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(HomepagePopup::from)
        .collect();
    Ok(ApiResponse::success("Popups", PopupList { items }, None))
}

pub async fn create_popup(
    state: &AppState,
    user: &AuthUser,
    payload: CreatePopupRequest,
) -> AppResult<ApiResponse<HomepagePopup>> {
    ensure_admin(user)?;
    Validator::new().required(&payload.title, "title").finish()?;
    validate_window(payload.starts_at, payload.ends_at)?;

    let popup = homepage_popups::ActiveModel {
        id: Set(Uuid::new_v4()),
        title: Set(payload.title.trim().to_string()),
        body: Set(clean_optional(payload.body)),
        image_url: Set(clean_optional(payload.image_url)),
        cta_label: Set(clean_optional(payload.cta_label)),
        cta_url: Set(clean_optional(payload.cta_url)),
        is_active: Set(payload.is_active.unwrap_or(true)),
        starts_at: Set(payload.starts_at.map(Into::into)),
        ends_at: Set(payload.ends_at.map(Into::into)),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "popup_create",
        "homepage_popups",
        serde_json::json!({ "popup_id": popup.id }),
    )
    .await;

    Ok(ApiResponse::success("Popup created", popup.into(), Some(Meta::empty())))
}

pub async fn update_popup(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdatePopupRequest,
) -> AppResult<ApiResponse<HomepagePopup>> {
    ensure_admin(user)?;
    if let Some(title) = payload.title.as_deref() {
        Validator::new().required(title, "title").finish()?;
    }

    let existing = Popups::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let starts_at = payload
        .starts_at
        .or(existing.starts_at.map(|s| s.with_timezone(&Utc)));
    let ends_at = payload
        .ends_at
        .or(existing.ends_at.map(|e| e.with_timezone(&Utc)));
    validate_window(starts_at, ends_at)?;

    let mut active: homepage_popups::ActiveModel = existing.into();
    if let Some(title) = payload.title {
        active.title = Set(title.trim().to_string());
    }
    if payload.body.is_some() {
        active.body = Set(clean_optional(payload.body));
    }
    if payload.image_url.is_some() {
        active.image_url = Set(clean_optional(payload.image_url));
    }
    if payload.cta_label.is_some() {
        active.cta_label = Set(clean_optional(payload.cta_label));
    }
    if payload.cta_url.is_some() {
        active.cta_url = Set(clean_optional(payload.cta_url));
    }
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }
    if let Some(start) = payload.starts_at {
        active.starts_at = Set(Some(start.into()));
    }
    if let Some(end) = payload.ends_at {
        active.ends_at = Set(Some(end.into()));
    }
    let popup = active.update(&state.orm).await?;

    Ok(ApiResponse::success("Popup updated", popup.into(), Some(Meta::empty())))
}

pub async fn delete_popup(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = Popups::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.orm,
        Some(user.user_id),
        "popup_delete",
        "homepage_popups",
        serde_json::json!({ "popup_id": id }),
    )
    .await;

    Ok(ApiResponse::success("Deleted", serde_json::json!({}), Some(Meta::empty())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn window_must_end_after_it_starts() {
        let now = Utc::now();
        assert!(validate_window(None, None).is_ok());
        assert!(validate_window(Some(now), None).is_ok());
        assert!(validate_window(Some(now), Some(now + Duration::hours(1))).is_ok());
        assert!(matches!(
            validate_window(Some(now), Some(now)),
            Err(AppError::BadRequest(_))
        ));
    }
}
