use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use uuid::Uuid;

use crate::{
    audit,
    currency::Currency,
    dto::users::{AdminUpdateUserRequest, ChangePasswordRequest, UpdateProfileRequest, UserList, UserListQuery},
    entity::users::{self, Column as UserCol, Entity as Users},
    enums::Role,
    error::{AppError, AppResult, FieldError},
    middleware::auth::{AuthUser, ensure_admin},
    models::User,
    response::{ApiResponse, Meta},
    services::auth_service::{MIN_PASSWORD_LEN, hash_password, revoke_all_refresh_tokens, verify_password},
    state::AppState,
    validation::{Validator, clean_optional},
};

async fn find_user(state: &AppState, id: Uuid) -> AppResult<users::Model> {
    Users::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)
}

pub async fn get_profile(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<User>> {
    let model = find_user(state, user.user_id).await?;
    Ok(ApiResponse::success("OK", model.into(), Some(Meta::empty())))
}

pub async fn update_profile(
    state: &AppState,
    user: &AuthUser,
    payload: UpdateProfileRequest,
) -> AppResult<ApiResponse<User>> {
    let mut validator = Validator::new();
    if let Some(name) = &payload.full_name {
        validator.required(name, "full_name");
    }
    let currency = match clean_optional(payload.preferred_currency) {
        Some(code) => {
            let parsed = Currency::parse(&code);
            validator.check(parsed.is_some(), "preferred_currency", "is not a supported currency");
            parsed
        }
        None => None,
    };
    validator.finish()?;

    let model = find_user(state, user.user_id).await?;
    let mut active: users::ActiveModel = model.into();
    if let Some(name) = payload.full_name {
        active.full_name = Set(name.trim().to_string());
    }
    if payload.phone.is_some() {
        active.phone = Set(clean_optional(payload.phone));
    }
    if let Some(currency) = currency {
        active.preferred_currency = Set(Some(currency.code().to_string()));
    }
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&state.orm).await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "profile_update",
        "users",
        serde_json::json!({ "user_id": user.user_id }),
    )
    .await;

    Ok(ApiResponse::success("Profile updated", updated.into(), Some(Meta::empty())))
}

pub async fn change_password(
    state: &AppState,
    user: &AuthUser,
    payload: ChangePasswordRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    Validator::new()
        .min_len(&payload.new_password, MIN_PASSWORD_LEN, "new_password")
        .finish()?;

    let model = find_user(state, user.user_id).await?;
    if !verify_password(&model.password_hash, &payload.current_password)? {
        return Err(AppError::BadRequest("Current password is incorrect".into()));
    }

    let txn = state.orm.begin().await?;
    let mut active: users::ActiveModel = model.into();
    active.password_hash = Set(hash_password(&payload.new_password)?);
    active.updated_at = Set(Utc::now().into());
    active.update(&txn).await?;
    revoke_all_refresh_tokens(&txn, user.user_id).await?;
    txn.commit().await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "password_change",
        "users",
        serde_json::json!({ "user_id": user.user_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Password changed",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn list_users(
    state: &AppState,
    user: &AuthUser,
    query: UserListQuery,
) -> AppResult<ApiResponse<UserList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination().normalize();

    let mut condition = Condition::all();
    if let Some(role) = query.role.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        condition = condition.add(UserCol::Role.eq(role));
    }
    if let Some(q) = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let pattern = format!("%{q}%");
        condition = condition.add(
            Condition::any()
                .add(Expr::col(UserCol::Email).ilike(pattern.clone()))
                .add(Expr::col(UserCol::FullName).ilike(pattern)),
        );
    }

    let finder = Users::find()
        .filter(condition)
        .order_by_desc(UserCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(User::from)
        .collect();

    Ok(ApiResponse::success(
        "OK",
        UserList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn get_user(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<ApiResponse<User>> {
    ensure_admin(user)?;
    let model = find_user(state, id).await?;
    Ok(ApiResponse::success("OK", model.into(), Some(Meta::empty())))
}

pub async fn update_user(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: AdminUpdateUserRequest,
) -> AppResult<ApiResponse<User>> {
    ensure_admin(user)?;
    let role = match payload.role.as_deref() {
        Some(raw) => Some(Role::parse(raw).ok_or_else(|| {
            AppError::Validation(vec![FieldError::new("role", "must be user or admin")])
        })?),
        None => None,
    };
    if id == user.user_id && (role == Some(Role::User) || payload.is_active == Some(false)) {
        return Err(AppError::BadRequest("You cannot demote or deactivate yourself".into()));
    }

    let model = find_user(state, id).await?;
    let mut active: users::ActiveModel = model.into();
    if let Some(role) = role {
        active.role = Set(role.into());
    }
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&state.orm).await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "admin_update_user",
        "users",
        serde_json::json!({ "user_id": id, "role": updated.role, "is_active": updated.is_active }),
    )
    .await;

    Ok(ApiResponse::success("User updated", updated.into(), Some(Meta::empty())))
}

pub async fn delete_user(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    if id == user.user_id {
        return Err(AppError::BadRequest("You cannot delete your own account".into()));
    }

    let result = Users::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.orm,
        Some(user.user_id),
        "admin_delete_user",
        "users",
        serde_json::json!({ "user_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}
