use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use uuid::Uuid;

use crate::{
    audit,
    dto::leads::{CreateLeadRequest, LeadList, UpdateLeadStatusRequest},
    entity::leads::{self, Column, Entity as Leads},
    enums::LeadStatus,
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Lead,
    response::{ApiResponse, Meta},
    routes::params::FilterQuery,
    state::AppState,
    validation::{Validator, clean_optional, normalize_email},
};

/// Public contact / trial form.
pub async fn create_lead(state: &AppState, payload: CreateLeadRequest) -> AppResult<ApiResponse<Lead>> {
    Validator::new()
        .required(&payload.name, "name")
        .email(&payload.email, "email")
        .finish()?;

    let now = Utc::now();
    let lead = leads::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name.trim().to_string()),
        email: Set(normalize_email(&payload.email)),
        phone: Set(clean_optional(payload.phone)),
        source: Set(clean_optional(payload.source)),
        message: Set(clean_optional(payload.message)),
        status: Set(LeadStatus::New.into()),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&state.orm)
    .await?;

    tracing::info!(lead_id = %lead.id, source = ?lead.source, "lead captured");
    Ok(ApiResponse::success("Thanks, we will be in touch", lead.into(), Some(Meta::empty())))
}

pub async fn list_leads(
    state: &AppState,
    user: &AuthUser,
    query: FilterQuery,
) -> AppResult<ApiResponse<LeadList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all();
    if let Some(status) = query.status() {
        condition = condition.add(Column::Status.eq(status));
    }
    if let Some(search) = query.search() {
        let pattern = format!("%{}%", search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(Column::Name).ilike(pattern.clone()))
                .add(Expr::col(Column::Email).ilike(pattern.clone()))
                .add(Expr::col(Column::Phone).ilike(pattern)),
        );
    }

    let finder = Leads::find()
        .filter(condition)
        .order_by_desc(Column::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Lead::from)
        .collect();

    Ok(ApiResponse::success(
        "Leads",
        LeadList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn update_lead_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateLeadStatusRequest,
) -> AppResult<ApiResponse<Lead>> {
    ensure_admin(user)?;
    let status = LeadStatus::parse(&payload.status)
        .ok_or_else(|| AppError::BadRequest("Invalid lead status".into()))?;

    let existing = Leads::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let mut active: leads::ActiveModel = existing.into();
    active.status = Set(status.into());
    active.updated_at = Set(Utc::now().into());
    let lead = active.update(&state.orm).await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "lead_status_update",
        "leads",
        serde_json::json!({ "lead_id": id, "status": lead.status }),
    )
    .await;

    Ok(ApiResponse::success("Lead updated", lead.into(), Some(Meta::empty())))
}

pub async fn delete_lead(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = Leads::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.orm,
        Some(user.user_id),
        "lead_delete",
        "leads",
        serde_json::json!({ "lead_id": id }),
    )
    .await;

    Ok(ApiResponse::success("Deleted", serde_json::json!({}), Some(Meta::empty())))
}
