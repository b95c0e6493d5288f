use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait, sea_query::{Expr, LockType},
};
use uuid::Uuid;

use crate::{
    audit,
    dto::programmes::{
        CreateProgrammeRequest, ProgrammeList, PurchaseList, PurchaseProgrammeRequest,
        PurchaseResponse, UpdateProgrammeRequest,
    },
    entity::{
        programme_purchases::{self, Column as PurchaseCol, Entity as Purchases},
        programmes::{self, Column as ProgrammeCol, Entity as Programmes},
    },
    enums::{CouponScope, PaymentPurpose, PurchaseStatus},
    error::{AppError, AppResult},
    middleware::{
        auth::{AuthUser, ensure_admin},
        currency::DetectedCurrency,
    },
    models::{Programme, ProgrammePurchase},
    response::{ApiResponse, Meta},
    routes::params::FilterQuery,
    services::{
        coupon_service,
        payment_service::{self, BaseLineItem, NewPayment},
    },
    state::AppState,
    validation::{Validator, clean_optional},
};

const DEFAULT_DURATION_WEEKS: i32 = 4;

pub async fn list_programmes(state: &AppState) -> AppResult<ApiResponse<ProgrammeList>> {
    let items = Programmes::find()
        .filter(ProgrammeCol::IsActive.eq(true))
        .order_by_asc(ProgrammeCol::Title)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Programme::from)
        .collect();
    Ok(ApiResponse::success("Programmes", ProgrammeList { items }, None))
}

pub async fn get_programme(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Programme>> {
    let programme = Programmes::find_by_id(id)
        .filter(ProgrammeCol::IsActive.eq(true))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success("Programme", programme.into(), None))
}

fn validate_programme(title: Option<&str>, price: Option<i64>, weeks: Option<i32>) -> AppResult<()> {
    let mut validator = Validator::new();
    if let Some(title) = title {
        validator.required(title, "title");
    }
    if let Some(price) = price {
        validator.non_negative(price, "price");
    }
    if let Some(weeks) = weeks {
        validator.positive(weeks as i64, "duration_weeks");
    }
    validator.finish()
}

pub async fn create_programme(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProgrammeRequest,
) -> AppResult<ApiResponse<Programme>> {
    ensure_admin(user)?;
    validate_programme(Some(&payload.title), Some(payload.price), payload.duration_weeks)?;

    let programme = programmes::ActiveModel {
        id: Set(Uuid::new_v4()),
        title: Set(payload.title.trim().to_string()),
        description: Set(clean_optional(payload.description)),
        price: Set(payload.price),
        duration_weeks: Set(payload.duration_weeks.unwrap_or(DEFAULT_DURATION_WEEKS)),
        is_active: Set(payload.is_active.unwrap_or(true)),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "programme_create",
        "programmes",
        serde_json::json!({ "programme_id": programme.id }),
    )
    .await;

    Ok(ApiResponse::success("Programme created", programme.into(), Some(Meta::empty())))
}

pub async fn update_programme(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateProgrammeRequest,
) -> AppResult<ApiResponse<Programme>> {
    ensure_admin(user)?;
    validate_programme(payload.title.as_deref(), payload.price, payload.duration_weeks)?;

    let existing = Programmes::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: programmes::ActiveModel = existing.into();
    if let Some(title) = payload.title {
        active.title = Set(title.trim().to_string());
    }
    if payload.description.is_some() {
        active.description = Set(clean_optional(payload.description));
    }
    if let Some(price) = payload.price {
        active.price = Set(price);
    }
    if let Some(weeks) = payload.duration_weeks {
        active.duration_weeks = Set(weeks);
    }
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }
    let programme = active.update(&state.orm).await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "programme_update",
        "programmes",
        serde_json::json!({ "programme_id": programme.id }),
    )
    .await;

    Ok(ApiResponse::success("Programme updated", programme.into(), Some(Meta::empty())))
}

/// Purchased programmes are deactivated instead of deleted.
pub async fn delete_programme(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let referenced = Purchases::find()
        .filter(PurchaseCol::ProgrammeId.eq(id))
        .count(&state.orm)
        .await?
        > 0;

    let affected = if referenced {
        Programmes::update_many()
            .col_expr(ProgrammeCol::IsActive, Expr::value(false))
            .filter(ProgrammeCol::Id.eq(id))
            .exec(&state.orm)
            .await?
            .rows_affected
    } else {
        Programmes::delete_by_id(id).exec(&state.orm).await?.rows_affected
    };
    if affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.orm,
        Some(user.user_id),
        "programme_delete",
        "programmes",
        serde_json::json!({ "programme_id": id, "deactivated": referenced }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({ "deactivated": referenced }),
        Some(Meta::empty()),
    ))
}

pub async fn purchase_programme(
    state: &AppState,
    user: &AuthUser,
    currency: DetectedCurrency,
    id: Uuid,
    payload: PurchaseProgrammeRequest,
) -> AppResult<ApiResponse<PurchaseResponse>> {
    let gateway = payment_service::gateway_for(state, payload.provider, currency.currency)?;

    let txn = state.orm.begin().await?;
    let programme = Programmes::find_by_id(id)
        .filter(ProgrammeCol::IsActive.eq(true))
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let owned = Purchases::find()
        .filter(PurchaseCol::UserId.eq(user.user_id))
        .filter(PurchaseCol::ProgrammeId.eq(id))
        .filter(PurchaseCol::Status.eq(PurchaseStatus::Active.as_str()))
        .count(&txn)
        .await?;
    if owned > 0 {
        return Err(AppError::Conflict("You already own this programme".into()));
    }

    let (coupon_id, discount_amount) = match payload
        .coupon_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
    {
        Some(code) => {
            let (coupon, discount) = coupon_service::reserve_coupon(
                &txn,
                user.user_id,
                code,
                CouponScope::Programme,
                programme.price,
            )
            .await?;
            (Some(coupon.id), discount)
        }
        None => (None, 0),
    };
    let total = programme.price - discount_amount;
    let amount = payment_service::charge_amount(&state.config.currency.rates, total, currency.currency)?;

    let now = Utc::now();
    let purchase = programme_purchases::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        programme_id: Set(programme.id),
        status: Set(PurchaseStatus::Pending.into()),
        price_paid: Set(total),
        payment_id: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&txn)
    .await?;

    let payment = payment_service::create_pending_payment(
        &txn,
        NewPayment {
            user_id: user.user_id,
            provider: payload.provider,
            purpose: PaymentPurpose::Programme,
            reference_id: purchase.id,
            currency: currency.currency,
            amount,
            base_amount: total,
            discount_amount,
            coupon_id,
        },
    )
    .await?;

    let mut active: programme_purchases::ActiveModel = purchase.into();
    active.payment_id = Set(Some(payment.id));
    let purchase = active.update(&txn).await?;
    txn.commit().await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "programme_purchase",
        "programme_purchases",
        serde_json::json!({ "purchase_id": purchase.id, "programme_id": programme.id, "payment_id": payment.id }),
    )
    .await;

    let payment = payment_service::open_checkout(
        state,
        gateway.as_ref(),
        payment,
        &programme.title,
        &[BaseLineItem {
            name: programme.title.clone(),
            quantity: 1,
            unit_price: programme.price,
        }],
    )
    .await?;

    Ok(ApiResponse::success(
        "Checkout started",
        PurchaseResponse {
            purchase: purchase.into(),
            payment: payment.into(),
        },
        Some(Meta::empty()),
    ))
}

pub async fn my_purchases(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<PurchaseList>> {
    let items = Purchases::find()
        .filter(PurchaseCol::UserId.eq(user.user_id))
        .order_by_desc(PurchaseCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(ProgrammePurchase::from)
        .collect();
    Ok(ApiResponse::success("Purchases", PurchaseList { items }, None))
}

pub async fn list_purchases(
    state: &AppState,
    user: &AuthUser,
    query: FilterQuery,
) -> AppResult<ApiResponse<PurchaseList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all();
    if let Some(status) = query.status() {
        condition = condition.add(PurchaseCol::Status.eq(status));
    }

    let finder = Purchases::find()
        .filter(condition)
        .order_by_desc(PurchaseCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(ProgrammePurchase::from)
        .collect();

    Ok(ApiResponse::success(
        "Purchases",
        PurchaseList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

async fn transition<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
    from: PurchaseStatus,
    to: PurchaseStatus,
) -> AppResult<bool> {
    let Some(purchase) = Purchases::find_by_id(id)
        .lock(LockType::Update)
        .one(conn)
        .await?
    else {
        tracing::warn!(purchase_id = %id, "payment references a missing programme purchase");
        return Ok(false);
    };
    if purchase.status != from.as_str() {
        return Ok(false);
    }
    let mut active: programme_purchases::ActiveModel = purchase.into();
    active.status = Set(to.into());
    active.updated_at = Set(Utc::now().into());
    active.update(conn).await?;
    Ok(true)
}

pub async fn activate_purchase<C: ConnectionTrait>(conn: &C, id: Uuid) -> AppResult<()> {
    if transition(conn, id, PurchaseStatus::Pending, PurchaseStatus::Active).await? {
        tracing::info!(purchase_id = %id, "programme purchase activated");
    }
    Ok(())
}

pub async fn cancel_pending<C: ConnectionTrait>(conn: &C, id: Uuid) -> AppResult<()> {
    transition(conn, id, PurchaseStatus::Pending, PurchaseStatus::Cancelled).await?;
    Ok(())
}

pub async fn revoke<C: ConnectionTrait>(conn: &C, id: Uuid) -> AppResult<()> {
    transition(conn, id, PurchaseStatus::Active, PurchaseStatus::Cancelled).await?;
    Ok(())
}
