//! Membership plans and the subscriptions bought against them.

use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait, sea_query::{Expr, LockType},
};
use uuid::Uuid;

use crate::{
    audit,
    dto::subscriptions::{
        CreatePlanRequest, PlanList, SubscribeRequest, SubscribeResponse, SubscriptionList,
        UpdatePlanRequest,
    },
    entity::{
        subscription_plans::{self, Column as PlanCol, Entity as Plans},
        subscriptions::{self, Column as SubCol, Entity as Subscriptions},
    },
    enums::{CouponScope, PaymentPurpose, SubscriptionStatus},
    error::{AppError, AppResult},
    middleware::{
        auth::{AuthUser, ensure_admin},
        currency::DetectedCurrency,
    },
    models::{Subscription, SubscriptionPlan},
    response::{ApiResponse, Meta},
    routes::params::FilterQuery,
    services::{
        coupon_service,
        payment_service::{self, BaseLineItem, NewPayment, Outcome},
    },
    state::AppState,
    validation::{Validator, clean_optional},
};

pub async fn list_plans(state: &AppState) -> AppResult<ApiResponse<PlanList>> {
    let items = Plans::find()
        .filter(PlanCol::IsActive.eq(true))
        .order_by_asc(PlanCol::Price)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(SubscriptionPlan::from)
        .collect();
    Ok(ApiResponse::success("Plans", PlanList { items }, None))
}

fn validate_plan(name: Option<&str>, price: Option<i64>, duration_days: Option<i32>) -> AppResult<()> {
    let mut validator = Validator::new();
    if let Some(name) = name {
        validator.required(name, "name");
    }
    if let Some(price) = price {
        validator.non_negative(price, "price");
    }
    if let Some(days) = duration_days {
        validator.positive(days as i64, "duration_days");
    }
    validator.finish()
}

pub async fn create_plan(
    state: &AppState,
    user: &AuthUser,
    payload: CreatePlanRequest,
) -> AppResult<ApiResponse<SubscriptionPlan>> {
    ensure_admin(user)?;
    validate_plan(Some(&payload.name), Some(payload.price), Some(payload.duration_days))?;

    let plan = subscription_plans::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name.trim().to_string()),
        description: Set(clean_optional(payload.description)),
        price: Set(payload.price),
        duration_days: Set(payload.duration_days),
        is_active: Set(payload.is_active.unwrap_or(true)),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "plan_create",
        "subscription_plans",
        serde_json::json!({ "plan_id": plan.id }),
    )
    .await;

    Ok(ApiResponse::success("Plan created", plan.into(), Some(Meta::empty())))
}

pub async fn update_plan(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdatePlanRequest,
) -> AppResult<ApiResponse<SubscriptionPlan>> {
    ensure_admin(user)?;
    validate_plan(payload.name.as_deref(), payload.price, payload.duration_days)?;

    let existing = Plans::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: subscription_plans::ActiveModel = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name.trim().to_string());
    }
    if payload.description.is_some() {
        active.description = Set(clean_optional(payload.description));
    }
    if let Some(price) = payload.price {
        active.price = Set(price);
    }
    if let Some(days) = payload.duration_days {
        active.duration_days = Set(days);
    }
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }
    let plan = active.update(&state.orm).await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "plan_update",
        "subscription_plans",
        serde_json::json!({ "plan_id": plan.id }),
    )
    .await;

    Ok(ApiResponse::success("Plan updated", plan.into(), Some(Meta::empty())))
}

/// Plans with subscriptions are deactivated instead of deleted.
pub async fn delete_plan(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let referenced = Subscriptions::find()
        .filter(SubCol::PlanId.eq(id))
        .count(&state.orm)
        .await?
        > 0;

    let affected = if referenced {
        Plans::update_many()
            .col_expr(PlanCol::IsActive, Expr::value(false))
            .filter(PlanCol::Id.eq(id))
            .exec(&state.orm)
            .await?
            .rows_affected
    } else {
        Plans::delete_by_id(id).exec(&state.orm).await?.rows_affected
    };
    if affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.orm,
        Some(user.user_id),
        "plan_delete",
        "subscription_plans",
        serde_json::json!({ "plan_id": id, "deactivated": referenced }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({ "deactivated": referenced }),
        Some(Meta::empty()),
    ))
}

pub async fn subscribe(
    state: &AppState,
    user: &AuthUser,
    currency: DetectedCurrency,
    payload: SubscribeRequest,
) -> AppResult<ApiResponse<SubscribeResponse>> {
    let gateway = payment_service::gateway_for(state, payload.provider, currency.currency)?;

    let txn = state.orm.begin().await?;
    let plan = Plans::find_by_id(payload.plan_id)
        .filter(PlanCol::IsActive.eq(true))
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

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
                CouponScope::Subscription,
                plan.price,
            )
            .await?;
            (Some(coupon.id), discount)
        }
        None => (None, 0),
    };
    let total = plan.price - discount_amount;
    let amount = payment_service::charge_amount(&state.config.currency.rates, total, currency.currency)?;

    let now = Utc::now();
    let subscription = subscriptions::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        plan_id: Set(plan.id),
        status: Set(SubscriptionStatus::Pending.into()),
        starts_at: Set(None),
        ends_at: Set(None),
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
            purpose: PaymentPurpose::Subscription,
            reference_id: subscription.id,
            currency: currency.currency,
            amount,
            base_amount: total,
            discount_amount,
            coupon_id,
        },
    )
    .await?;

    let mut active: subscriptions::ActiveModel = subscription.into();
    active.payment_id = Set(Some(payment.id));
    let subscription = active.update(&txn).await?;
    txn.commit().await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "subscribe",
        "subscriptions",
        serde_json::json!({ "subscription_id": subscription.id, "plan_id": plan.id, "payment_id": payment.id }),
    )
    .await;

    let payment = payment_service::open_checkout(
        state,
        gateway.as_ref(),
        payment,
        &format!("{} membership", plan.name),
        &[BaseLineItem {
            name: plan.name.clone(),
            quantity: 1,
            unit_price: plan.price,
        }],
    )
    .await?;

    Ok(ApiResponse::success(
        "Checkout started",
        SubscribeResponse {
            subscription: subscription.into(),
            payment: payment.into(),
        },
        Some(Meta::empty()),
    ))
}

pub async fn my_subscriptions(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<SubscriptionList>> {
    let items = Subscriptions::find()
        .filter(SubCol::UserId.eq(user.user_id))
        .order_by_desc(SubCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Subscription::from)
        .collect();
    Ok(ApiResponse::success("Subscriptions", SubscriptionList { items }, None))
}

/// Cancels an active or pending subscription. A pending one also cancels its
/// open payment so a late webhook cannot activate it.
pub async fn cancel_subscription(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Subscription>> {
    let existing = Subscriptions::find_by_id(id)
        .filter(SubCol::UserId.eq(user.user_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    match SubscriptionStatus::parse(&existing.status) {
        Some(SubscriptionStatus::Pending) => {
            if let Some(payment_id) = existing.payment_id {
                payment_service::apply_outcome(
                    state,
                    payment_id,
                    Outcome::Cancelled("cancelled by user".into()),
                )
                .await?;
            }
            cancel_pending(&state.orm, id).await?;
        }
        Some(SubscriptionStatus::Active) => revoke(&state.orm, id).await?,
        _ => {
            return Err(AppError::BadRequest(
                "Only active or pending subscriptions can be cancelled".into(),
            ));
        }
    }

    let updated = Subscriptions::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "subscription_cancel",
        "subscriptions",
        serde_json::json!({ "subscription_id": id }),
    )
    .await;

    Ok(ApiResponse::success("Subscription cancelled", updated.into(), Some(Meta::empty())))
}

pub async fn list_subscriptions(
    state: &AppState,
    user: &AuthUser,
    query: FilterQuery,
) -> AppResult<ApiResponse<SubscriptionList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all();
    if let Some(status) = query.status() {
        condition = condition.add(SubCol::Status.eq(status));
    }

    let finder = Subscriptions::find()
        .filter(condition)
        .order_by_desc(SubCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Subscription::from)
        .collect();

    Ok(ApiResponse::success(
        "Subscriptions",
        SubscriptionList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

/// New memberships start when the current one ends, so renewing early does
/// not lose days.
pub fn activation_window(
    now: DateTime<Utc>,
    current_end: Option<DateTime<Utc>>,
    duration_days: i32,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let starts_at = current_end.filter(|end| *end > now).unwrap_or(now);
    (starts_at, starts_at + Duration::days(duration_days as i64))
}

async fn lock_subscription<C: ConnectionTrait>(conn: &C, id: Uuid) -> AppResult<Option<subscriptions::Model>> {
    Ok(Subscriptions::find_by_id(id)
        .lock(LockType::Update)
        .one(conn)
        .await?)
}

pub async fn activate_subscription<C: ConnectionTrait>(conn: &C, id: Uuid) -> AppResult<()> {
    let Some(subscription) = lock_subscription(conn, id).await? else {
        tracing::warn!(subscription_id = %id, "paid payment references a missing subscription");
        return Ok(());
    };
    if subscription.status != SubscriptionStatus::Pending.as_str() {
        tracing::warn!(subscription_id = %id, status = %subscription.status, "subscription not pending, skipping activation");
        return Ok(());
    }

    let plan = Plans::find_by_id(subscription.plan_id)
        .one(conn)
        .await?
        .ok_or(AppError::NotFound)?;

    let current_end = Subscriptions::find()
        .filter(SubCol::UserId.eq(subscription.user_id))
        .filter(SubCol::Status.eq(SubscriptionStatus::Active.as_str()))
        .filter(SubCol::Id.ne(id))
        .filter(SubCol::EndsAt.is_not_null())
        .order_by_desc(SubCol::EndsAt)
        .one(conn)
        .await?
        .and_then(|s| s.ends_at)
        .map(|end| end.with_timezone(&Utc));

    let now = Utc::now();
    let (starts_at, ends_at) = activation_window(now, current_end, plan.duration_days);

    let mut active: subscriptions::ActiveModel = subscription.into();
    active.status = Set(SubscriptionStatus::Active.into());
    active.starts_at = Set(Some(starts_at.into()));
    active.ends_at = Set(Some(ends_at.into()));
    active.updated_at = Set(now.into());
    active.update(conn).await?;

    tracing::info!(subscription_id = %id, %starts_at, %ends_at, "subscription activated");
    Ok(())
}

pub async fn cancel_pending<C: ConnectionTrait>(conn: &C, id: Uuid) -> AppResult<()> {
    set_status_if(conn, id, SubscriptionStatus::Pending, SubscriptionStatus::Cancelled).await
}

/// Ends access for an active subscription.
pub async fn revoke<C: ConnectionTrait>(conn: &C, id: Uuid) -> AppResult<()> {
    set_status_if(conn, id, SubscriptionStatus::Active, SubscriptionStatus::Cancelled).await
}

async fn set_status_if<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
    from: SubscriptionStatus,
    to: SubscriptionStatus,
) -> AppResult<()> {
    let Some(subscription) = lock_subscription(conn, id).await? else {
        return Ok(());
    };
    if subscription.status != from.as_str() {
        return Ok(());
    }
    let mut active: subscriptions::ActiveModel = subscription.into();
    active.status = Set(to.into());
    active.updated_at = Set(Utc::now().into());
    active.update(conn).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn starts_now_without_a_running_membership() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let (start, end) = activation_window(now, None, 30);
        assert_eq!(start, now);
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 3, 31, 12, 0, 0).unwrap());
    }

    #[test]
    fn extends_from_the_current_end() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let current_end = Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap();
        let (start, end) = activation_window(now, Some(current_end), 7);
        assert_eq!(start, current_end);
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 3, 17, 0, 0, 0).unwrap());
    }

    #[test]
    fn ignores_an_end_in_the_past() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let stale_end = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let (start, _) = activation_window(now, Some(stale_end), 7);
        assert_eq!(start, now);
    }
}
