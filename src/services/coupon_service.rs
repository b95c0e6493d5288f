use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, sea_query::LockType,
};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    audit,
    dto::coupons::{CouponList, CouponQuote, CreateCouponRequest, UpdateCouponRequest, ValidateCouponRequest},
    entity::{
        coupon_redemptions::{Column as RedemptionCol, Entity as CouponRedemptions},
        coupons::{self, Column as CouponCol, Entity as Coupons},
        payments::{Column as PaymentCol, Entity as Payments},
    },
    enums::{CouponScope, DiscountType, PaymentStatus},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Coupon,
    response::{ApiResponse, Meta},
    routes::params::FilterQuery,
    state::AppState,
    validation::{Validator, clean_optional},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponRejection {
    #[error("coupon is not active")]
    Inactive,
    #[error("coupon is not valid yet")]
    NotStarted,
    #[error("coupon has expired")]
    Expired,
    #[error("coupon does not apply to this purchase")]
    ScopeMismatch,
    #[error("coupon usage limit reached")]
    UsageLimitReached,
    #[error("you have already used this coupon the maximum number of times")]
    UserLimitReached,
    #[error("order total is below the coupon minimum of {0}")]
    BelowMinimum(i64),
    #[error("coupon is misconfigured")]
    Misconfigured,
}

impl From<CouponRejection> for AppError {
    fn from(err: CouponRejection) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Discount a coupon grants on `subtotal`, or why it cannot be used.
/// `user_usage` is how many times this user has already redeemed it.
pub fn evaluate_coupon(
    coupon: &coupons::Model,
    user_usage: i32,
    subtotal: i64,
    scope: CouponScope,
    now: DateTime<Utc>,
) -> Result<i64, CouponRejection> {
    if !coupon.is_active {
        return Err(CouponRejection::Inactive);
    }
    if coupon.starts_at.is_some_and(|starts| now < starts) {
        return Err(CouponRejection::NotStarted);
    }
    if coupon.expires_at.is_some_and(|expires| now >= expires) {
        return Err(CouponRejection::Expired);
    }
    let coupon_scope = CouponScope::parse(&coupon.scope).ok_or(CouponRejection::Misconfigured)?;
    if !coupon_scope.covers(scope) {
        return Err(CouponRejection::ScopeMismatch);
    }
    if coupon.max_uses.is_some_and(|max| coupon.total_uses >= max) {
        return Err(CouponRejection::UsageLimitReached);
    }
    if coupon.max_uses_per_user.is_some_and(|max| user_usage >= max) {
        return Err(CouponRejection::UserLimitReached);
    }
    if subtotal < coupon.min_order_amount {
        return Err(CouponRejection::BelowMinimum(coupon.min_order_amount));
    }

    let subtotal = subtotal.max(0);
    let discount = match DiscountType::parse(&coupon.discount_type) {
        Some(DiscountType::Percentage) => {
            if !(1..=100).contains(&coupon.discount_value) {
                return Err(CouponRejection::Misconfigured);
            }
            (subtotal as i128 * coupon.discount_value as i128 / 100) as i64
        }
        Some(DiscountType::Fixed) => coupon.discount_value.max(0),
        None => return Err(CouponRejection::Misconfigured),
    };
    Ok(discount.min(subtotal))
}

/// Uses held by checkouts still waiting on their payment: `(all users, this user)`.
async fn held_uses<C: ConnectionTrait>(conn: &C, coupon_id: Uuid, user_id: Uuid) -> AppResult<(i32, i32)> {
    let pending = Payments::find()
        .filter(PaymentCol::CouponId.eq(coupon_id))
        .filter(PaymentCol::Status.eq(PaymentStatus::Pending.as_str()));
    let total = pending.clone().count(conn).await?;
    let mine = pending.filter(PaymentCol::UserId.eq(user_id)).count(conn).await?;
    Ok((
        i32::try_from(total).unwrap_or(i32::MAX),
        i32::try_from(mine).unwrap_or(i32::MAX),
    ))
}

/// Prices `coupon` counting approved redemptions plus pending checkouts
/// against both usage limits.
async fn price_coupon<C: ConnectionTrait>(
    conn: &C,
    coupon: coupons::Model,
    user_id: Uuid,
    scope: CouponScope,
    subtotal: i64,
) -> AppResult<(coupons::Model, i64)> {
    let redeemed = CouponRedemptions::find()
        .filter(RedemptionCol::CouponId.eq(coupon.id))
        .filter(RedemptionCol::UserId.eq(user_id))
        .one(conn)
        .await?
        .map(|r| r.usage_count)
        .unwrap_or(0);
    let (held_total, held_mine) = held_uses(conn, coupon.id, user_id).await?;

    let mut counted = coupon.clone();
    counted.total_uses = coupon.total_uses.saturating_add(held_total);
    let discount = evaluate_coupon(
        &counted,
        redeemed.saturating_add(held_mine),
        subtotal,
        scope,
        Utc::now(),
    )?;
    Ok((coupon, discount))
}

fn coupon_not_found() -> AppError {
    AppError::BadRequest("coupon not found".into())
}

/// Looks a coupon up by code and prices it for `user_id` without consuming it.
pub async fn quote_coupon<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    code: &str,
    scope: CouponScope,
    subtotal: i64,
) -> AppResult<(coupons::Model, i64)> {
    let coupon = Coupons::find()
        .filter(CouponCol::Code.eq(normalize_code(code)))
        .one(conn)
        .await?
        .ok_or_else(coupon_not_found)?;
    price_coupon(conn, coupon, user_id, scope, subtotal).await
}

/// Checkout variant of [`quote_coupon`]: locks the coupon row until the
/// caller's transaction ends. The caller inserts its pending payment in that
/// same transaction, so concurrent checkouts see each other's hold.
pub async fn reserve_coupon<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    code: &str,
    scope: CouponScope,
    subtotal: i64,
) -> AppResult<(coupons::Model, i64)> {
    let coupon = Coupons::find()
        .filter(CouponCol::Code.eq(normalize_code(code)))
        .lock(LockType::Update)
        .one(conn)
        .await?
        .ok_or_else(coupon_not_found)?;
    price_coupon(conn, coupon, user_id, scope, subtotal).await
}

pub async fn validate_coupon(
    state: &AppState,
    user: &AuthUser,
    payload: ValidateCouponRequest,
) -> AppResult<ApiResponse<CouponQuote>> {
    Validator::new()
        .required(&payload.code, "code")
        .non_negative(payload.subtotal, "subtotal")
        .finish()?;

    let (coupon, discount) =
        quote_coupon(&state.orm, user.user_id, &payload.code, payload.scope, payload.subtotal).await?;

    Ok(ApiResponse::success(
        "Coupon is valid",
        CouponQuote {
            coupon_id: coupon.id,
            code: coupon.code,
            subtotal: payload.subtotal,
            discount_amount: discount,
            total: payload.subtotal - discount,
        },
        Some(Meta::empty()),
    ))
}

struct CouponFields<'a> {
    code: Option<&'a str>,
    discount_type: Option<DiscountType>,
    discount_value: Option<i64>,
    max_uses: Option<i32>,
    max_uses_per_user: Option<i32>,
    min_order_amount: Option<i64>,
    starts_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
}

fn validate_fields(fields: &CouponFields<'_>) -> AppResult<()> {
    let mut validator = Validator::new();
    if let Some(code) = fields.code {
        validator.required(code, "code");
        validator.check(
            code.trim().chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "code",
            "may only contain letters, digits, '-' and '_'",
        );
    }
    if let Some(value) = fields.discount_value {
        validator.positive(value, "discount_value");
        if fields.discount_type == Some(DiscountType::Percentage) {
            validator.check(value <= 100, "discount_value", "percentage must be between 1 and 100");
        }
    }
    if let Some(max) = fields.max_uses {
        validator.positive(max as i64, "max_uses");
    }
    if let Some(max) = fields.max_uses_per_user {
        validator.positive(max as i64, "max_uses_per_user");
    }
    if let Some(min) = fields.min_order_amount {
        validator.non_negative(min, "min_order_amount");
    }
    if let (Some(starts), Some(expires)) = (fields.starts_at, fields.expires_at) {
        validator.check(starts < expires, "expires_at", "must be after starts_at");
    }
    validator.finish()
}

async fn ensure_code_free(state: &AppState, code: &str, except: Option<Uuid>) -> AppResult<()> {
    let mut finder = Coupons::find().filter(CouponCol::Code.eq(code));
    if let Some(id) = except {
        finder = finder.filter(CouponCol::Id.ne(id));
    }
    if finder.one(&state.orm).await?.is_some() {
        return Err(AppError::Conflict(format!("coupon code {code} already exists")));
    }
    Ok(())
}

pub async fn list_coupons(
    state: &AppState,
    user: &AuthUser,
    query: FilterQuery,
) -> AppResult<ApiResponse<CouponList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination().normalize();

    let mut finder = Coupons::find().order_by_desc(CouponCol::CreatedAt);
    match query.status() {
        Some("active") => finder = finder.filter(CouponCol::IsActive.eq(true)),
        Some("inactive") => finder = finder.filter(CouponCol::IsActive.eq(false)),
        _ => {}
    }
    if let Some(q) = query.search() {
        finder = finder.filter(CouponCol::Code.contains(normalize_code(q)));
    }

    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Coupon::from)
        .collect();

    Ok(ApiResponse::success(
        "Coupons",
        CouponList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn get_coupon(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<ApiResponse<Coupon>> {
    ensure_admin(user)?;
    let coupon = Coupons::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success("Coupon", coupon.into(), Some(Meta::empty())))
}

pub async fn create_coupon(
    state: &AppState,
    user: &AuthUser,
    payload: CreateCouponRequest,
) -> AppResult<ApiResponse<Coupon>> {
    ensure_admin(user)?;
    validate_fields(&CouponFields {
        code: Some(&payload.code),
        discount_type: Some(payload.discount_type),
        discount_value: Some(payload.discount_value),
        max_uses: payload.max_uses,
        max_uses_per_user: payload.max_uses_per_user,
        min_order_amount: payload.min_order_amount,
        starts_at: payload.starts_at,
        expires_at: payload.expires_at,
    })?;

    let code = normalize_code(&payload.code);
    ensure_code_free(state, &code, None).await?;

    let now = Utc::now();
    let coupon = coupons::ActiveModel {
        id: Set(Uuid::new_v4()),
        code: Set(code),
        description: Set(clean_optional(payload.description)),
        discount_type: Set(payload.discount_type.into()),
        discount_value: Set(payload.discount_value),
        scope: Set(payload.scope.unwrap_or(CouponScope::All).into()),
        max_uses: Set(payload.max_uses),
        max_uses_per_user: Set(payload.max_uses_per_user),
        min_order_amount: Set(payload.min_order_amount.unwrap_or(0)),
        total_uses: Set(0),
        starts_at: Set(payload.starts_at.map(Into::into)),
        expires_at: Set(payload.expires_at.map(Into::into)),
        is_active: Set(payload.is_active.unwrap_or(true)),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "coupon_create",
        "coupons",
        serde_json::json!({ "coupon_id": coupon.id, "code": coupon.code }),
    )
    .await;

    Ok(ApiResponse::success("Coupon created", coupon.into(), Some(Meta::empty())))
}

pub async fn update_coupon(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateCouponRequest,
) -> AppResult<ApiResponse<Coupon>> {
    ensure_admin(user)?;
    let existing = Coupons::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let discount_type = payload
        .discount_type
        .or_else(|| DiscountType::parse(&existing.discount_type));
    validate_fields(&CouponFields {
        code: payload.code.as_deref(),
        discount_type,
        discount_value: payload.discount_value.or(Some(existing.discount_value)),
        max_uses: payload.max_uses,
        max_uses_per_user: payload.max_uses_per_user,
        min_order_amount: payload.min_order_amount,
        starts_at: payload.starts_at.or(existing.starts_at.map(|d| d.with_timezone(&Utc))),
        expires_at: payload.expires_at.or(existing.expires_at.map(|d| d.with_timezone(&Utc))),
    })?;

    let mut active: coupons::ActiveModel = existing.into();
    if let Some(code) = payload.code {
        let code = normalize_code(&code);
        ensure_code_free(state, &code, Some(id)).await?;
        active.code = Set(code);
    }
    if payload.description.is_some() {
        active.description = Set(clean_optional(payload.description));
    }
    if let Some(discount_type) = payload.discount_type {
        active.discount_type = Set(discount_type.into());
    }
    if let Some(value) = payload.discount_value {
        active.discount_value = Set(value);
    }
    if let Some(scope) = payload.scope {
        active.scope = Set(scope.into());
    }
    if payload.max_uses.is_some() {
        active.max_uses = Set(payload.max_uses);
    }
    if payload.max_uses_per_user.is_some() {
        active.max_uses_per_user = Set(payload.max_uses_per_user);
    }
    if let Some(min) = payload.min_order_amount {
        active.min_order_amount = Set(min);
    }
    if let Some(starts_at) = payload.starts_at {
        active.starts_at = Set(Some(starts_at.into()));
    }
    if let Some(expires_at) = payload.expires_at {
        active.expires_at = Set(Some(expires_at.into()));
    }
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }
    active.updated_at = Set(Utc::now().into());
    let coupon = active.update(&state.orm).await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "coupon_update",
        "coupons",
        serde_json::json!({ "coupon_id": coupon.id }),
    )
    .await;

    Ok(ApiResponse::success("Coupon updated", coupon.into(), Some(Meta::empty())))
}

pub async fn delete_coupon(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = Coupons::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.orm,
        Some(user.user_id),
        "coupon_delete",
        "coupons",
        serde_json::json!({ "coupon_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn coupon(discount_type: DiscountType, value: i64) -> coupons::Model {
        let now = Utc::now();
        coupons::Model {
            id: Uuid::new_v4(),
            code: "SUMMER".into(),
            description: None,
            discount_type: discount_type.into(),
            discount_value: value,
            scope: CouponScope::All.into(),
            max_uses: None,
            max_uses_per_user: None,
            min_order_amount: 0,
            total_uses: 0,
            starts_at: None,
            expires_at: None,
            is_active: true,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    #[test]
    fn percentage_and_fixed_discounts() {
        let now = Utc::now();
        let pct = coupon(DiscountType::Percentage, 15);
        assert_eq!(evaluate_coupon(&pct, 0, 10_000, CouponScope::Store, now), Ok(1_500));
        // Rounds down to whole minor units.
        assert_eq!(evaluate_coupon(&pct, 0, 999, CouponScope::Store, now), Ok(149));

        let fixed = coupon(DiscountType::Fixed, 5_000);
        assert_eq!(evaluate_coupon(&fixed, 0, 20_000, CouponScope::Programme, now), Ok(5_000));
        assert_eq!(evaluate_coupon(&fixed, 0, 3_000, CouponScope::Programme, now), Ok(3_000));
    }

    #[test]
    fn rejects_outside_validity_window() {
        let now = Utc::now();
        let mut c = coupon(DiscountType::Fixed, 100);
        c.is_active = false;
        assert_eq!(evaluate_coupon(&c, 0, 1_000, CouponScope::Store, now), Err(CouponRejection::Inactive));

        let mut c = coupon(DiscountType::Fixed, 100);
        c.starts_at = Some((now + Duration::days(1)).into());
        assert_eq!(evaluate_coupon(&c, 0, 1_000, CouponScope::Store, now), Err(CouponRejection::NotStarted));

        let mut c = coupon(DiscountType::Fixed, 100);
        c.expires_at = Some((now - Duration::seconds(1)).into());
        assert_eq!(evaluate_coupon(&c, 0, 1_000, CouponScope::Store, now), Err(CouponRejection::Expired));
    }

    #[test]
    fn rejects_scope_limits_and_minimum() {
        let now = Utc::now();
        let mut c = coupon(DiscountType::Percentage, 10);
        c.scope = CouponScope::Subscription.into();
        assert_eq!(
            evaluate_coupon(&c, 0, 1_000, CouponScope::Store, now),
            Err(CouponRejection::ScopeMismatch)
        );
        assert!(evaluate_coupon(&c, 0, 1_000, CouponScope::Subscription, now).is_ok());

        let mut c = coupon(DiscountType::Percentage, 10);
        c.max_uses = Some(3);
        c.total_uses = 3;
        assert_eq!(
            evaluate_coupon(&c, 0, 1_000, CouponScope::Store, now),
            Err(CouponRejection::UsageLimitReached)
        );

        let mut c = coupon(DiscountType::Percentage, 10);
        c.max_uses_per_user = Some(1);
        assert_eq!(
            evaluate_coupon(&c, 1, 1_000, CouponScope::Store, now),
            Err(CouponRejection::UserLimitReached)
        );

        let mut c = coupon(DiscountType::Fixed, 100);
        c.min_order_amount = 5_000;
        assert_eq!(
            evaluate_coupon(&c, 0, 4_999, CouponScope::Store, now),
            Err(CouponRejection::BelowMinimum(5_000))
        );
    }

    #[test]
    fn discount_never_exceeds_subtotal() {
        let now = Utc::now();
        for subtotal in [0, 1, 50, 10_000] {
            let full = coupon(DiscountType::Percentage, 100);
            assert_eq!(evaluate_coupon(&full, 0, subtotal, CouponScope::Store, now), Ok(subtotal));
            let big = coupon(DiscountType::Fixed, 1_000_000);
            assert_eq!(evaluate_coupon(&big, 0, subtotal, CouponScope::Store, now), Ok(subtotal));
        }
    }

    #[test]
    fn misconfigured_percentage_is_rejected() {
        let c = coupon(DiscountType::Percentage, 150);
        assert_eq!(
            evaluate_coupon(&c, 0, 1_000, CouponScope::Store, Utc::now()),
            Err(CouponRejection::Misconfigured)
        );
        assert_eq!(normalize_code("  summer-10 "), "SUMMER-10");
    }
}
