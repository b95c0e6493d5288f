//! Per-user coupon redemption counts and the cached `coupons.total_uses`.
//!
//! Both mutators run inside the caller's transaction and lock the coupon row
//! first, so concurrent approvals for the same coupon serialize on it.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait, sea_query::LockType,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::coupons::{CouponUsage, ReconcileReport},
    entity::{
        coupon_redemptions::{self, Column as RedemptionCol, Entity as CouponRedemptions},
        coupons::{self, Entity as Coupons},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::CouponRedemption,
    response::{ApiResponse, Meta},
    state::AppState,
};

async fn lock_coupon<C: ConnectionTrait>(conn: &C, coupon_id: Uuid) -> AppResult<coupons::Model> {
    Coupons::find_by_id(coupon_id)
        .lock(LockType::Update)
        .one(conn)
        .await?
        .ok_or(AppError::NotFound)
}

async fn lock_redemption<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    coupon_id: Uuid,
) -> AppResult<Option<coupon_redemptions::Model>> {
    Ok(CouponRedemptions::find()
        .filter(RedemptionCol::CouponId.eq(coupon_id))
        .filter(RedemptionCol::UserId.eq(user_id))
        .lock(LockType::Update)
        .one(conn)
        .await?)
}

/// Counts one use of `coupon_id` by `user_id`.
pub async fn record_redemption<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    coupon_id: Uuid,
) -> AppResult<()> {
    let coupon = lock_coupon(conn, coupon_id).await?;
    let now = Utc::now();

    match lock_redemption(conn, user_id, coupon_id).await? {
        Some(existing) => {
            let count = existing.usage_count + 1;
            let mut active: coupon_redemptions::ActiveModel = existing.into();
            active.usage_count = Set(count);
            active.last_used_at = Set(Some(now.into()));
            active.update(conn).await?;
        }
        None => {
            coupon_redemptions::ActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(user_id),
                coupon_id: Set(coupon_id),
                usage_count: Set(1),
                last_used_at: Set(Some(now.into())),
                created_at: Set(now.into()),
            }
            .insert(conn)
            .await?;
        }
    }

    if coupon.max_uses.is_some_and(|max| coupon.total_uses >= max) {
        tracing::warn!(coupon_id = %coupon_id, total_uses = coupon.total_uses, "coupon redeemed past its limit");
    }
    let total = coupon.total_uses + 1;
    let mut active: coupons::ActiveModel = coupon.into();
    active.total_uses = Set(total);
    active.updated_at = Set(now.into());
    active.update(conn).await?;

    tracing::debug!(coupon_id = %coupon_id, user_id = %user_id, total_uses = total, "coupon redemption recorded");
    Ok(())
}

/// Undoes one use. Only a redemption row that still has a use to give back
/// moves the cached total, so the cache never drifts below the rows.
pub async fn release_redemption<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    coupon_id: Uuid,
) -> AppResult<()> {
    let coupon = match lock_coupon(conn, coupon_id).await {
        Ok(coupon) => coupon,
        Err(AppError::NotFound) => return Ok(()),
        Err(err) => return Err(err),
    };

    let Some(existing) = lock_redemption(conn, user_id, coupon_id).await? else {
        tracing::warn!(coupon_id = %coupon_id, user_id = %user_id, "no redemption to release");
        return Ok(());
    };
    if existing.usage_count <= 0 {
        tracing::warn!(coupon_id = %coupon_id, user_id = %user_id, "redemption already at zero");
        return Ok(());
    }

    let count = existing.usage_count - 1;
    let mut active: coupon_redemptions::ActiveModel = existing.into();
    active.usage_count = Set(count);
    active.update(conn).await?;

    let total = (coupon.total_uses - 1).max(0);
    let mut active: coupons::ActiveModel = coupon.into();
    active.total_uses = Set(total);
    active.updated_at = Set(Utc::now().into());
    active.update(conn).await?;
    Ok(())
}

pub fn needs_correction(cached: i64, computed: i64) -> bool {
    cached != computed
}

/// Recomputes the cached total from the redemption rows.
pub async fn reconcile(state: &AppState, coupon_id: Uuid) -> AppResult<ReconcileReport> {
    let txn = state.orm.begin().await?;
    let coupon = lock_coupon(&txn, coupon_id).await?;

    let computed: i64 = CouponRedemptions::find()
        .filter(RedemptionCol::CouponId.eq(coupon_id))
        .all(&txn)
        .await?
        .iter()
        .map(|r| r.usage_count as i64)
        .sum();
    let cached = coupon.total_uses as i64;
    let corrected = needs_correction(cached, computed);

    if corrected {
        let mut active: coupons::ActiveModel = coupon.into();
        active.total_uses = Set(i32::try_from(computed).unwrap_or(i32::MAX));
        active.updated_at = Set(Utc::now().into());
        active.update(&txn).await?;
        tracing::warn!(coupon_id = %coupon_id, cached, computed, "coupon usage cache corrected");
    }
    txn.commit().await?;

    Ok(ReconcileReport {
        coupon_id,
        cached,
        computed,
        corrected,
    })
}

pub async fn reconcile_coupon(
    state: &AppState,
    user: &AuthUser,
    coupon_id: Uuid,
) -> AppResult<ApiResponse<ReconcileReport>> {
    ensure_admin(user)?;
    let report = reconcile(state, coupon_id).await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "coupon_reconcile",
        "coupons",
        serde_json::json!({
            "coupon_id": coupon_id,
            "cached": report.cached,
            "computed": report.computed,
            "corrected": report.corrected,
        }),
    )
    .await;

    Ok(ApiResponse::success("Coupon usage reconciled", report, Some(Meta::empty())))
}

pub async fn coupon_usage(
    state: &AppState,
    user: &AuthUser,
    coupon_id: Uuid,
) -> AppResult<ApiResponse<CouponUsage>> {
    ensure_admin(user)?;
    let coupon = Coupons::find_by_id(coupon_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let redemptions = CouponRedemptions::find()
        .filter(RedemptionCol::CouponId.eq(coupon_id))
        .order_by_desc(RedemptionCol::LastUsedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(CouponRedemption::from)
        .collect();

    Ok(ApiResponse::success(
        "Coupon usage",
        CouponUsage {
            coupon: coupon.into(),
            redemptions,
        },
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::needs_correction;

    #[test]
    fn correction_only_when_counts_differ() {
        assert!(!needs_correction(4, 4));
        assert!(needs_correction(5, 4));
        assert!(needs_correction(0, 2));
    }
}
