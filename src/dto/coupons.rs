use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    enums::{CouponScope, DiscountType},
    models::{Coupon, CouponRedemption},
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCouponRequest {
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub scope: Option<CouponScope>,
    pub max_uses: Option<i32>,
    pub max_uses_per_user: Option<i32>,
    pub min_order_amount: Option<i64>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCouponRequest {
    pub code: Option<String>,
    pub description: Option<String>,
    pub discount_type: Option<DiscountType>,
    pub discount_value: Option<i64>,
    pub scope: Option<CouponScope>,
    pub max_uses: Option<i32>,
    pub max_uses_per_user: Option<i32>,
    pub min_order_amount: Option<i64>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ValidateCouponRequest {
    pub code: String,
    pub scope: CouponScope,
    /// Amount the coupon would apply to, base-currency minor units.
    pub subtotal: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CouponQuote {
    pub coupon_id: Uuid,
    pub code: String,
    pub subtotal: i64,
    pub discount_amount: i64,
    pub total: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CouponList {
    pub items: Vec<Coupon>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CouponUsage {
    pub coupon: Coupon,
    pub redemptions: Vec<CouponRedemption>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ReconcileReport {
    pub coupon_id: Uuid,
    pub cached: i64,
    pub computed: i64,
    pub corrected: bool,
}
