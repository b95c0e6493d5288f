//! API representations of the database rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity;

fn utc(value: sea_orm::prelude::DateTimeWithTimeZone) -> DateTime<Utc> {
    value.with_timezone(&Utc)
}

fn utc_opt(value: Option<sea_orm::prelude::DateTimeWithTimeZone>) -> Option<DateTime<Utc>> {
    value.map(utc)
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: String,
    pub preferred_currency: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<entity::users::Model> for User {
    fn from(model: entity::users::Model) -> Self {
        Self {
            id: model.id,
            email: model.email,
            full_name: model.full_name,
            phone: model.phone,
            role: model.role,
            preferred_currency: model.preferred_currency,
            is_active: model.is_active,
            created_at: utc(model.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub stock: i32,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<entity::products::Model> for Product {
    fn from(model: entity::products::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            price: model.price,
            stock: model.stock,
            image_url: model.image_url,
            is_active: model.is_active,
            created_at: utc(model.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

impl From<entity::cart_items::Model> for CartItem {
    fn from(model: entity::cart_items::Model) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            user_id: model.user_id,
            quantity: model.quantity,
            created_at: utc(model.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subtotal: i64,
    pub discount_amount: i64,
    pub total_amount: i64,
    pub currency: String,
    pub charge_amount: i64,
    pub status: String,
    pub payment_status: String,
    pub invoice_number: String,
    pub shipping_address: String,
    pub coupon_id: Option<Uuid>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<entity::orders::Model> for Order {
    fn from(model: entity::orders::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            subtotal: model.subtotal,
            discount_amount: model.discount_amount,
            total_amount: model.total_amount,
            currency: model.currency,
            charge_amount: model.charge_amount,
            status: model.status,
            payment_status: model.payment_status,
            invoice_number: model.invoice_number,
            shipping_address: model.shipping_address,
            coupon_id: model.coupon_id,
            paid_at: utc_opt(model.paid_at),
            created_at: utc(model.created_at),
            updated_at: utc(model.updated_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub price: i64,
    pub created_at: DateTime<Utc>,
}

impl From<entity::order_items::Model> for OrderItem {
    fn from(model: entity::order_items::Model) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            product_id: model.product_id,
            quantity: model.quantity,
            price: model.price,
            created_at: utc(model.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub description: Option<String>,
    pub discount_type: String,
    pub discount_value: i64,
    pub scope: String,
    pub max_uses: Option<i32>,
    pub max_uses_per_user: Option<i32>,
    pub min_order_amount: i64,
    pub total_uses: i32,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<entity::coupons::Model> for Coupon {
    fn from(model: entity::coupons::Model) -> Self {
        Self {
            id: model.id,
            code: model.code,
            description: model.description,
            discount_type: model.discount_type,
            discount_value: model.discount_value,
            scope: model.scope,
            max_uses: model.max_uses,
            max_uses_per_user: model.max_uses_per_user,
            min_order_amount: model.min_order_amount,
            total_uses: model.total_uses,
            starts_at: utc_opt(model.starts_at),
            expires_at: utc_opt(model.expires_at),
            is_active: model.is_active,
            created_at: utc(model.created_at),
            updated_at: utc(model.updated_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CouponRedemption {
    pub id: Uuid,
    pub user_id: Uuid,
    pub coupon_id: Uuid,
    pub usage_count: i32,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<entity::coupon_redemptions::Model> for CouponRedemption {
    fn from(model: entity::coupon_redemptions::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            coupon_id: model.coupon_id,
            usage_count: model.usage_count,
            last_used_at: utc_opt(model.last_used_at),
            created_at: utc(model.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: String,
    pub purpose: String,
    pub reference_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub base_amount: i64,
    pub discount_amount: i64,
    pub coupon_id: Option<Uuid>,
    pub status: String,
    pub provider_reference: Option<String>,
    pub checkout_url: Option<String>,
    pub failure_reason: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<entity::payments::Model> for Payment {
    fn from(model: entity::payments::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            provider: model.provider,
            purpose: model.purpose,
            reference_id: model.reference_id,
            amount: model.amount,
            currency: model.currency,
            base_amount: model.base_amount,
            discount_amount: model.discount_amount,
            coupon_id: model.coupon_id,
            status: model.status,
            provider_reference: model.provider_reference,
            checkout_url: model.checkout_url,
            failure_reason: model.failure_reason,
            paid_at: utc_opt(model.paid_at),
            created_at: utc(model.created_at),
            updated_at: utc(model.updated_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubscriptionPlan {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub duration_days: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<entity::subscription_plans::Model> for SubscriptionPlan {
    fn from(model: entity::subscription_plans::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            price: model.price,
            duration_days: model.duration_days,
            is_active: model.is_active,
            created_at: utc(model.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub status: String,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub payment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<entity::subscriptions::Model> for Subscription {
    fn from(model: entity::subscriptions::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            plan_id: model.plan_id,
            status: model.status,
            starts_at: utc_opt(model.starts_at),
            ends_at: utc_opt(model.ends_at),
            payment_id: model.payment_id,
            created_at: utc(model.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Programme {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub price: i64,
    pub duration_weeks: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<entity::programmes::Model> for Programme {
    fn from(model: entity::programmes::Model) -> Self {
        Self {
            id: model.id,
            title: model.title,
            description: model.description,
            price: model.price,
            duration_weeks: model.duration_weeks,
            is_active: model.is_active,
            created_at: utc(model.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProgrammePurchase {
    pub id: Uuid,
    pub user_id: Uuid,
    pub programme_id: Uuid,
    pub status: String,
    pub price_paid: i64,
    pub payment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<entity::programme_purchases::Model> for ProgrammePurchase {
    fn from(model: entity::programme_purchases::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            programme_id: model.programme_id,
            status: model.status,
            price_paid: model.price_paid,
            payment_id: model.payment_id,
            created_at: utc(model.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Transformation {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub before_image_url: String,
    pub after_image_url: String,
    pub is_published: bool,
    pub display_order: i32,
    pub created_at: DateTime<Utc>,
}

impl From<entity::transformations::Model> for Transformation {
    fn from(model: entity::transformations::Model) -> Self {
        Self {
            id: model.id,
            title: model.title,
            description: model.description,
            before_image_url: model.before_image_url,
            after_image_url: model.after_image_url,
            is_published: model.is_published,
            display_order: model.display_order,
            created_at: utc(model.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Video {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub category: Option<String>,
    pub is_published: bool,
    pub display_order: i32,
    pub created_at: DateTime<Utc>,
}

impl From<entity::videos::Model> for Video {
    fn from(model: entity::videos::Model) -> Self {
        Self {
            id: model.id,
            title: model.title,
            description: model.description,
            url: model.url,
            thumbnail_url: model.thumbnail_url,
            category: model.category,
            is_published: model.is_published,
            display_order: model.display_order,
            created_at: utc(model.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HomepagePopup {
    pub id: Uuid,
    pub title: String,
    pub body: Option<String>,
    pub image_url: Option<String>,
    pub cta_label: Option<String>,
    pub cta_url: Option<String>,
    pub is_active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<entity::homepage_popups::Model> for HomepagePopup {
    fn from(model: entity::homepage_popups::Model) -> Self {
        Self {
            id: model.id,
            title: model.title,
            body: model.body,
            image_url: model.image_url,
            cta_label: model.cta_label,
            cta_url: model.cta_url,
            is_active: model.is_active,
            starts_at: utc_opt(model.starts_at),
            ends_at: utc_opt(model.ends_at),
            created_at: utc(model.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Lead {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub source: Option<String>,
    pub message: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<entity::leads::Model> for Lead {
    fn from(model: entity::leads::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
            phone: model.phone,
            source: model.source,
            message: model.message,
            status: model.status,
            created_at: utc(model.created_at),
            updated_at: utc(model.updated_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub body: String,
    pub kind: String,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<entity::notifications::Model> for Notification {
    fn from(model: entity::notifications::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            title: model.title,
            body: model.body,
            kind: model.kind,
            is_read: model.is_read,
            read_at: utc_opt(model.read_at),
            created_at: utc(model.created_at),
        }
    }
}
