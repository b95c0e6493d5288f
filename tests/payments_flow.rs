mod common;

use std::collections::HashMap;

use axum::http::HeaderMap;
use chrono::Utc;
use fitness_platform_api::{
    currency::Currency,
    dto::{
        cart::AddToCartRequest,
        coupons::CreateCouponRequest,
        notifications::NotificationQuery,
        orders::{CheckoutRequest, UpdateOrderStatusRequest},
        programmes::{CreateProgrammeRequest, PurchaseProgrammeRequest},
        subscriptions::{CreatePlanRequest, SubscribeRequest},
    },
    entity::{
        coupon_redemptions::{Column as RedemptionCol, Entity as CouponRedemptions},
        coupons::Entity as Coupons,
        orders::Entity as Orders,
        payments::Entity as Payments,
        products::{ActiveModel as ProductActive, Entity as Products},
        users::ActiveModel as UserActive,
    },
    enums::{CouponScope, DiscountType, PaymentProvider},
    error::AppError,
    jobs::payment_cleanup,
    middleware::{
        auth::AuthUser,
        currency::{CurrencySource, DetectedCurrency},
    },
    services::{
        admin_service, cart_service, coupon_service, coupon_usage_service, notification_service,
        order_service, payment_service, programme_service, subscription_service,
    },
    state::AppState,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set, Statement,
    TransactionTrait,
};
use serde_json::json;
use uuid::Uuid;

const EGP: DetectedCurrency = DetectedCurrency {
    currency: Currency::Egp,
    source: CurrencySource::Default,
};

// One test body so the shared tables are never truncated under a running flow.
#[tokio::test]
async fn payment_flows() -> anyhow::Result<()> {
    let Some(state) = common::db_state().await? else {
        return Ok(());
    };

    checkout_webhook_settles_once(&state).await?;
    cleanup_expires_stale_checkout(&state).await?;
    admin_cancel_releases_reserved_stock(&state).await?;
    coupon_limit_counts_pending_checkouts(&state).await?;
    subscription_activates_on_payment(&state).await?;
    programme_purchase_and_refund(&state).await?;
    Ok(())
}

async fn checkout_webhook_settles_once(state: &AppState) -> anyhow::Result<()> {
    let user = create_user(state, "user", "buyer@example.com").await?;
    let admin = create_user(state, "admin", "admin@example.com").await?;
    let product = create_product(state, "Kettlebell 16kg", 1000, 10).await?;

    let coupon = coupon_service::create_coupon(
        state,
        &admin,
        CreateCouponRequest {
            code: "save10".into(),
            description: None,
            discount_type: DiscountType::Percentage,
            discount_value: 10,
            scope: Some(CouponScope::Store),
            max_uses: Some(5),
            max_uses_per_user: Some(1),
            min_order_amount: None,
            starts_at: None,
            expires_at: None,
            is_active: None,
        },
    )
    .await?
    .data
    .expect("coupon");
    assert_eq!(coupon.code, "SAVE10");

    cart_service::add_to_cart(
        state,
        &user,
        AddToCartRequest {
            product_id: product,
            quantity: 2,
        },
    )
    .await?;

    let checkout = order_service::checkout(
        state,
        &user,
        EGP,
        CheckoutRequest {
            shipping_address: "12 Nile St, Cairo".into(),
            provider: PaymentProvider::Paymob,
            coupon_code: Some("save10".into()),
        },
    )
    .await?
    .data
    .expect("checkout");

    assert_eq!(checkout.order.subtotal, 2000);
    assert_eq!(checkout.order.discount_amount, 200);
    assert_eq!(checkout.order.total_amount, 1800);
    assert_eq!(checkout.payment.status, "pending");
    assert!(checkout.payment.checkout_url.is_some());
    assert_eq!(stock_of(state, product).await?, 8, "stock is reserved at checkout");

    // Coupon usage is only counted once the payment is approved.
    let before = Coupons::find_by_id(coupon.id).one(&state.orm).await?.expect("coupon");
    assert_eq!(before.total_uses, 0);

    for _ in 0..2 {
        let ack = payment_service::handle_webhook(
            state,
            PaymentProvider::Paymob,
            HashMap::new(),
            HeaderMap::new(),
            json!({ "payment_id": checkout.payment.id.to_string(), "status": "paid" }),
        )
        .await?
        .data
        .expect("ack");
        assert_eq!(ack.status.as_deref(), Some("paid"));
    }

    let order = Orders::find_by_id(checkout.order.id).one(&state.orm).await?.expect("order");
    assert_eq!(order.status, "paid");
    assert_eq!(order.payment_status, "paid");

    let after = Coupons::find_by_id(coupon.id).one(&state.orm).await?.expect("coupon");
    assert_eq!(after.total_uses, 1, "duplicate webhook must not double count");

    let report = coupon_usage_service::reconcile(state, coupon.id).await?;
    assert_eq!(report.computed, 1);
    assert!(!report.corrected);

    // Drift the cache and let reconcile repair it.
    state
        .orm
        .execute(Statement::from_sql_and_values(
            state.orm.get_database_backend(),
            "UPDATE coupons SET total_uses = 4 WHERE id = $1",
            [coupon.id.into()],
        ))
        .await?;
    let report = coupon_usage_service::reconcile(state, coupon.id).await?;
    assert_eq!((report.cached, report.computed, report.corrected), (4, 1, true));

    let notifications = notification_service::list_notifications(
        state,
        &user,
        NotificationQuery::default(),
    )
    .await?
    .data
    .expect("notifications");
    assert!(notifications.unread_count >= 1);

    let unknown = payment_service::handle_webhook(
        state,
        PaymentProvider::Paymob,
        HashMap::new(),
        HeaderMap::new(),
        json!({ "payment_id": Uuid::new_v4().to_string(), "status": "paid" }),
    )
    .await?
    .data
    .expect("ack");
    assert_eq!(unknown.payment_id, None);

    let refunded = payment_service::refund_payment(state, &admin, checkout.payment.id)
        .await?
        .data
        .expect("refund");
    assert_eq!(refunded.status, "refunded");
    let order = Orders::find_by_id(checkout.order.id).one(&state.orm).await?.expect("order");
    assert_eq!(order.payment_status, "refunded");
    let after_refund = Coupons::find_by_id(coupon.id).one(&state.orm).await?.expect("coupon");
    assert_eq!(after_refund.total_uses, 0, "refund gives the coupon use back");

    Ok(())
}

async fn cleanup_expires_stale_checkout(state: &AppState) -> anyhow::Result<()> {
    let user = create_user(state, "user", "slowpayer@example.com").await?;
    let product = create_product(state, "Yoga Mat", 500, 4).await?;

    cart_service::add_to_cart(
        state,
        &user,
        AddToCartRequest {
            product_id: product,
            quantity: 3,
        },
    )
    .await?;
    let checkout = order_service::checkout(
        state,
        &user,
        EGP,
        CheckoutRequest {
            shipping_address: "5 Tahrir Sq, Cairo".into(),
            provider: PaymentProvider::Paymob,
            coupon_code: None,
        },
    )
    .await?
    .data
    .expect("checkout");
    assert_eq!(stock_of(state, product).await?, 1);

    // Fresh payments are left alone.
    let report = payment_cleanup::run_once(state).await?;
    assert_eq!(report.expired, 0);

    state
        .orm
        .execute(Statement::from_sql_and_values(
            state.orm.get_database_backend(),
            "UPDATE payments SET created_at = now() - interval '2 hours' WHERE id = $1",
            [checkout.payment.id.into()],
        ))
        .await?;

    let report = payment_cleanup::run_once(state).await?;
    assert_eq!(report.expired, 1);
    assert_eq!(report.errors, 0);

    let payment = Payments::find_by_id(checkout.payment.id)
        .one(&state.orm)
        .await?
        .expect("payment");
    assert_eq!(payment.status, "failed");
    assert_eq!(payment.failure_reason.as_deref(), Some(payment_cleanup::TIMEOUT_REASON));

    let order = Orders::find_by_id(checkout.order.id).one(&state.orm).await?.expect("order");
    assert_eq!(order.status, "cancelled");
    assert_eq!(stock_of(state, product).await?, 4, "stock is released on timeout");

    // A late success callback cannot revive a failed payment.
    let ack = payment_service::handle_webhook(
        state,
        PaymentProvider::Paymob,
        HashMap::new(),
        HeaderMap::new(),
        json!({ "payment_id": checkout.payment.id.to_string(), "status": "paid" }),
    )
    .await?
    .data
    .expect("ack");
    assert_eq!(ack.status.as_deref(), Some("failed"));

    Ok(())
}

async fn subscription_activates_on_payment(state: &AppState) -> anyhow::Result<()> {
    let user = create_user(state, "user", "member@example.com").await?;
    let admin = create_user(state, "admin", "coach@example.com").await?;

    let plan = subscription_service::create_plan(
        state,
        &admin,
        CreatePlanRequest {
            name: "Monthly".into(),
            description: None,
            price: 80_000,
            duration_days: 30,
            is_active: None,
        },
    )
    .await?
    .data
    .expect("plan");

    let pending = subscription_service::subscribe(
        state,
        &user,
        EGP,
        SubscribeRequest {
            plan_id: plan.id,
            provider: PaymentProvider::Paymob,
            coupon_code: None,
        },
    )
    .await?
    .data
    .expect("subscription");
    assert_eq!(pending.subscription.status, "pending");
    assert_eq!(pending.payment.amount, 80_000);

    payment_service::handle_webhook(
        state,
        PaymentProvider::Paymob,
        HashMap::new(),
        HeaderMap::new(),
        json!({ "payment_id": pending.payment.id.to_string(), "status": "paid" }),
    )
    .await?;

    let mine = subscription_service::my_subscriptions(state, &user)
        .await?
        .data
        .expect("subscriptions");
    let active = mine
        .items
        .iter()
        .find(|s| s.id == pending.subscription.id)
        .expect("subscription listed");
    assert_eq!(active.status, "active");
    let (starts, ends) = (active.starts_at.expect("start"), active.ends_at.expect("end"));
    assert_eq!((ends - starts).num_days(), 30);

    payment_service::refund_payment(state, &admin, pending.payment.id).await?;
    let mine = subscription_service::my_subscriptions(state, &user)
        .await?
        .data
        .expect("subscriptions");
    let revoked = mine
        .items
        .iter()
        .find(|s| s.id == pending.subscription.id)
        .expect("subscription listed");
    assert_eq!(revoked.status, "cancelled");

    Ok(())
}

async fn admin_cancel_releases_reserved_stock(state: &AppState) -> anyhow::Result<()> {
    let user = create_user(state, "user", "changedmind@example.com").await?;
    let admin = create_user(state, "admin", "ops@example.com").await?;
    let product = create_product(state, "Foam Roller", 700, 5).await?;

    cart_service::add_to_cart(
        state,
        &user,
        AddToCartRequest {
            product_id: product,
            quantity: 3,
        },
    )
    .await?;
    let checkout = order_service::checkout(
        state,
        &user,
        EGP,
        CheckoutRequest {
            shipping_address: "9 Corniche Rd, Alexandria".into(),
            provider: PaymentProvider::Paymob,
            coupon_code: None,
        },
    )
    .await?
    .data
    .expect("checkout");
    assert_eq!(stock_of(state, product).await?, 2);

    let shipped = admin_service::update_order_status(
        state,
        &admin,
        checkout.order.id,
        UpdateOrderStatusRequest {
            status: "shipped".into(),
        },
    )
    .await;
    assert!(
        matches!(shipped, Err(AppError::BadRequest(_))),
        "an unpaid order cannot ship"
    );

    let order = admin_service::update_order_status(
        state,
        &admin,
        checkout.order.id,
        UpdateOrderStatusRequest {
            status: "cancelled".into(),
        },
    )
    .await?
    .data
    .expect("order");
    assert_eq!(order.status, "cancelled");
    assert_eq!(stock_of(state, product).await?, 5, "cancel returns reserved stock");

    let payment = Payments::find_by_id(checkout.payment.id)
        .one(&state.orm)
        .await?
        .expect("payment");
    assert_eq!(payment.status, "cancelled");
    assert_eq!(payment.failure_reason.as_deref(), Some(admin_service::ADMIN_CANCEL_REASON));

    // The sweep no longer sees it, so stock is not returned twice.
    state
        .orm
        .execute(Statement::from_sql_and_values(
            state.orm.get_database_backend(),
            "UPDATE payments SET created_at = now() - interval '2 hours' WHERE id = $1",
            [checkout.payment.id.into()],
        ))
        .await?;
    let report = payment_cleanup::run_once(state).await?;
    assert_eq!(report.expired, 0);
    assert_eq!(stock_of(state, product).await?, 5);

    let ack = payment_service::handle_webhook(
        state,
        PaymentProvider::Paymob,
        HashMap::new(),
        HeaderMap::new(),
        json!({ "payment_id": checkout.payment.id.to_string(), "status": "paid" }),
    )
    .await?
    .data
    .expect("ack");
    assert_eq!(ack.status.as_deref(), Some("cancelled"));
    let order = Orders::find_by_id(checkout.order.id).one(&state.orm).await?.expect("order");
    assert_eq!(order.status, "cancelled");

    Ok(())
}

async fn coupon_limit_counts_pending_checkouts(state: &AppState) -> anyhow::Result<()> {
    let admin = create_user(state, "admin", "promo@example.com").await?;
    let product = create_product(state, "Skipping Rope", 1000, 10).await?;
    coupon_service::create_coupon(
        state,
        &admin,
        CreateCouponRequest {
            code: "once".into(),
            description: None,
            discount_type: DiscountType::Fixed,
            discount_value: 100,
            scope: Some(CouponScope::Store),
            max_uses: Some(1),
            max_uses_per_user: None,
            min_order_amount: None,
            starts_at: None,
            expires_at: None,
            is_active: None,
        },
    )
    .await?;

    let first = create_user(state, "user", "first@example.com").await?;
    let second = create_user(state, "user", "second@example.com").await?;
    let third = create_user(state, "user", "third@example.com").await?;
    for buyer in [&first, &second, &third] {
        cart_service::add_to_cart(
            state,
            buyer,
            AddToCartRequest {
                product_id: product,
                quantity: 1,
            },
        )
        .await?;
    }

    let held = checkout_with_coupon(state, &first, "once").await?;

    let refused = checkout_with_coupon(state, &second, "once").await;
    assert!(
        matches!(&refused, Err(AppError::BadRequest(msg)) if msg.contains("usage limit")),
        "a pending checkout holds the only use: {refused:?}"
    );
    assert_eq!(stock_of(state, product).await?, 9, "refused checkout reserves nothing");

    payment_service::handle_webhook(
        state,
        PaymentProvider::Paymob,
        HashMap::new(),
        HeaderMap::new(),
        json!({ "payment_id": held.payment.id.to_string(), "status": "failed" }),
    )
    .await?;

    let second_checkout = checkout_with_coupon(state, &second, "once").await?;
    payment_service::handle_webhook(
        state,
        PaymentProvider::Paymob,
        HashMap::new(),
        HeaderMap::new(),
        json!({ "payment_id": second_checkout.payment.id.to_string(), "status": "paid" }),
    )
    .await?;

    let coupon = Coupons::find_by_id(second_checkout.order.coupon_id.expect("coupon applied"))
        .one(&state.orm)
        .await?
        .expect("coupon");
    assert_eq!(coupon.total_uses, 1);

    let refused = checkout_with_coupon(state, &third, "once").await;
    assert!(matches!(refused, Err(AppError::BadRequest(_))));

    Ok(())
}

async fn checkout_with_coupon(
    state: &AppState,
    user: &AuthUser,
    code: &str,
) -> Result<fitness_platform_api::dto::orders::CheckoutResponse, AppError> {
    let resp = order_service::checkout(
        state,
        user,
        EGP,
        CheckoutRequest {
            shipping_address: "3 Garden City, Cairo".into(),
            provider: PaymentProvider::Paymob,
            coupon_code: Some(code.into()),
        },
    )
    .await?;
    resp.data.ok_or(AppError::NotFound)
}

async fn programme_purchase_and_refund(state: &AppState) -> anyhow::Result<()> {
    let user = create_user(state, "user", "athlete@example.com").await?;
    let admin = create_user(state, "admin", "headcoach@example.com").await?;

    let coupon = coupon_service::create_coupon(
        state,
        &admin,
        CreateCouponRequest {
            code: "coach20".into(),
            description: None,
            discount_type: DiscountType::Percentage,
            discount_value: 20,
            scope: Some(CouponScope::Programme),
            max_uses: None,
            max_uses_per_user: None,
            min_order_amount: None,
            starts_at: None,
            expires_at: None,
            is_active: None,
        },
    )
    .await?
    .data
    .expect("coupon");

    let programme = programme_service::create_programme(
        state,
        &admin,
        CreateProgrammeRequest {
            title: "12-Week Strength".into(),
            description: None,
            price: 50_000,
            duration_weeks: Some(12),
            is_active: None,
        },
    )
    .await?
    .data
    .expect("programme");

    let purchase = |code: Option<&str>| PurchaseProgrammeRequest {
        provider: PaymentProvider::Paymob,
        coupon_code: code.map(str::to_string),
    };

    let pending = programme_service::purchase_programme(state, &user, EGP, programme.id, purchase(Some("coach20")))
        .await?
        .data
        .expect("purchase");
    assert_eq!(pending.purchase.status, "pending");
    assert_eq!(pending.payment.amount, 40_000);

    payment_service::handle_webhook(
        state,
        PaymentProvider::Paymob,
        HashMap::new(),
        HeaderMap::new(),
        json!({ "payment_id": pending.payment.id.to_string(), "status": "paid" }),
    )
    .await?;

    let owned = purchase_status(state, &user, pending.purchase.id).await?;
    assert_eq!(owned, "active");

    let again = programme_service::purchase_programme(state, &user, EGP, programme.id, purchase(None)).await;
    assert!(matches!(again, Err(AppError::Conflict(_))), "already owned");

    let not_admin = payment_service::refund_payment(state, &user, pending.payment.id).await;
    assert!(matches!(not_admin, Err(AppError::Forbidden)));

    let refunded = payment_service::refund_payment(state, &admin, pending.payment.id)
        .await?
        .data
        .expect("refund");
    assert_eq!(refunded.status, "refunded");
    assert_eq!(purchase_status(state, &user, pending.purchase.id).await?, "cancelled");

    let coupon_after = Coupons::find_by_id(coupon.id).one(&state.orm).await?.expect("coupon");
    assert_eq!(coupon_after.total_uses, 0);
    let redemption = CouponRedemptions::find()
        .filter(RedemptionCol::CouponId.eq(coupon.id))
        .filter(RedemptionCol::UserId.eq(user.user_id))
        .one(&state.orm)
        .await?
        .expect("redemption row");
    assert_eq!(redemption.usage_count, 0);

    let twice = payment_service::refund_payment(state, &admin, pending.payment.id).await;
    assert!(matches!(twice, Err(AppError::BadRequest(_))));

    // With nothing left to release, a stale cache is not pushed further down.
    state
        .orm
        .execute(Statement::from_sql_and_values(
            state.orm.get_database_backend(),
            "UPDATE coupons SET total_uses = 3 WHERE id = $1",
            [coupon.id.into()],
        ))
        .await?;
    let txn = state.orm.begin().await?;
    coupon_usage_service::release_redemption(&txn, user.user_id, coupon.id).await?;
    txn.commit().await?;
    let cached = Coupons::find_by_id(coupon.id).one(&state.orm).await?.expect("coupon");
    assert_eq!(cached.total_uses, 3);
    let report = coupon_usage_service::reconcile(state, coupon.id).await?;
    assert_eq!((report.cached, report.computed, report.corrected), (3, 0, true));

    Ok(())
}

async fn purchase_status(state: &AppState, user: &AuthUser, purchase_id: Uuid) -> anyhow::Result<String> {
    let mine = programme_service::my_purchases(state, user)
        .await?
        .data
        .expect("purchases");
    Ok(mine
        .items
        .into_iter()
        .find(|p| p.id == purchase_id)
        .map(|p| p.status)
        .unwrap_or_default())
}

async fn create_user(state: &AppState, role: &str, email: &str) -> anyhow::Result<AuthUser> {
    let now = Utc::now();
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        password_hash: Set("dummy".into()),
        full_name: Set("Flow Tester".into()),
        phone: Set(None),
        role: Set(role.to_string()),
        preferred_currency: Set(None),
        is_active: Set(true),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&state.orm)
    .await?;

    Ok(AuthUser {
        user_id: user.id,
        role: user.role,
    })
}

async fn create_product(state: &AppState, name: &str, price: i64, stock: i32) -> anyhow::Result<Uuid> {
    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        description: Set(None),
        price: Set(price),
        stock: Set(stock),
        image_url: Set(None),
        is_active: Set(true),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;
    Ok(product.id)
}

async fn stock_of(state: &AppState, product_id: Uuid) -> anyhow::Result<i32> {
    Ok(Products::find_by_id(product_id)
        .one(&state.orm)
        .await?
        .map(|p| p.stock)
        .unwrap_or_default())
}
