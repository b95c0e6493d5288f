use uuid::Uuid;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, TransactionTrait,
};
use sea_orm::sea_query::LockType;
use sea_orm::ActiveValue::Set;

use crate::{
    audit,
    entity::{
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders},
        products::{ActiveModel as ProductActive, Column as ProdCol, Entity as Products},
    },
    dto::{
        admin::{CurrencyTotal, DashboardStats, StatusCount},
        orders::{OrderList, OrderWithItems, UpdateOrderStatusRequest},
        payments::CleanupReport,
        products::{InventoryAdjustRequest, LowStockQuery, ProductList},
    },
    enums::{LeadStatus, OrderPaymentStatus, OrderStatus, PaymentPurpose, PaymentStatus, SubscriptionStatus},
    error::{AppError, AppResult},
    jobs::payment_cleanup,
    middleware::auth::{AuthUser, ensure_admin},
    models::{Order, Product},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::{
        order_service,
        payment_service::{self, Outcome},
    },
    state::AppState,
};

pub const DEFAULT_LOW_STOCK_THRESHOLD: i32 = 5;

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination().normalize();

    let mut condition = Condition::all();
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(OrderCol::Status.eq(status.clone()));
    }

    let mut finder = Orders::find().filter(condition);

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Order::from)
        .collect();

    let meta = Meta::new(page, limit, total);

    let order_list = OrderList { items: orders };

    Ok(ApiResponse::success("Orders", order_list, Some(meta)))
}

pub async fn get_order_admin(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_admin(user)?;
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .map(Order::from);
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let items = order_service::order_items(&state.orm, order.id).await?;

    let data = OrderWithItems { order, items };
    Ok(ApiResponse::success(
        "Order found",
        data,
        Some(Meta::empty()),
    ))
}

pub const ADMIN_CANCEL_REASON: &str = "cancelled by admin";

/// How an admin status change is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    /// Write the fulfilment status.
    Set,
    /// Cancel the pending payment; the order and its stock follow.
    CancelPayment,
}

/// Fulfilment status only; payment state is owned by the payment flow.
/// An order still waiting on its payment can only be cancelled, and that
/// goes through the payment so the reserved stock is released.
pub fn plan_status_change(payment_status: &str, target: OrderStatus) -> AppResult<StatusChange> {
    match OrderPaymentStatus::parse(payment_status) {
        Some(OrderPaymentStatus::Unpaid) => match target {
            OrderStatus::Cancelled => Ok(StatusChange::CancelPayment),
            _ => Err(AppError::BadRequest(
                "Order is awaiting payment; it can only be cancelled".into(),
            )),
        },
        Some(OrderPaymentStatus::Failed) => match target {
            OrderStatus::Cancelled => Ok(StatusChange::Set),
            _ => Err(AppError::BadRequest(
                "Order was cancelled after its payment failed".into(),
            )),
        },
        _ => match target {
            OrderStatus::Pending => Err(AppError::BadRequest(
                "A paid order cannot go back to pending".into(),
            )),
            _ => Ok(StatusChange::Set),
        },
    }
}

pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;
    let status = OrderStatus::parse(&payload.status)
        .ok_or_else(|| AppError::BadRequest("Invalid order status".into()))?;

    let existing = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let order = match plan_status_change(&existing.payment_status, status)? {
        StatusChange::Set => {
            let mut active: OrderActive = existing.into();
            active.status = Set(status.into());
            active.updated_at = Set(Utc::now().into());
            active.update(&state.orm).await?
        }
        StatusChange::CancelPayment => {
            match payment_service::pending_payment_for(&state.orm, PaymentPurpose::Order, id).await? {
                Some(payment) => {
                    let settled = payment_service::apply_outcome(
                        state,
                        payment.id,
                        Outcome::Cancelled(ADMIN_CANCEL_REASON.into()),
                    )
                    .await?;
                    if settled.status != PaymentStatus::Cancelled.as_str() {
                        return Err(AppError::Conflict(
                            "Payment settled before the order could be cancelled".into(),
                        ));
                    }
                }
                None => {
                    let txn = state.orm.begin().await?;
                    order_service::release_order(&txn, id).await?;
                    txn.commit().await?;
                }
            }
            Orders::find_by_id(id)
                .one(&state.orm)
                .await?
                .ok_or(AppError::NotFound)?
        }
    };

    audit::record(
        &state.orm,
        Some(user.user_id),
        "order_status_update",
        "orders",
        serde_json::json!({ "order_id": order.id, "status": order.status }),
    )
    .await;

    Ok(ApiResponse::success(
        "Order updated",
        order.into(),
        Some(Meta::empty()),
    ))
}

pub async fn list_low_stock(
    state: &AppState,
    user: &AuthUser,
    query: LowStockQuery,
) -> AppResult<ApiResponse<ProductList>> {
    ensure_admin(user)?;
    let threshold = query.threshold.unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD);
    let (page, limit, offset) = query.pagination().normalize();

    let mut finder = Products::find().filter(ProdCol::Stock.lte(threshold));
    finder = finder
        .order_by_asc(ProdCol::Stock)
        .order_by_desc(ProdCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Product::from)
        .collect();

    let data = ProductList { items };
    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Low stock", data, Some(meta)))
}

pub fn adjusted_stock(stock: i32, delta: i32) -> AppResult<i32> {
    let new_stock = stock
        .checked_add(delta)
        .ok_or_else(|| AppError::BadRequest("stock adjustment is out of range".into()))?;
    if new_stock < 0 {
        return Err(AppError::BadRequest("stock cannot be negative".into()));
    }
    Ok(new_stock)
}

pub async fn adjust_inventory(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: InventoryAdjustRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    if payload.delta == 0 {
        return Err(AppError::BadRequest("delta must not be 0".into()));
    }

    let txn = state.orm.begin().await?;
    let product = Products::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    let product = match product {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };

    let new_stock = adjusted_stock(product.stock, payload.delta)?;

    let mut active: ProductActive = product.into();
    active.stock = Set(new_stock);
    let updated = active.update(&txn).await?;

    txn.commit().await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "inventory_adjust",
        "products",
        serde_json::json!({ "product_id": updated.id, "delta": payload.delta }),
    )
    .await;

    Ok(ApiResponse::success(
        "Inventory updated",
        updated.into(),
        Some(Meta::empty()),
    ))
}

pub async fn dashboard_stats(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<DashboardStats>> {
    ensure_admin(user)?;

    let (total_users,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(&state.pool)
        .await?;

    let (active_subscriptions,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM subscriptions WHERE status = $1 AND ends_at > now()")
            .bind(SubscriptionStatus::Active.as_str())
            .fetch_one(&state.pool)
            .await?;

    let orders_by_status = sqlx::query_as::<_, (String, i64)>(
        "SELECT status, COUNT(*) FROM orders GROUP BY status ORDER BY status",
    )
    .fetch_all(&state.pool)
    .await?
    .into_iter()
    .map(|(status, count)| StatusCount { status, count })
    .collect();

    let revenue_by_currency = sqlx::query_as::<_, (String, i64)>(
        r#"
        SELECT currency, COALESCE(SUM(amount), 0)::BIGINT
        FROM payments
        WHERE status = $1
        GROUP BY currency
        ORDER BY currency
        "#,
    )
    .bind(PaymentStatus::Paid.as_str())
    .fetch_all(&state.pool)
    .await?
    .into_iter()
    .map(|(currency, amount)| CurrencyTotal { currency, amount })
    .collect();

    let (new_leads,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM leads WHERE status = $1")
        .bind(LeadStatus::New.as_str())
        .fetch_one(&state.pool)
        .await?;

    let (low_stock_products,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM products WHERE is_active AND stock <= $1")
            .bind(DEFAULT_LOW_STOCK_THRESHOLD)
            .fetch_one(&state.pool)
            .await?;

    let recent_orders = Orders::find()
        .order_by_desc(OrderCol::CreatedAt)
        .limit(5)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Order::from)
        .collect();

    Ok(ApiResponse::success(
        "Dashboard",
        DashboardStats {
            total_users,
            active_subscriptions,
            orders_by_status,
            revenue_by_currency,
            new_leads,
            low_stock_products,
            recent_orders,
        },
        Some(Meta::empty()),
    ))
}

/// Runs one pass of the stale-payment sweep on demand.
pub async fn run_payment_cleanup(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CleanupReport>> {
    ensure_admin(user)?;
    let report = payment_cleanup::run_once(state).await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "payment_cleanup",
        "payments",
        serde_json::json!({ "examined": report.examined, "expired": report.expired, "errors": report.errors }),
    )
    .await;

    Ok(ApiResponse::success("Cleanup finished", report, Some(Meta::empty())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpaid_orders_only_cancel_through_their_payment() {
        assert_eq!(
            plan_status_change("unpaid", OrderStatus::Cancelled).unwrap(),
            StatusChange::CancelPayment
        );
        for target in [OrderStatus::Paid, OrderStatus::Shipped, OrderStatus::Completed] {
            assert!(matches!(
                plan_status_change("unpaid", target),
                Err(AppError::BadRequest(_))
            ));
        }
    }

    #[test]
    fn paid_orders_move_through_fulfilment() {
        assert_eq!(plan_status_change("paid", OrderStatus::Shipped).unwrap(), StatusChange::Set);
        assert_eq!(plan_status_change("paid", OrderStatus::Completed).unwrap(), StatusChange::Set);
        assert!(plan_status_change("paid", OrderStatus::Pending).is_err());
        assert!(plan_status_change("failed", OrderStatus::Shipped).is_err());
        assert_eq!(plan_status_change("failed", OrderStatus::Cancelled).unwrap(), StatusChange::Set);
    }

    #[test]
    fn stock_adjustment_is_bounded() {
        assert_eq!(adjusted_stock(5, 3).unwrap(), 8);
        assert_eq!(adjusted_stock(5, -5).unwrap(), 0);
        assert!(matches!(adjusted_stock(5, -6), Err(AppError::BadRequest(_))));
        assert!(matches!(adjusted_stock(5, i32::MAX), Err(AppError::BadRequest(_))));
        assert!(matches!(adjusted_stock(-1, i32::MIN), Err(AppError::BadRequest(_))));
    }
}
