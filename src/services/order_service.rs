use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, FromQueryResult,
    JoinType, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set,
    TransactionTrait,
};
use sea_orm::sea_query::{Expr, LockType};
use uuid::Uuid;

use crate::{
    audit,
    dto::orders::{CheckoutRequest, CheckoutResponse, OrderList, OrderWithItems},
    enums::{CouponScope, OrderPaymentStatus, OrderStatus, PaymentPurpose},
    error::{AppError, AppResult},
    middleware::{auth::AuthUser, currency::DetectedCurrency},
    models::{Order, OrderItem, Payment},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::{
        coupon_service,
        payment_service::{self, BaseLineItem, NewPayment},
    },
    state::AppState,
    entity::{
        cart_items::{self, Column as CartCol, Entity as CartItems},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        order_items::{ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems},
        products::{Column as ProdCol, Entity as Products},
    },
    validation::Validator,
};

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(OrderCol::Status.eq(status.clone()));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
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
    Ok(ApiResponse::success(
        "Ok",
        OrderList { items: orders },
        Some(meta),
    ))
}

#[derive(Debug, FromQueryResult)]
struct CartProductRow {
    product_id: Uuid,
    quantity: i32,
    name: String,
    price: i64,
    stock: i32,
    is_active: bool,
}

/// Checks every cart line can be bought and returns the subtotal.
fn cart_subtotal(rows: &[CartProductRow]) -> AppResult<i64> {
    if rows.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }

    let mut subtotal: i64 = 0;
    for row in rows {
        if !row.is_active {
            return Err(AppError::BadRequest(format!(
                "{} is no longer available",
                row.name
            )));
        }
        if row.quantity <= 0 {
            return Err(AppError::BadRequest("Cart has invalid quantity".into()));
        }
        if row.stock < row.quantity {
            return Err(AppError::BadRequest(format!(
                "Insufficient stock for {}",
                row.name
            )));
        }
        subtotal += row.price * (row.quantity as i64);
    }
    Ok(subtotal)
}

/// Turns the cart into a pending order, reserves stock and opens a provider
/// checkout in the visitor's currency.
pub async fn checkout(
    state: &AppState,
    user: &AuthUser,
    currency: DetectedCurrency,
    payload: CheckoutRequest,
) -> AppResult<ApiResponse<CheckoutResponse>> {
    Validator::new()
        .required(&payload.shipping_address, "shipping_address")
        .finish()?;
    let gateway = payment_service::gateway_for(state, payload.provider, currency.currency)?;

    let txn = state.orm.begin().await?;

    let rows = CartItems::find()
        .select_only()
        .column_as(CartCol::ProductId, "product_id")
        .column_as(CartCol::Quantity, "quantity")
        .join(JoinType::InnerJoin, cart_items::Relation::Products.def())
        .column_as(ProdCol::Name, "name")
        .column_as(ProdCol::Price, "price")
        .column_as(ProdCol::Stock, "stock")
        .column_as(ProdCol::IsActive, "is_active")
        .filter(CartCol::UserId.eq(user.user_id))
        .lock(LockType::Update)
        .into_model::<CartProductRow>()
        .all(&txn)
        .await?;

    let subtotal = cart_subtotal(&rows)?;

    let (coupon_id, discount_amount) = match payload
        .coupon_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
    {
        Some(code) => {
            let (coupon, discount) =
                coupon_service::reserve_coupon(&txn, user.user_id, code, CouponScope::Store, subtotal).await?;
            (Some(coupon.id), discount)
        }
        None => (None, 0),
    };
    let total_amount = subtotal - discount_amount;
    let charge_amount =
        payment_service::charge_amount(&state.config.currency.rates, total_amount, currency.currency)?;

    let now = Utc::now();
    let order_id = Uuid::new_v4();
    let invoice_number = build_invoice_number(order_id);

    let order = OrderActive {
        id: Set(order_id),
        user_id: Set(user.user_id),
        subtotal: Set(subtotal),
        discount_amount: Set(discount_amount),
        total_amount: Set(total_amount),
        currency: Set(currency.currency.code().to_string()),
        charge_amount: Set(charge_amount),
        status: Set(OrderStatus::Pending.into()),
        payment_status: Set(OrderPaymentStatus::Unpaid.into()),
        invoice_number: Set(invoice_number.clone()),
        shipping_address: Set(payload.shipping_address.trim().to_string()),
        coupon_id: Set(coupon_id),
        paid_at: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&txn)
    .await?;

    let mut order_items: Vec<OrderItem> = Vec::new();
    let mut line_items: Vec<BaseLineItem> = Vec::new();

    for row in &rows {
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(row.product_id),
            quantity: Set(row.quantity),
            price: Set(row.price),
            created_at: Set(now.into()),
        }
        .insert(&txn)
        .await?;

        order_items.push(item.into());
        line_items.push(BaseLineItem {
            name: row.name.clone(),
            quantity: row.quantity,
            unit_price: row.price,
        });

        // reserve stock until the payment settles
        Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).sub(row.quantity))
            .filter(ProdCol::Id.eq(row.product_id))
            .exec(&txn)
            .await?;
    }

    CartItems::delete_many()
        .filter(CartCol::UserId.eq(user.user_id))
        .exec(&txn)
        .await?;

    let payment = payment_service::create_pending_payment(
        &txn,
        NewPayment {
            user_id: user.user_id,
            provider: payload.provider,
            purpose: PaymentPurpose::Order,
            reference_id: order.id,
            currency: currency.currency,
            amount: charge_amount,
            base_amount: total_amount,
            discount_amount,
            coupon_id,
        },
    )
    .await?;

    txn.commit().await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "checkout",
        "orders",
        serde_json::json!({
            "order_id": order.id,
            "payment_id": payment.id,
            "total_amount": total_amount,
            "currency": currency.currency,
        }),
    )
    .await;

    let payment = payment_service::open_checkout(
        state,
        gateway.as_ref(),
        payment,
        &format!("Order {invoice_number}"),
        &line_items,
    )
    .await?;

    Ok(ApiResponse::success(
        "Checkout started",
        CheckoutResponse {
            order: order.into(),
            items: order_items,
            payment: Payment::from(payment),
        },
        Some(Meta::empty()),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let items = order_items(&state.orm, order.id).await?;

    Ok(ApiResponse::success(
        "OK",
        OrderWithItems {
            order: order.into(),
            items,
        },
        Some(Meta::empty()),
    ))
}

pub async fn order_items<C: ConnectionTrait>(conn: &C, order_id: Uuid) -> AppResult<Vec<OrderItem>> {
    Ok(OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .order_by_asc(OrderItemCol::CreatedAt)
        .all(conn)
        .await?
        .into_iter()
        .map(OrderItem::from)
        .collect())
}

async fn lock_order<C: ConnectionTrait>(conn: &C, order_id: Uuid) -> AppResult<Option<OrderModel>> {
    Ok(Orders::find_by_id(order_id)
        .lock(LockType::Update)
        .one(conn)
        .await?)
}

/// Payment approved: a pending order moves to `paid`. Orders that were
/// closed in the meantime are left alone.
pub async fn mark_paid<C: ConnectionTrait>(conn: &C, order_id: Uuid) -> AppResult<()> {
    let Some(order) = lock_order(conn, order_id).await? else {
        tracing::warn!(order_id = %order_id, "paid payment references a missing order");
        return Ok(());
    };
    if order.status != OrderStatus::Pending.as_str() {
        tracing::warn!(
            order_id = %order_id,
            status = %order.status,
            "payment approved for an order that is no longer pending; refund it from the provider"
        );
        return Ok(());
    }
    let mut active: OrderActive = order.into();
    let now = Utc::now();
    active.status = Set(OrderStatus::Paid.into());
    active.payment_status = Set(OrderPaymentStatus::Paid.into());
    active.paid_at = Set(Some(now.into()));
    active.updated_at = Set(now.into());
    active.update(conn).await?;
    Ok(())
}

/// Payment failed or timed out: reserved stock goes back and the order is cancelled.
pub async fn release_order<C: ConnectionTrait>(conn: &C, order_id: Uuid) -> AppResult<()> {
    let Some(order) = lock_order(conn, order_id).await? else {
        return Ok(());
    };
    if order.status != OrderStatus::Pending.as_str() {
        return Ok(());
    }

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .all(conn)
        .await?;
    for item in &items {
        Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).add(item.quantity))
            .filter(ProdCol::Id.eq(item.product_id))
            .exec(conn)
            .await?;
    }

    let mut active: OrderActive = order.into();
    active.status = Set(OrderStatus::Cancelled.into());
    active.payment_status = Set(OrderPaymentStatus::Failed.into());
    active.updated_at = Set(Utc::now().into());
    active.update(conn).await?;
    tracing::info!(order_id = %order_id, lines = items.len(), "order cancelled and stock released");
    Ok(())
}

pub async fn mark_refunded<C: ConnectionTrait>(conn: &C, order_id: Uuid) -> AppResult<()> {
    let Some(order) = lock_order(conn, order_id).await? else {
        return Ok(());
    };
    let mut active: OrderActive = order.into();
    active.payment_status = Set(OrderPaymentStatus::Refunded.into());
    active.updated_at = Set(Utc::now().into());
    active.update(conn).await?;
    Ok(())
}

fn build_invoice_number(order_id: Uuid) -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix = order_id.simple().to_string().to_uppercase();
    format!("INV-{}-{}", date, &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, quantity: i32, price: i64, stock: i32, is_active: bool) -> CartProductRow {
        CartProductRow {
            product_id: Uuid::new_v4(),
            quantity,
            name: name.into(),
            price,
            stock,
            is_active,
        }
    }

    #[test]
    fn subtotal_sums_lines() {
        let rows = vec![row("Mat", 2, 15_000, 5, true), row("Band", 1, 4_500, 1, true)];
        assert_eq!(cart_subtotal(&rows).unwrap(), 34_500);
    }

    #[test]
    fn rejects_empty_inactive_and_short_stock() {
        assert!(matches!(cart_subtotal(&[]), Err(AppError::BadRequest(_))));
        assert!(matches!(
            cart_subtotal(&[row("Mat", 1, 100, 5, false)]),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            cart_subtotal(&[row("Mat", 3, 100, 2, true)]),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn invoice_numbers_carry_date_and_id_prefix() {
        let id = Uuid::parse_str("a1b2c3d4-0000-0000-0000-000000000000").unwrap();
        let invoice = build_invoice_number(id);
        assert!(invoice.starts_with("INV-"));
        assert!(invoice.ends_with("-A1B2C3D4"));
        assert_eq!(invoice.len(), "INV-20260101-A1B2C3D4".len());
    }
}
