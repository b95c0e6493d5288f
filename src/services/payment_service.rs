//! Payment rows and their single state transition.
//!
//! A payment is created `pending` together with the thing it pays for, then a
//! provider checkout is opened. Webhooks, the cleanup job and gateway failures
//! all end up in [`apply_outcome`], which only ever moves a pending payment.

use std::{collections::HashMap, sync::Arc};

use axum::http::HeaderMap;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
    sea_query::LockType,
};
use uuid::Uuid;

use crate::{
    audit,
    currency::{Currency, ExchangeRates},
    dto::payments::{PaymentList, PaymentListQuery, WebhookAck},
    entity::{
        payments::{self, Column as PaymentCol, Entity as Payments},
        users::Entity as Users,
    },
    enums::{PaymentProvider, PaymentPurpose, PaymentStatus},
    error::{AppError, AppResult},
    integrations::gateway::{
        CheckoutSession, Customer, LineItem, PaymentGateway, WebhookOutcome, WebhookRequest,
    },
    middleware::auth::{AuthUser, ensure_admin},
    models::Payment,
    response::{ApiResponse, Meta},
    services::{
        coupon_usage_service, notification_service, order_service, programme_service,
        subscription_service,
    },
    state::AppState,
};

/// Terminal result applied to a pending payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Paid,
    Failed(String),
    Cancelled(String),
}

impl Outcome {
    pub fn from_webhook(outcome: WebhookOutcome) -> Option<Self> {
        match outcome {
            WebhookOutcome::Paid => Some(Outcome::Paid),
            WebhookOutcome::Failed(reason) => Some(Outcome::Failed(reason)),
            WebhookOutcome::Ignored => None,
        }
    }

    fn status(&self) -> PaymentStatus {
        match self {
            Outcome::Paid => PaymentStatus::Paid,
            Outcome::Failed(_) => PaymentStatus::Failed,
            Outcome::Cancelled(_) => PaymentStatus::Cancelled,
        }
    }

    fn reason(&self) -> Option<&str> {
        match self {
            Outcome::Paid => None,
            Outcome::Failed(reason) | Outcome::Cancelled(reason) => Some(reason),
        }
    }
}

/// Everything needed to insert a pending payment.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub user_id: Uuid,
    pub provider: PaymentProvider,
    pub purpose: PaymentPurpose,
    pub reference_id: Uuid,
    pub currency: Currency,
    /// Charge in `currency` minor units.
    pub amount: i64,
    /// Amount after discount in base-currency minor units.
    pub base_amount: i64,
    pub discount_amount: i64,
    pub coupon_id: Option<Uuid>,
}

/// Line item priced in the base currency.
#[derive(Debug, Clone)]
pub struct BaseLineItem {
    pub name: String,
    pub quantity: i32,
    pub unit_price: i64,
}

pub fn charge_amount(rates: &ExchangeRates, base_amount: i64, currency: Currency) -> AppResult<i64> {
    rates
        .convert(base_amount, currency)
        .ok_or_else(|| AppError::BadRequest(format!("currency {currency} is not supported")))
}

/// Resolves the provider and checks it can charge in `currency`.
pub fn gateway_for(
    state: &AppState,
    provider: PaymentProvider,
    currency: Currency,
) -> AppResult<Arc<dyn PaymentGateway>> {
    let gateway = state.gateways.get(provider)?;
    if !gateway.supports(currency) || !state.config.currency.rates.supports(currency) {
        return Err(AppError::BadRequest(format!(
            "{provider} does not support payments in {currency}"
        )));
    }
    Ok(gateway)
}

/// Converts base-currency items for the provider. Falls back to a single
/// summary line when converted lines would not add up to the charge.
pub fn line_items(
    rates: &ExchangeRates,
    currency: Currency,
    items: &[BaseLineItem],
    amount: i64,
    description: &str,
) -> Vec<LineItem> {
    let converted: Option<Vec<LineItem>> = items
        .iter()
        .map(|item| {
            rates.convert(item.unit_price, currency).map(|unit_amount| LineItem {
                name: item.name.clone(),
                quantity: item.quantity,
                unit_amount,
            })
        })
        .collect();

    match converted {
        Some(lines)
            if !lines.is_empty()
                && lines.iter().map(|l| l.unit_amount * l.quantity as i64).sum::<i64>() == amount =>
        {
            lines
        }
        _ => vec![LineItem {
            name: description.to_string(),
            quantity: 1,
            unit_amount: amount,
        }],
    }
}

pub async fn create_pending_payment<C: ConnectionTrait>(conn: &C, new: NewPayment) -> AppResult<payments::Model> {
    let now = Utc::now();
    let payment = payments::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(new.user_id),
        provider: Set(new.provider.into()),
        purpose: Set(new.purpose.into()),
        reference_id: Set(new.reference_id),
        amount: Set(new.amount),
        currency: Set(new.currency.code().to_string()),
        base_amount: Set(new.base_amount),
        discount_amount: Set(new.discount_amount),
        coupon_id: Set(new.coupon_id),
        status: Set(PaymentStatus::Pending.into()),
        provider_reference: Set(None),
        checkout_url: Set(None),
        failure_reason: Set(None),
        paid_at: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(conn)
    .await?;
    Ok(payment)
}

fn frontend_url(state: &AppState, path: &str, payment_id: Uuid) -> String {
    format!(
        "{}/{}?payment_id={}",
        state.config.frontend_url.trim_end_matches('/'),
        path,
        payment_id
    )
}

/// Opens the provider checkout for a committed pending payment. A provider
/// failure fails the payment, which releases whatever it reserved.
pub async fn open_checkout(
    state: &AppState,
    gateway: &dyn PaymentGateway,
    payment: payments::Model,
    description: &str,
    items: &[BaseLineItem],
) -> AppResult<payments::Model> {
    let currency = Currency::parse(&payment.currency)
        .ok_or_else(|| AppError::BadRequest(format!("currency {} is not supported", payment.currency)))?;
    let user = Users::find_by_id(payment.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let session = CheckoutSession {
        payment_id: payment.id,
        amount: payment.amount,
        currency,
        description: description.to_string(),
        customer: Customer {
            email: user.email,
            full_name: user.full_name,
            phone: user.phone,
        },
        items: line_items(&state.config.currency.rates, currency, items, payment.amount, description),
        success_url: frontend_url(state, "payment/success", payment.id),
        cancel_url: frontend_url(state, "payment/cancelled", payment.id),
        failure_url: frontend_url(state, "payment/failed", payment.id),
    };

    match gateway.create_checkout(&session).await {
        Ok(checkout) => {
            let mut active: payments::ActiveModel = payment.into();
            active.provider_reference = Set(Some(checkout.reference));
            active.checkout_url = Set(Some(checkout.checkout_url));
            active.updated_at = Set(Utc::now().into());
            Ok(active.update(&state.orm).await?)
        }
        Err(err) => {
            tracing::error!(payment_id = %payment.id, provider = %payment.provider, error = %err, "checkout creation failed");
            if let Err(apply_err) =
                apply_outcome(state, payment.id, Outcome::Failed(format!("checkout failed: {err}"))).await
            {
                tracing::error!(payment_id = %payment.id, error = %apply_err, "failed to release payment after checkout error");
            }
            Err(err.into())
        }
    }
}

async fn fulfil(txn: &DatabaseTransaction, payment: &payments::Model) -> AppResult<()> {
    match PaymentPurpose::parse(&payment.purpose) {
        Some(PaymentPurpose::Order) => order_service::mark_paid(txn, payment.reference_id).await,
        Some(PaymentPurpose::Subscription) => {
            subscription_service::activate_subscription(txn, payment.reference_id).await
        }
        Some(PaymentPurpose::Programme) => {
            programme_service::activate_purchase(txn, payment.reference_id).await
        }
        None => Err(AppError::Internal(anyhow::anyhow!(
            "payment {} has unknown purpose {}",
            payment.id,
            payment.purpose
        ))),
    }
}

async fn release(txn: &DatabaseTransaction, payment: &payments::Model) -> AppResult<()> {
    match PaymentPurpose::parse(&payment.purpose) {
        Some(PaymentPurpose::Order) => order_service::release_order(txn, payment.reference_id).await,
        Some(PaymentPurpose::Subscription) => {
            subscription_service::cancel_pending(txn, payment.reference_id).await
        }
        Some(PaymentPurpose::Programme) => {
            programme_service::cancel_pending(txn, payment.reference_id).await
        }
        None => Ok(()),
    }
}

fn paid_notification(purpose: &str) -> (&'static str, &'static str) {
    match PaymentPurpose::parse(purpose) {
        Some(PaymentPurpose::Subscription) => ("Subscription active", "Your payment was received and your membership is now active."),
        Some(PaymentPurpose::Programme) => ("Programme unlocked", "Your payment was received and the programme is now available."),
        _ => ("Order confirmed", "Your payment was received and your order is being prepared."),
    }
}

/// The pending payment settling `reference_id`, if any.
pub async fn pending_payment_for<C: ConnectionTrait>(
    conn: &C,
    purpose: PaymentPurpose,
    reference_id: Uuid,
) -> AppResult<Option<payments::Model>> {
    Ok(Payments::find()
        .filter(PaymentCol::Purpose.eq(purpose.as_str()))
        .filter(PaymentCol::ReferenceId.eq(reference_id))
        .filter(PaymentCol::Status.eq(PaymentStatus::Pending.as_str()))
        .one(conn)
        .await?)
}

/// Moves a pending payment to its terminal state and applies the side
/// effects. Payments that already left `pending` are returned unchanged.
pub async fn apply_outcome(state: &AppState, payment_id: Uuid, outcome: Outcome) -> AppResult<payments::Model> {
    let txn = state.orm.begin().await?;
    let payment = Payments::find_by_id(payment_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    if payment.status != PaymentStatus::Pending.as_str() {
        tracing::debug!(payment_id = %payment_id, status = %payment.status, "payment already settled, ignoring outcome");
        return Ok(payment);
    }

    let now = Utc::now();
    let mut active: payments::ActiveModel = payment.clone().into();
    active.status = Set(outcome.status().into());
    active.failure_reason = Set(outcome.reason().map(str::to_string));
    if outcome == Outcome::Paid {
        active.paid_at = Set(Some(now.into()));
    }
    active.updated_at = Set(now.into());
    let updated = active.update(&txn).await?;

    match &outcome {
        Outcome::Paid => {
            if let Some(coupon_id) = payment.coupon_id {
                coupon_usage_service::record_redemption(&txn, payment.user_id, coupon_id).await?;
            }
            fulfil(&txn, &updated).await?;
            let (title, body) = paid_notification(&updated.purpose);
            notification_service::notify(&txn, updated.user_id, title, body, "payment").await?;
        }
        Outcome::Failed(_) | Outcome::Cancelled(_) => {
            release(&txn, &updated).await?;
        }
    }
    txn.commit().await?;

    tracing::info!(
        payment_id = %updated.id,
        purpose = %updated.purpose,
        status = %updated.status,
        "payment settled"
    );
    audit::record(
        &state.orm,
        Some(updated.user_id),
        "payment_settled",
        "payments",
        serde_json::json!({
            "payment_id": updated.id,
            "status": updated.status,
            "reason": updated.failure_reason,
        }),
    )
    .await;

    Ok(updated)
}

async fn find_for_event(
    state: &AppState,
    provider: PaymentProvider,
    payment_id: Option<Uuid>,
    provider_reference: Option<&str>,
) -> AppResult<Option<payments::Model>> {
    let mut condition = Condition::any();
    if let Some(id) = payment_id {
        condition = condition.add(PaymentCol::Id.eq(id));
    }
    if let Some(reference) = provider_reference {
        condition = condition.add(PaymentCol::ProviderReference.eq(reference));
    }
    if payment_id.is_none() && provider_reference.is_none() {
        return Ok(None);
    }
    Ok(Payments::find()
        .filter(PaymentCol::Provider.eq(provider.as_str()))
        .filter(condition)
        .one(&state.orm)
        .await?)
}

/// Authenticates a provider callback and applies it.
pub async fn handle_webhook(
    state: &AppState,
    provider: PaymentProvider,
    query: HashMap<String, String>,
    headers: HeaderMap,
    body: serde_json::Value,
) -> AppResult<ApiResponse<WebhookAck>> {
    let gateway = state.gateways.get(provider)?;
    let request = WebhookRequest { query, headers, body };
    let event = gateway.resolve_webhook(&request).await?;

    let payment = find_for_event(state, provider, event.payment_id, event.provider_reference.as_deref()).await?;
    let Some(payment) = payment else {
        tracing::warn!(
            %provider,
            payment_id = ?event.payment_id,
            reference = ?event.provider_reference,
            "webhook for unknown payment"
        );
        return Ok(ApiResponse::success(
            "Ignored",
            WebhookAck {
                payment_id: None,
                status: None,
            },
            None,
        ));
    };

    let settled = match Outcome::from_webhook(event.outcome) {
        Some(outcome) => apply_outcome(state, payment.id, outcome).await?,
        None => payment,
    };

    Ok(ApiResponse::success(
        "Received",
        WebhookAck {
            payment_id: Some(settled.id),
            status: Some(settled.status),
        },
        None,
    ))
}

fn payment_condition(query: &PaymentListQuery) -> Condition {
    let mut condition = Condition::all();
    if let Some(status) = query.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        condition = condition.add(PaymentCol::Status.eq(status));
    }
    if let Some(provider) = query.provider.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        condition = condition.add(PaymentCol::Provider.eq(provider));
    }
    condition
}

async fn list_with(
    state: &AppState,
    condition: Condition,
    query: &PaymentListQuery,
) -> AppResult<ApiResponse<PaymentList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let finder = Payments::find()
        .filter(condition)
        .order_by_desc(PaymentCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Payment::from)
        .collect();

    Ok(ApiResponse::success(
        "Payments",
        PaymentList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn list_my_payments(
    state: &AppState,
    user: &AuthUser,
    query: PaymentListQuery,
) -> AppResult<ApiResponse<PaymentList>> {
    let condition = payment_condition(&query).add(PaymentCol::UserId.eq(user.user_id));
    list_with(state, condition, &query).await
}

pub async fn get_payment(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<ApiResponse<Payment>> {
    let mut finder = Payments::find_by_id(id);
    if !user.is_admin() {
        finder = finder.filter(PaymentCol::UserId.eq(user.user_id));
    }
    let payment = finder.one(&state.orm).await?.ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success("Payment", payment.into(), Some(Meta::empty())))
}

pub async fn list_payments(
    state: &AppState,
    user: &AuthUser,
    query: PaymentListQuery,
) -> AppResult<ApiResponse<PaymentList>> {
    ensure_admin(user)?;
    list_with(state, payment_condition(&query), &query).await
}

/// Marks a paid payment refunded. The money itself is returned from the
/// provider dashboard.
pub async fn refund_payment(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<ApiResponse<Payment>> {
    ensure_admin(user)?;
    let txn = state.orm.begin().await?;
    let payment = Payments::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    if payment.status != PaymentStatus::Paid.as_str() {
        return Err(AppError::BadRequest("Only paid payments can be refunded".into()));
    }

    let mut active: payments::ActiveModel = payment.clone().into();
    active.status = Set(PaymentStatus::Refunded.into());
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&txn).await?;

    if let Some(coupon_id) = payment.coupon_id {
        coupon_usage_service::release_redemption(&txn, payment.user_id, coupon_id).await?;
    }
    match PaymentPurpose::parse(&payment.purpose) {
        Some(PaymentPurpose::Order) => order_service::mark_refunded(&txn, payment.reference_id).await?,
        Some(PaymentPurpose::Subscription) => {
            subscription_service::revoke(&txn, payment.reference_id).await?
        }
        Some(PaymentPurpose::Programme) => programme_service::revoke(&txn, payment.reference_id).await?,
        None => {}
    }
    txn.commit().await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "payment_refund",
        "payments",
        serde_json::json!({ "payment_id": id, "amount": updated.amount, "currency": updated.currency }),
    )
    .await;
    tracing::info!(payment_id = %id, "payment refunded");

    Ok(ApiResponse::success("Payment refunded", updated.into(), Some(Meta::empty())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rates() -> ExchangeRates {
        ExchangeRates::parse(Currency::Egp, "SAR=0.0765").unwrap()
    }

    #[test]
    fn webhook_outcomes_map_to_terminal_states() {
        assert_eq!(Outcome::from_webhook(WebhookOutcome::Paid), Some(Outcome::Paid));
        assert_eq!(
            Outcome::from_webhook(WebhookOutcome::Failed("declined".into())),
            Some(Outcome::Failed("declined".into()))
        );
        assert_eq!(Outcome::from_webhook(WebhookOutcome::Ignored), None);
        assert_eq!(Outcome::Cancelled("x".into()).status(), PaymentStatus::Cancelled);
    }

    #[test]
    fn converts_amounts_or_rejects_unknown_currency() {
        assert_eq!(charge_amount(&rates(), 100_000, Currency::Egp).unwrap(), 100_000);
        assert_eq!(charge_amount(&rates(), 100_000, Currency::Sar).unwrap(), 7_650);
        assert!(matches!(
            charge_amount(&rates(), 100_000, Currency::Usd),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn keeps_lines_when_they_add_up() {
        let items = vec![
            BaseLineItem { name: "Shaker".into(), quantity: 2, unit_price: 25_000 },
            BaseLineItem { name: "Mat".into(), quantity: 1, unit_price: 50_000 },
        ];
        let lines = line_items(&ExchangeRates::identity(Currency::Egp), Currency::Egp, &items, 100_000, "Order");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].unit_amount, 25_000);
    }

    #[test]
    fn summarises_discounted_orders_as_one_line() {
        let items = vec![BaseLineItem { name: "Mat".into(), quantity: 1, unit_price: 50_000 }];
        let lines = line_items(&ExchangeRates::identity(Currency::Egp), Currency::Egp, &items, 45_000, "Order INV-1");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].name, "Order INV-1");
        assert_eq!(lines[0].unit_amount, 45_000);
        assert_eq!(lines[0].quantity, 1);
    }
}
