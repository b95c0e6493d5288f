use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use axum::http::HeaderMap;
use thiserror::Error;
use uuid::Uuid;

use crate::{currency::Currency, enums::PaymentProvider, error::AppError};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider rejected the request: {0}")]
    Rejected(String),

    #[error("provider response was malformed: {0}")]
    Malformed(String),

    #[error("webhook signature mismatch")]
    InvalidSignature,

    #[error("currency {0} is not supported by this provider")]
    UnsupportedCurrency(Currency),
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::InvalidSignature => AppError::Unauthorized(err.to_string()),
            GatewayError::UnsupportedCurrency(_) => AppError::BadRequest(err.to_string()),
            GatewayError::Malformed(_) => AppError::BadRequest(err.to_string()),
            GatewayError::Http(_) | GatewayError::Rejected(_) => AppError::Upstream(err.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Customer {
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
}

impl Customer {
    /// Splits the display name into first and last name; providers insist on both.
    pub fn name_parts(&self) -> (String, String) {
        let mut parts = self.full_name.split_whitespace();
        let first = parts.next().unwrap_or("Customer").to_string();
        let rest: Vec<&str> = parts.collect();
        let last = if rest.is_empty() {
            first.clone()
        } else {
            rest.join(" ")
        };
        (first, last)
    }
}

#[derive(Debug, Clone)]
pub struct LineItem {
    pub name: String,
    pub quantity: i32,
    /// Unit price in the charge currency's minor units.
    pub unit_amount: i64,
}

/// Everything a provider needs to open a hosted checkout for one payment.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub payment_id: Uuid,
    pub amount: i64,
    pub currency: Currency,
    pub description: String,
    pub customer: Customer,
    pub items: Vec<LineItem>,
    pub success_url: String,
    pub cancel_url: String,
    pub failure_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCheckout {
    /// Provider-side id used to match later callbacks.
    pub reference: String,
    pub checkout_url: String,
}

/// Raw webhook request as received by the HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct WebhookRequest {
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Paid,
    Failed(String),
    /// Intermediate state; nothing to apply yet.
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    /// Our payment id when the provider echoes it back.
    pub payment_id: Option<Uuid>,
    pub provider_reference: Option<String>,
    pub outcome: WebhookOutcome,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn provider(&self) -> PaymentProvider;

    fn supports(&self, currency: Currency) -> bool;

    async fn create_checkout(&self, session: &CheckoutSession) -> Result<GatewayCheckout, GatewayError>;

    /// Authenticates a callback and turns it into a payment outcome.
    async fn resolve_webhook(&self, request: &WebhookRequest) -> Result<WebhookEvent, GatewayError>;
}

/// Configured providers keyed by name.
#[derive(Clone, Default)]
pub struct PaymentGateways {
    gateways: HashMap<PaymentProvider, Arc<dyn PaymentGateway>>,
}

impl PaymentGateways {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(gateway.provider(), gateway);
        self
    }

    pub fn get(&self, provider: PaymentProvider) -> Result<Arc<dyn PaymentGateway>, AppError> {
        self.gateways.get(&provider).cloned().ok_or_else(|| {
            AppError::BadRequest(format!("payment provider {provider} not available"))
        })
    }

    pub fn providers(&self) -> Vec<PaymentProvider> {
        let mut providers: Vec<_> = self.gateways.keys().copied().collect();
        providers.sort_by_key(|p| p.as_str());
        providers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_customer_names() {
        let customer = Customer {
            email: "a@b.co".into(),
            full_name: "Mona  El Sayed".into(),
            phone: None,
        };
        assert_eq!(customer.name_parts(), ("Mona".into(), "El Sayed".into()));

        let single = Customer {
            full_name: "Mona".into(),
            ..customer.clone()
        };
        assert_eq!(single.name_parts(), ("Mona".into(), "Mona".into()));

        let blank = Customer {
            full_name: "".into(),
            ..customer
        };
        assert_eq!(blank.name_parts(), ("Customer".into(), "Customer".into()));
    }

    #[test]
    fn missing_provider_is_a_bad_request() {
        let gateways = PaymentGateways::new();
        assert!(matches!(
            gateways.get(PaymentProvider::Tabby),
            Err(AppError::BadRequest(_))
        ));
    }
}
