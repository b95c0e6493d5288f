//! Tabby buy-now-pay-later checkout.
//!
//! Webhooks carry a shared-secret header configured in the Tabby dashboard.
//! The payment status is always re-read from the API before acting on it;
//! authorized payments are captured in full.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    config::TabbyConfig,
    currency::Currency,
    enums::PaymentProvider,
    integrations::{
        constant_time_eq,
        gateway::{
            CheckoutSession, GatewayCheckout, GatewayError, PaymentGateway, WebhookEvent,
            WebhookOutcome, WebhookRequest,
        },
        http_client,
    },
};

pub struct TabbyGateway {
    client: reqwest::Client,
    config: TabbyConfig,
}

#[derive(Debug, Deserialize)]
struct CheckoutResponse {
    status: String,
    payment: Option<PaymentRef>,
    configuration: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct PaymentRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    id: String,
    status: String,
    amount: String,
    order: Option<OrderRef>,
}

#[derive(Debug, Deserialize)]
struct OrderRef {
    reference_id: Option<String>,
}

impl TabbyGateway {
    pub fn new(config: TabbyConfig) -> Result<Self, GatewayError> {
        let client = http_client(Duration::from_secs(20))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn send<T: for<'de> Deserialize<'de>>(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<T, GatewayError> {
        let response = request.bearer_auth(&self.config.secret_key).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected(format!("{what} returned {status}: {text}")));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::Malformed(format!("{what}: {e}")))
    }

    async fn fetch_payment(&self, id: &str) -> Result<PaymentResponse, GatewayError> {
        let request = self.client.get(self.url(&format!("/api/v2/payments/{id}")));
        self.send(request, "get payment").await
    }

    async fn capture(&self, id: &str, amount: &str) -> Result<(), GatewayError> {
        let request = self
            .client
            .post(self.url(&format!("/api/v2/payments/{id}/captures")))
            .json(&json!({ "amount": amount }));
        let _: Value = self.send(request, "capture").await?;
        Ok(())
    }

    fn verify_header(&self, request: &WebhookRequest) -> Result<(), GatewayError> {
        if self.config.webhook_secret.is_empty() {
            return Err(GatewayError::InvalidSignature);
        }
        let provided = request
            .headers
            .get(self.config.webhook_header.as_str())
            .and_then(|v| v.to_str().ok())
            .ok_or(GatewayError::InvalidSignature)?;
        if constant_time_eq(provided.as_bytes(), self.config.webhook_secret.as_bytes()) {
            Ok(())
        } else {
            Err(GatewayError::InvalidSignature)
        }
    }
}

/// First hosted checkout URL offered for the installments product.
fn installments_url(configuration: &Value) -> Option<String> {
    configuration
        .pointer("/available_products/installments/0/web_url")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn rejection_reason(configuration: Option<&Value>) -> String {
    configuration
        .and_then(|c| c.pointer("/products/installments/rejection_reason"))
        .and_then(Value::as_str)
        .unwrap_or("not_available")
        .to_string()
}

/// Maps a Tabby payment status (either case) to what we do with it.
fn status_outcome(status: &str) -> WebhookOutcome {
    match status.to_ascii_lowercase().as_str() {
        "closed" | "authorized" => WebhookOutcome::Paid,
        "rejected" => WebhookOutcome::Failed("rejected by tabby".into()),
        "expired" => WebhookOutcome::Failed("tabby session expired".into()),
        _ => WebhookOutcome::Ignored,
    }
}

#[async_trait]
impl PaymentGateway for TabbyGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Tabby
    }

    fn supports(&self, currency: Currency) -> bool {
        matches!(currency, Currency::Sar | Currency::Aed | Currency::Kwd)
    }

    async fn create_checkout(&self, session: &CheckoutSession) -> Result<GatewayCheckout, GatewayError> {
        if !self.supports(session.currency) {
            return Err(GatewayError::UnsupportedCurrency(session.currency));
        }
        let currency = session.currency;
        let items: Vec<Value> = session
            .items
            .iter()
            .map(|item| {
                json!({
                    "title": item.name,
                    "quantity": item.quantity,
                    "unit_price": currency.format_minor(item.unit_amount),
                    "category": "fitness",
                })
            })
            .collect();

        let body = json!({
            "payment": {
                "amount": currency.format_minor(session.amount),
                "currency": currency.code(),
                "description": session.description,
                "buyer": {
                    "email": session.customer.email,
                    "name": session.customer.full_name,
                    "phone": session.customer.phone,
                },
                "order": {
                    "reference_id": session.payment_id.to_string(),
                    "items": items,
                },
            },
            "lang": "en",
            "merchant_code": self.config.merchant_code,
            "merchant_urls": {
                "success": session.success_url,
                "cancel": session.cancel_url,
                "failure": session.failure_url,
            },
        });

        let request = self.client.post(self.url("/api/v2/checkout")).json(&body);
        let resp: CheckoutResponse = self.send(request, "checkout").await?;
        if resp.status != "created" {
            return Err(GatewayError::Rejected(rejection_reason(resp.configuration.as_ref())));
        }
        let payment = resp
            .payment
            .ok_or_else(|| GatewayError::Malformed("checkout without payment".into()))?;
        let checkout_url = resp
            .configuration
            .as_ref()
            .and_then(installments_url)
            .ok_or_else(|| GatewayError::Malformed("checkout without web_url".into()))?;

        tracing::info!(
            payment_id = %session.payment_id,
            tabby_payment_id = %payment.id,
            "tabby checkout created"
        );

        Ok(GatewayCheckout {
            reference: payment.id,
            checkout_url,
        })
    }

    async fn resolve_webhook(&self, request: &WebhookRequest) -> Result<WebhookEvent, GatewayError> {
        self.verify_header(request)?;
        let tabby_id = request
            .body
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::Malformed("missing payment id".into()))?;

        let payment = self.fetch_payment(tabby_id).await?;
        let mut outcome = status_outcome(&payment.status);
        if payment.status.eq_ignore_ascii_case("authorized") {
            if let Err(err) = self.capture(&payment.id, &payment.amount).await {
                tracing::warn!(tabby_payment_id = %payment.id, error = %err, "tabby capture failed");
                outcome = WebhookOutcome::Ignored;
            }
        }

        let payment_id = payment
            .order
            .and_then(|o| o.reference_id)
            .and_then(|r| Uuid::parse_str(&r).ok());

        Ok(WebhookEvent {
            payment_id,
            provider_reference: Some(payment.id),
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use axum::{
        Json, Router,
        extract::Path,
        http::{HeaderMap, HeaderValue, StatusCode},
        routing::{get, post},
    };

    fn gateway_at(base_url: &str, secret: &str) -> TabbyGateway {
        TabbyGateway::new(TabbyConfig {
            base_url: base_url.into(),
            secret_key: "sk_test".into(),
            merchant_code: "fitstore".into(),
            webhook_header: "x-webhook-secret".into(),
            webhook_secret: secret.into(),
        })
        .unwrap()
    }

    fn gateway(secret: &str) -> TabbyGateway {
        gateway_at("http://127.0.0.1:9", secret)
    }

    /// Local stand-in for the Tabby payments API. Every payment reads back as
    /// AUTHORIZED for `reference`; captures of `pay_declined` fail.
    async fn tabby_api(reference: Uuid) -> (String, Arc<Mutex<Vec<(String, String)>>>) {
        let captures = Arc::new(Mutex::new(Vec::new()));
        let recorded = captures.clone();
        let app = Router::new()
            .route(
                "/api/v2/payments/{id}",
                get(move |Path(id): Path<String>| async move {
                    Json(json!({
                        "id": id,
                        "status": "AUTHORIZED",
                        "amount": "250.00",
                        "order": { "reference_id": reference.to_string() }
                    }))
                }),
            )
            .route(
                "/api/v2/payments/{id}/captures",
                post(move |Path(id): Path<String>, Json(body): Json<Value>| {
                    let recorded = recorded.clone();
                    async move {
                        if id == "pay_declined" {
                            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({})));
                        }
                        let amount = body["amount"].as_str().unwrap_or_default().to_string();
                        recorded.lock().unwrap().push((id, amount));
                        (StatusCode::OK, Json(json!({ "status": "CLOSED" })))
                    }
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), captures)
    }

    fn signed(body: Value) -> WebhookRequest {
        let mut headers = HeaderMap::new();
        headers.insert("x-webhook-secret", HeaderValue::from_static("whsec"));
        WebhookRequest {
            headers,
            body,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn authorized_payment_is_captured_then_paid() {
        let reference = Uuid::new_v4();
        let (base_url, captures) = tabby_api(reference).await;
        let gw = gateway_at(&base_url, "whsec");

        let event = gw.resolve_webhook(&signed(json!({ "id": "pay_1" }))).await.unwrap();
        assert_eq!(event.outcome, WebhookOutcome::Paid);
        assert_eq!(event.payment_id, Some(reference));
        assert_eq!(event.provider_reference.as_deref(), Some("pay_1"));
        assert_eq!(
            captures.lock().unwrap().as_slice(),
            &[("pay_1".to_string(), "250.00".to_string())]
        );
    }

    #[tokio::test]
    async fn failed_capture_leaves_payment_pending() {
        let (base_url, captures) = tabby_api(Uuid::new_v4()).await;
        let gw = gateway_at(&base_url, "whsec");

        let event = gw
            .resolve_webhook(&signed(json!({ "id": "pay_declined" })))
            .await
            .unwrap();
        assert_eq!(event.outcome, WebhookOutcome::Ignored);
        assert!(captures.lock().unwrap().is_empty());
    }

    #[test]
    fn maps_statuses() {
        assert_eq!(status_outcome("CLOSED"), WebhookOutcome::Paid);
        assert_eq!(status_outcome("authorized"), WebhookOutcome::Paid);
        assert!(matches!(status_outcome("REJECTED"), WebhookOutcome::Failed(_)));
        assert!(matches!(status_outcome("expired"), WebhookOutcome::Failed(_)));
        assert_eq!(status_outcome("CREATED"), WebhookOutcome::Ignored);
    }

    #[test]
    fn extracts_checkout_url() {
        let config = json!({
            "available_products": {
                "installments": [{ "web_url": "https://checkout.tabby.ai/?sessionId=abc" }]
            }
        });
        assert_eq!(
            installments_url(&config).as_deref(),
            Some("https://checkout.tabby.ai/?sessionId=abc")
        );
        assert_eq!(installments_url(&json!({})), None);
        assert_eq!(
            rejection_reason(Some(&json!({"products": {"installments": {"rejection_reason": "order_amount_too_high"}}}))),
            "order_amount_too_high"
        );
    }

    #[tokio::test]
    async fn webhook_without_secret_header_is_rejected() {
        let gw = gateway("whsec");
        let request = WebhookRequest {
            body: json!({ "id": "pay_1" }),
            ..Default::default()
        };
        assert!(matches!(
            gw.resolve_webhook(&request).await,
            Err(GatewayError::InvalidSignature)
        ));

        let mut headers = HeaderMap::new();
        headers.insert("x-webhook-secret", HeaderValue::from_static("wrong"));
        let request = WebhookRequest {
            headers,
            body: json!({ "id": "pay_1" }),
            ..Default::default()
        };
        assert!(matches!(
            gw.resolve_webhook(&request).await,
            Err(GatewayError::InvalidSignature)
        ));
    }

    #[test]
    fn empty_configured_secret_rejects_everything() {
        let gw = gateway("");
        let mut headers = HeaderMap::new();
        headers.insert("x-webhook-secret", HeaderValue::from_static(""));
        let request = WebhookRequest {
            headers,
            ..Default::default()
        };
        assert!(gw.verify_header(&request).is_err());
    }

    #[test]
    fn supports_gulf_currencies_only() {
        let gw = gateway("whsec");
        assert!(gw.supports(Currency::Sar));
        assert!(gw.supports(Currency::Aed));
        assert!(!gw.supports(Currency::Egp));
    }
}
