//! Paymob Accept: auth token -> ecommerce order -> payment key -> iframe.
//!
//! Transaction callbacks are authenticated with an HMAC-SHA512 over a fixed
//! list of transaction fields, passed as the `hmac` query parameter.

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::Sha512;
use uuid::Uuid;

use crate::{
    config::PaymobConfig,
    currency::Currency,
    enums::PaymentProvider,
    integrations::{
        gateway::{
            CheckoutSession, GatewayCheckout, GatewayError, PaymentGateway, WebhookEvent,
            WebhookOutcome, WebhookRequest,
        },
        http_client,
    },
};

type HmacSha512 = Hmac<Sha512>;

/// Transaction fields, in the order Paymob concatenates them for the HMAC.
const HMAC_FIELDS: [&str; 20] = [
    "amount_cents",
    "created_at",
    "currency",
    "error_occured",
    "has_parent_transaction",
    "id",
    "integration_id",
    "is_3d_secure",
    "is_auth",
    "is_capture",
    "is_refunded",
    "is_standalone_payment",
    "is_voided",
    "order.id",
    "owner",
    "pending",
    "source_data.pan",
    "source_data.sub_type",
    "source_data.type",
    "success",
];

const PAYMENT_KEY_TTL_SECS: i64 = 3600;

pub struct PaymobGateway {
    client: reqwest::Client,
    config: PaymobConfig,
}

#[derive(Deserialize)]
struct AuthTokenResponse {
    token: String,
}

#[derive(Deserialize)]
struct EcommerceOrderResponse {
    id: i64,
}

#[derive(Deserialize)]
struct PaymentKeyResponse {
    token: String,
}

impl PaymobGateway {
    pub fn new(config: PaymobConfig) -> Result<Self, GatewayError> {
        let client = http_client(Duration::from_secs(20))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post<T: for<'de> Deserialize<'de>>(&self, path: &str, body: &Value) -> Result<T, GatewayError> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected(format!("{path} returned {status}: {text}")));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::Malformed(format!("{path}: {e}")))
    }

    async fn auth_token(&self) -> Result<String, GatewayError> {
        let resp: AuthTokenResponse = self
            .post("/api/auth/tokens", &json!({ "api_key": self.config.api_key }))
            .await?;
        Ok(resp.token)
    }

    pub fn verify_hmac(&self, transaction: &Value, provided: &str) -> Result<(), GatewayError> {
        verify_transaction_hmac(&self.config.hmac_secret, transaction, provided)
    }
}

#[async_trait]
impl PaymentGateway for PaymobGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Paymob
    }

    fn supports(&self, currency: Currency) -> bool {
        currency == Currency::Egp
    }

    async fn create_checkout(&self, session: &CheckoutSession) -> Result<GatewayCheckout, GatewayError> {
        if !self.supports(session.currency) {
            return Err(GatewayError::UnsupportedCurrency(session.currency));
        }
        let token = self.auth_token().await?;

        let items: Vec<Value> = session
            .items
            .iter()
            .map(|item| {
                json!({
                    "name": item.name,
                    "amount_cents": item.unit_amount * item.quantity as i64,
                    "quantity": item.quantity,
                    "description": item.name,
                })
            })
            .collect();

        let order: EcommerceOrderResponse = self
            .post(
                "/api/ecommerce/orders",
                &json!({
                    "auth_token": token,
                    "delivery_needed": false,
                    "amount_cents": session.amount,
                    "currency": session.currency.code(),
                    "merchant_order_id": session.payment_id.to_string(),
                    "items": items,
                }),
            )
            .await?;

        let (first_name, last_name) = session.customer.name_parts();
        let phone = session
            .customer
            .phone
            .clone()
            .unwrap_or_else(|| "NA".to_string());
        let key: PaymentKeyResponse = self
            .post(
                "/api/acceptance/payment_keys",
                &json!({
                    "auth_token": token,
                    "amount_cents": session.amount,
                    "expiration": PAYMENT_KEY_TTL_SECS,
                    "order_id": order.id,
                    "currency": session.currency.code(),
                    "integration_id": self.config.integration_id,
                    "billing_data": {
                        "first_name": first_name,
                        "last_name": last_name,
                        "email": session.customer.email,
                        "phone_number": phone,
                        "apartment": "NA",
                        "floor": "NA",
                        "street": "NA",
                        "building": "NA",
                        "shipping_method": "NA",
                        "postal_code": "NA",
                        "city": "NA",
                        "country": "EG",
                        "state": "NA",
                    },
                }),
            )
            .await?;

        tracing::info!(
            payment_id = %session.payment_id,
            paymob_order_id = order.id,
            "paymob checkout created"
        );

        Ok(GatewayCheckout {
            reference: order.id.to_string(),
            checkout_url: self.url(&format!(
                "/api/acceptance/iframes/{}?payment_token={}",
                self.config.iframe_id, key.token
            )),
        })
    }

    async fn resolve_webhook(&self, request: &WebhookRequest) -> Result<WebhookEvent, GatewayError> {
        let provided = request
            .query
            .get("hmac")
            .ok_or(GatewayError::InvalidSignature)?;
        let transaction = request
            .body
            .get("obj")
            .ok_or_else(|| GatewayError::Malformed("missing obj".into()))?;
        self.verify_hmac(transaction, provided)?;
        parse_transaction(transaction)
    }
}

/// Looks up a dotted path (`order.id`) inside a JSON object.
fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |node, key| node.get(key))
}

fn field_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Concatenated field values the HMAC is computed over.
pub fn hmac_message(transaction: &Value) -> String {
    HMAC_FIELDS
        .iter()
        .map(|field| field_text(lookup(transaction, field)))
        .collect()
}

pub fn sign_transaction(secret: &str, transaction: &Value) -> Result<String, GatewayError> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).map_err(|_| GatewayError::InvalidSignature)?;
    mac.update(hmac_message(transaction).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn verify_transaction_hmac(secret: &str, transaction: &Value, provided: &str) -> Result<(), GatewayError> {
    let provided = hex::decode(provided.trim()).map_err(|_| GatewayError::InvalidSignature)?;
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).map_err(|_| GatewayError::InvalidSignature)?;
    mac.update(hmac_message(transaction).as_bytes());
    mac.verify_slice(&provided)
        .map_err(|_| GatewayError::InvalidSignature)
}

fn parse_transaction(transaction: &Value) -> Result<WebhookEvent, GatewayError> {
    let payment_id = lookup(transaction, "order.merchant_order_id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok());
    let provider_reference = lookup(transaction, "order.id").map(|v| field_text(Some(v)));
    if payment_id.is_none() && provider_reference.is_none() {
        return Err(GatewayError::Malformed("transaction has no order reference".into()));
    }

    let flag = |name: &str| transaction.get(name).and_then(Value::as_bool).unwrap_or(false);
    let outcome = if flag("pending") {
        WebhookOutcome::Ignored
    } else if flag("success") && !flag("is_voided") && !flag("is_refunded") {
        WebhookOutcome::Paid
    } else {
        let reason = lookup(transaction, "data.message")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .unwrap_or("transaction declined");
        WebhookOutcome::Failed(reason.to_string())
    };

    Ok(WebhookEvent {
        payment_id,
        provider_reference,
        outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transaction(success: bool) -> Value {
        json!({
            "id": 192036465,
            "pending": false,
            "amount_cents": 100000,
            "success": success,
            "is_auth": false,
            "is_capture": false,
            "is_standalone_payment": true,
            "is_voided": false,
            "is_refunded": false,
            "is_3d_secure": true,
            "integration_id": 4097558,
            "has_parent_transaction": false,
            "order": {
                "id": 217503754,
                "merchant_order_id": "6f1c1f3e-6a2b-4c4e-9d1d-2f1f0d3b8a11"
            },
            "created_at": "2024-06-13T11:33:44.592345",
            "currency": "EGP",
            "source_data": { "pan": "2346", "type": "card", "sub_type": "MasterCard" },
            "error_occured": false,
            "owner": 302852,
            "data": { "message": "Approved" }
        })
    }

    #[test]
    fn message_concatenates_fields_in_order() {
        let msg = hmac_message(&transaction(true));
        assert_eq!(
            msg,
            "1000002024-06-13T11:33:44.592345EGPfalsefalse1920364654097558truefalsefalsefalsetruefalse217503754302852false2346MasterCardcardtrue"
        );
    }

    #[test]
    fn accepts_valid_and_rejects_tampered_signatures() {
        let tx = transaction(true);
        let sig = sign_transaction("hmac-secret", &tx).unwrap();
        assert!(verify_transaction_hmac("hmac-secret", &tx, &sig).is_ok());
        assert!(verify_transaction_hmac("hmac-secret", &tx, &sig.to_uppercase()).is_ok());

        let mut tampered = tx.clone();
        tampered["amount_cents"] = json!(1);
        assert!(matches!(
            verify_transaction_hmac("hmac-secret", &tampered, &sig),
            Err(GatewayError::InvalidSignature)
        ));
        assert!(matches!(
            verify_transaction_hmac("other", &tx, &sig),
            Err(GatewayError::InvalidSignature)
        ));
        assert!(verify_transaction_hmac("hmac-secret", &tx, "not-hex").is_err());
    }

    #[test]
    fn parses_outcomes() {
        let paid = parse_transaction(&transaction(true)).unwrap();
        assert_eq!(paid.outcome, WebhookOutcome::Paid);
        assert_eq!(paid.provider_reference.as_deref(), Some("217503754"));
        assert!(paid.payment_id.is_some());

        let mut declined = transaction(false);
        declined["data"]["message"] = json!("Insufficient funds");
        let declined = parse_transaction(&declined).unwrap();
        assert_eq!(
            declined.outcome,
            WebhookOutcome::Failed("Insufficient funds".into())
        );

        let mut pending = transaction(false);
        pending["pending"] = json!(true);
        assert_eq!(
            parse_transaction(&pending).unwrap().outcome,
            WebhookOutcome::Ignored
        );
    }
}
