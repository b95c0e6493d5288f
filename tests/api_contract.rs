mod common;

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use std::sync::Arc;

use fitness_platform_api::{app::build_app, state::AppState};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

async fn send(request: Request<Body>) -> (StatusCode, Option<String>, Value) {
    send_with(common::offline_state(), request).await
}

async fn send_with(state: AppState, request: Request<Body>) -> (StatusCode, Option<String>, Value) {
    let app = build_app(state);
    let response = app.oneshot(request).await.expect("response");
    let status = response.status();
    let request_id = response
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, request_id, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, auth: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn unknown_route_returns_404_with_path() {
    let (status, request_id, body) = send(get("/api/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
    assert_eq!(body["error"]["path"], "/api/nope");
    assert!(request_id.is_some(), "x-request-id should be propagated");
}

#[tokio::test]
async fn protected_route_without_token_is_unauthorized() {
    let (status, _, body) = send(get("/api/orders")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");
}

#[tokio::test]
async fn admin_route_rejects_regular_user() {
    let state = common::offline_state();
    let token = common::bearer(&state, Uuid::new_v4(), "user");
    let request = Request::builder()
        .uri("/api/admin/dashboard")
        .header(header::AUTHORIZATION, token)
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "forbidden");
}

#[tokio::test]
async fn lead_with_bad_email_fails_validation() {
    let request = post_json(
        "/api/leads",
        None,
        json!({ "name": "Sara", "email": "not-an-email" }),
    );
    let (status, _, body) = send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
    assert_eq!(body["error"]["fields"][0]["field"], "email");
}

#[tokio::test]
async fn body_missing_a_field_is_a_validation_error() {
    let request = post_json("/api/auth/register", None, json!({ "email": "a@b.co" }));
    let (status, _, body) = send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
    assert_eq!(body["error"]["fields"][0]["field"], "password");
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let request = Request::builder()
        .method("POST")
        .uri("/api/leads")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"name\": "))
        .unwrap();
    let (status, _, body) = send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn non_numeric_query_param_is_a_validation_error() {
    let (status, _, body) = send(get("/api/products?page=abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn malformed_path_id_is_a_bad_request() {
    let (status, _, body) = send(get("/api/products/not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn currency_header_is_honoured_when_supported() {
    let request = Request::builder()
        .uri("/api/currency")
        .header("x-currency", "SAR")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["currency"], "SAR");
    assert_eq!(body["data"]["source"], "header");
}

#[tokio::test]
async fn unsupported_currency_falls_back_to_default() {
    let request = Request::builder()
        .uri("/api/currency")
        .header("x-currency", "KWD")
        .header(header::COOKIE, "currency=XYZ")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["currency"], "EGP");
    assert_eq!(body["data"]["source"], "default");
}

fn currency_from(ip: &str) -> Request<Body> {
    Request::builder()
        .uri("/api/currency")
        .header("x-forwarded-for", ip)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn currency_falls_back_to_geolocation() {
    let state = common::offline_state().with_geo(Arc::new(common::FixedGeo { country: Some("sa") }));
    let (status, _, body) = send_with(state, currency_from("41.33.10.2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["currency"], "SAR");
    assert_eq!(body["data"]["source"], "geolocation");
}

#[tokio::test]
async fn explicit_header_beats_geolocation() {
    let state = common::offline_state().with_geo(Arc::new(common::FixedGeo { country: Some("SA") }));
    let request = Request::builder()
        .uri("/api/currency")
        .header("x-forwarded-for", "41.33.10.2")
        .header("x-currency", "AED")
        .body(Body::empty())
        .unwrap();
    let (_, _, body) = send_with(state, request).await;
    assert_eq!(body["data"]["currency"], "AED");
    assert_eq!(body["data"]["source"], "header");
}

#[tokio::test]
async fn geolocation_failure_uses_default() {
    let state = common::offline_state().with_geo(Arc::new(common::FixedGeo { country: None }));
    let (status, _, body) = send_with(state, currency_from("41.33.10.2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["currency"], "EGP");
    assert_eq!(body["data"]["source"], "default");
}

#[tokio::test]
async fn private_addresses_are_not_geolocated() {
    let state = common::offline_state().with_geo(Arc::new(common::FixedGeo { country: Some("AE") }));
    let (_, _, body) = send_with(state, currency_from("192.168.1.20")).await;
    assert_eq!(body["data"]["source"], "default");
}

#[tokio::test]
async fn checkout_with_unconfigured_provider_is_rejected() {
    let state = common::offline_state();
    let token = common::bearer(&state, Uuid::new_v4(), "user");
    let request = post_json(
        "/api/orders/checkout",
        Some(&token),
        json!({ "shipping_address": "12 Nile St, Cairo", "provider": "tabby" }),
    );
    let (status, _, body) = send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(
        body["error"]["message"]
            .as_str()
            .is_some_and(|m| m.contains("not available")),
        "unexpected body: {body}"
    );
}

#[tokio::test]
async fn docs_are_served() {
    let app = build_app(common::offline_state());
    let response = app.oneshot(get("/docs")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}
