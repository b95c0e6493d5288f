use axum::{Router, routing::get};

use crate::state::AppState;

pub mod admin;
pub mod auth;
pub mod cart;
pub mod cms;
pub mod coupons;
pub mod currency;
pub mod doc;
pub mod health;
pub mod leads;
pub mod notifications;
pub mod orders;
pub mod params;
pub mod payments;
pub mod products;
pub mod programmes;
pub mod subscriptions;
pub mod users;
pub mod videos;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/users", users::router())
        .nest("/products", products::router())
        .nest("/cart", cart::router())
        .nest("/orders", orders::route())
        .nest("/coupons", coupons::router())
        .nest("/subscriptions", subscriptions::router())
        .nest("/programmes", programmes::router())
        .nest("/payments", payments::router())
        .nest("/leads", leads::router())
        .nest("/cms", cms::router())
        .nest("/videos", videos::router())
        .nest("/notifications", notifications::router())
        .nest("/admin", admin::router())
        .route("/currency", get(currency::detect_currency))
}
