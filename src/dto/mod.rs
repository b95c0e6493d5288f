pub mod admin;
pub mod auth;
pub mod cart;
pub mod cms;
pub mod coupons;
pub mod leads;
pub mod notifications;
pub mod orders;
pub mod payments;
pub mod products;
pub mod programmes;
pub mod subscriptions;
pub mod users;
pub mod videos;
