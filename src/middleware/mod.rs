pub mod auth;
pub mod currency;
