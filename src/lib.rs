pub mod app;
pub mod audit;
pub mod config;
pub mod currency;
pub mod db;
pub mod dto;
pub mod entity;
pub mod enums;
pub mod error;
pub mod extract;
pub mod integrations;
pub mod jobs;
pub mod middleware;
pub mod models;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;
pub mod validation;
