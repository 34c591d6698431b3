pub mod axum_http;
pub mod config;
pub mod observability;
pub mod stripe;
pub mod usecases;
pub mod webhook;
