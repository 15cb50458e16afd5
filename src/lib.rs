//! Paygate API Library
//!
//! Order-identity management and payment-status reconciliation over an
//! eventually-consistent payment gateway. Duplicate, out-of-order and
//! replayed status signals fold into one monotonic record per order; the
//! store's conditional update is the only mutation discipline.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod openapi;
pub mod services;
pub mod store;

use std::time::Duration;

use axum::{response::Json, routing::get, Router};
use chrono::Utc;
use serde_json::{json, Value};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: config::AppConfig,
    pub services: services::AppServices,
    pub event_sender: events::EventSender,
}

/// Builds the full application router. Transport-level layers that depend on
/// configuration (CORS) are applied by the binary.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "paygate-api up" }))
        .route("/health", get(health_check))
        .merge(handlers::routes())
        .merge(openapi::swagger_ui())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
