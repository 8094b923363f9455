//! Orchard shop library.
//!
//! Cart, checkout and asynchronous payment processing behind a JSON API.
//! The binary in `main.rs` wires this against Postgres and Stripe; tests
//! drive the same router against in-memory stores and a mock provider.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod routes;
pub mod services;
pub mod state;

use axum::Router;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the application router with request tracing attached.
#[must_use]
pub fn app(state: AppState) -> Router {
    routes::router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
