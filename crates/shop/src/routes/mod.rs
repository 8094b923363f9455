//! HTTP route handlers for the shop API.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                - Liveness check
//! GET    /health/ready          - Readiness check (DB ping)
//!
//! # Cart (requires bearer token)
//! GET    /cart                  - Cart contents with line totals
//! POST   /cart                  - Add/overwrite cart lines
//! DELETE /cart/{variation_id}   - Remove one line
//!
//! # Orders (requires bearer token)
//! GET    /orders                - Order history
//! POST   /orders                - Create an order and queue its charge
//!
//! # Payment methods (requires bearer token)
//! GET    /payment-methods       - Stored payment methods
//! POST   /payment-methods       - Attach a tokenized card
//!
//! # Addresses (requires bearer token)
//! GET    /addresses             - Stored addresses
//! POST   /addresses             - Create an address
//! ```

pub mod addresses;
pub mod cart;
pub mod health;
pub mod orders;
pub mod payment_methods;

use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::state::AppState;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::ready))
        .route("/cart", get(cart::show).post(cart::add_items))
        .route("/cart/{variation_id}", delete(cart::remove_item))
        .route("/orders", get(orders::index).post(orders::create))
        .route(
            "/payment-methods",
            get(payment_methods::index).post(payment_methods::create),
        )
        .route("/addresses", get(addresses::index).post(addresses::create))
}
