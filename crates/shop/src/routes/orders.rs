//! Order endpoints.
//!
//! Order creation is the checkout entry point: it snapshots the cart's
//! subtotal into a new order and queues the charge, then answers 201
//! without waiting on the payment provider.

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};

use orchard_core::{AddressId, OrderId, OrderStatus, ShippingMethodId};

use crate::error::{AppError, Result, ValidationErrors};
use crate::middleware::RequireUser;
use crate::models::Order;
use crate::services::Cart;
use crate::state::AppState;

/// `POST /orders` request body.
#[derive(Debug, Deserialize)]
pub struct CreateOrderPayload {
    pub address_id: i32,
    pub shipping_method_id: i32,
}

/// Order representation.
#[derive(Debug, Serialize)]
pub struct OrderBody {
    pub id: OrderId,
    pub status: OrderStatus,
    /// Formatted subtotal, e.g. `"£10.00"`.
    pub subtotal: String,
    pub subtotal_minor: i64,
    pub currency: String,
    pub transaction_ref: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<Order> for OrderBody {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            status: order.status,
            subtotal: order.subtotal.format(),
            subtotal_minor: order.subtotal.amount(),
            currency: order.subtotal.currency().to_string(),
            transaction_ref: order.transaction_ref,
            failure_reason: order.failure_reason,
            created_at: order.created_at,
        }
    }
}

/// `GET /orders` - the user's orders, newest first.
pub async fn index(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<Vec<OrderBody>>> {
    let orders = state.stores().orders.for_user(user.id).await?;
    Ok(Json(orders.into_iter().map(OrderBody::from).collect()))
}

/// `POST /orders` - create an order from the cart and queue its charge.
pub async fn create(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(payload): Json<CreateOrderPayload>,
) -> Result<(StatusCode, Json<OrderBody>)> {
    let address = state
        .stores()
        .addresses
        .get(user.id, AddressId::new(payload.address_id))
        .await?;
    let Some(address) = address else {
        return Err(AppError::Validation(ValidationErrors::single(
            "address_id",
            "The selected address_id is invalid.",
        )));
    };

    let cart = Cart::for_user(user.id, state.stores().clone());
    if cart.is_empty().await? {
        return Err(AppError::Validation(ValidationErrors::single(
            "cart",
            "The cart is empty.",
        )));
    }
    let subtotal = cart.subtotal().await?;

    let order = state
        .stores()
        .orders
        .create(
            user.id,
            address.id,
            ShippingMethodId::new(payload.shipping_method_id),
            subtotal,
        )
        .await?;

    state.charge_queue().enqueue(order.id);
    tracing::info!(
        order_id = %order.id,
        user_id = %user.id,
        subtotal = %order.subtotal,
        "Order created; charge queued"
    );

    Ok((StatusCode::CREATED, Json(OrderBody::from(order))))
}
