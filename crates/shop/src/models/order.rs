//! Order model.

use chrono::{DateTime, Utc};
use serde::Serialize;

use orchard_core::{AddressId, Money, OrderId, OrderStatus, ShippingMethodId, UserId};

/// An immutable order snapshot.
///
/// The subtotal is computed from the cart once, at creation, and never
/// recomputed; later cart edits cannot change what gets charged. Status is
/// the only mutable field and only moves along the
/// [`OrderStatus`] state machine.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub address_id: AddressId,
    pub shipping_method_id: ShippingMethodId,
    pub subtotal: Money,
    pub status: OrderStatus,
    /// Provider transaction reference, set when the charge succeeds.
    pub transaction_ref: Option<String>,
    /// Recorded reason for the last failed charge attempt.
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub status_changed_at: DateTime<Utc>,
}

impl Order {
    /// Idempotency key sent to the payment provider for this order's charge.
    ///
    /// Stable per order, so overlapping retries collapse to one provider
    /// transaction.
    #[must_use]
    pub fn idempotency_key(&self) -> String {
        format!("order-{}", self.id)
    }
}
