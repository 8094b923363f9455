//! User model.

use chrono::{DateTime, Utc};
use serde::Serialize;

use orchard_core::UserId;

/// A shop user.
///
/// Authentication mechanics live outside this service; a user arrives here
/// already resolved from a bearer token. `gateway_customer_id` is the remote
/// payment-provider customer reference, populated lazily on first use.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub gateway_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
}
