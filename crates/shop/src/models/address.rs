//! Address model.

use chrono::{DateTime, Utc};
use serde::Serialize;

use orchard_core::{AddressId, UserId};

/// A user's shipping address. At most one per user is the default.
#[derive(Debug, Clone, Serialize)]
pub struct Address {
    pub id: AddressId,
    pub user_id: UserId,
    pub name: String,
    pub address_line: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    pub default: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields for creating an address.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct NewAddress {
    pub name: String,
    pub address_line: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    #[serde(default)]
    pub default: bool,
}
