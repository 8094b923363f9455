//! Cart row model.

use chrono::{DateTime, Utc};
use serde::Serialize;

use orchard_core::{UserId, VariationId};

/// One cart row: a (user, variation) pair with a quantity.
///
/// Unique per (user, variation); re-adding a variation overwrites the
/// quantity rather than duplicating the row.
#[derive(Debug, Clone, Serialize)]
pub struct CartItem {
    pub user_id: UserId,
    pub variation_id: VariationId,
    pub quantity: u32,
    pub updated_at: DateTime<Utc>,
}
