//! Payment method model.

use chrono::{DateTime, Utc};
use serde::Serialize;

use orchard_core::{PaymentMethodId, UserId};

/// A stored payment instrument.
///
/// `provider_ref` is the remote provider's payment-method reference; the
/// card fields are display metadata only. At most one method per user has
/// `default == true`.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentMethod {
    pub id: PaymentMethodId,
    pub user_id: UserId,
    pub card_type: String,
    pub last_four: String,
    #[serde(skip)]
    pub provider_ref: String,
    pub default: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields for persisting a newly attached payment method.
#[derive(Debug, Clone)]
pub struct NewPaymentMethod {
    pub card_type: String,
    pub last_four: String,
    pub provider_ref: String,
    pub default: bool,
}
