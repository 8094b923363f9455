//! Payment gateway.
//!
//! [`PaymentProvider`] is the seam to the remote card processor;
//! [`StripeProvider`] is the production implementation and
//! [`MockProvider`] the scriptable test double. [`Gateway`] layers the
//! customer-provisioning and default-payment-method logic on top.

pub mod mock;
pub mod stripe;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use orchard_core::Money;

pub use mock::{MockFailure, MockProvider};
pub use stripe::StripeProvider;

use crate::db::{RepositoryError, Stores};
use crate::models::{NewPaymentMethod, Order, PaymentMethod, User};

/// Errors from gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The provider rejected the card. Never retried.
    #[error("card declined: {reason}")]
    Declined { reason: String },

    /// The provider answered with a non-success status.
    #[error("payment provider error (status {status}): {message}")]
    Provider { status: u16, message: String },

    /// The provider could not be reached.
    #[error("payment provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The user has no default payment method to charge.
    #[error("no default payment method on file")]
    NoPaymentMethod,

    /// The provider client could not be built from its configuration.
    #[error("gateway configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

impl GatewayError {
    /// Whether a retry could plausibly succeed.
    ///
    /// Declines are final; transport errors and provider-side 5xx/429 are
    /// worth retrying. Storage errors are surfaced, not retried here.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Declined { .. } | Self::NoPaymentMethod | Self::Storage(_) | Self::Config(_) => {
                false
            }
            Self::Http(_) => true,
            Self::Provider { status, .. } => *status >= 500 || *status == 429,
        }
    }
}

/// Display metadata for an attached card.
#[derive(Debug, Clone)]
pub struct CardDetails {
    pub card_type: String,
    pub last_four: String,
}

/// A single charge instruction for the provider.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub customer_ref: String,
    pub payment_method_ref: String,
    pub amount: Money,
    /// Stable per order; the provider collapses duplicate submissions.
    pub idempotency_key: String,
}

/// Proof of a settled charge.
#[derive(Debug, Clone)]
pub struct ChargeReceipt {
    pub transaction_ref: String,
    pub amount: Money,
}

/// The remote card processor.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a remote customer record, returning its reference.
    async fn create_customer(&self, email: &str) -> Result<String, GatewayError>;

    /// Attach a tokenized card to a customer, returning the provider's
    /// payment-method reference and display details.
    async fn attach_card(
        &self,
        customer_ref: &str,
        card_token: &str,
    ) -> Result<(String, CardDetails), GatewayError>;

    /// Charge a customer's payment method.
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeReceipt, GatewayError>;
}

/// Gateway facade wiring the provider to storage.
#[derive(Clone)]
pub struct Gateway {
    provider: Arc<dyn PaymentProvider>,
    stores: Stores,
}

impl Gateway {
    #[must_use]
    pub fn new(provider: Arc<dyn PaymentProvider>, stores: Stores) -> Self {
        Self { provider, stores }
    }

    /// Scope the gateway to one user.
    #[must_use]
    pub fn with_user(&self, user: User) -> UserGateway {
        UserGateway {
            gateway: self.clone(),
            user,
        }
    }
}

/// Gateway operations for a single user.
pub struct UserGateway {
    gateway: Gateway,
    user: User,
}

impl UserGateway {
    /// The user's remote customer reference, provisioning one on first use.
    ///
    /// Idempotent: a stored reference is reused, never recreated.
    pub async fn create_customer(&mut self) -> Result<String, GatewayError> {
        if let Some(customer_ref) = &self.user.gateway_customer_id {
            return Ok(customer_ref.clone());
        }

        let customer_ref = self.gateway.provider.create_customer(&self.user.email).await?;
        self.gateway
            .stores
            .users
            .set_gateway_customer_id(self.user.id, &customer_ref)
            .await?;
        self.user.gateway_customer_id = Some(customer_ref.clone());
        Ok(customer_ref)
    }

    /// Attach a tokenized card and persist it as a payment method.
    pub async fn add_card(
        &mut self,
        card_token: &str,
        default: bool,
    ) -> Result<PaymentMethod, GatewayError> {
        let customer_ref = self.create_customer().await?;
        let (provider_ref, details) = self
            .gateway
            .provider
            .attach_card(&customer_ref, card_token)
            .await?;

        let method = self
            .gateway
            .stores
            .payment_methods
            .create(
                self.user.id,
                NewPaymentMethod {
                    card_type: details.card_type,
                    last_four: details.last_four,
                    provider_ref,
                    default,
                },
            )
            .await?;
        Ok(method)
    }

    /// Charge the user's default payment method for an order's subtotal.
    pub async fn charge(&mut self, order: &Order) -> Result<ChargeReceipt, GatewayError> {
        let method = self
            .gateway
            .stores
            .payment_methods
            .default_for_user(self.user.id)
            .await?
            .ok_or(GatewayError::NoPaymentMethod)?;
        let customer_ref = self.create_customer().await?;

        let request = ChargeRequest {
            customer_ref,
            payment_method_ref: method.provider_ref,
            amount: order.subtotal,
            idempotency_key: order.idempotency_key(),
        };
        self.gateway.provider.charge(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchard_core::CurrencyCode;

    fn money(amount: i64) -> Money {
        Money::new(amount, CurrencyCode::GBP)
    }

    fn gateway_with_user() -> (Gateway, Arc<MockProvider>, crate::db::Stores, User) {
        let (stores, fixtures) = Stores::in_memory();
        let provider = Arc::new(MockProvider::new());
        let gateway = Gateway::new(provider.clone(), stores.clone());
        let (user, _) = fixtures.insert_user("payer@example.com");
        (gateway, provider, stores, user)
    }

    #[tokio::test]
    async fn test_create_customer_is_idempotent() {
        let (gateway, provider, stores, user) = gateway_with_user();
        let mut ug = gateway.with_user(user.clone());

        let first = ug.create_customer().await.expect("create");
        let second = ug.create_customer().await.expect("create again");
        assert_eq!(first, second);
        assert_eq!(provider.customer_count(), 1);

        // the reference is persisted, so a fresh scope also reuses it
        let stored = stores
            .users
            .user_by_id(user.id)
            .await
            .expect("fetch")
            .expect("user");
        let mut fresh = gateway.with_user(stored);
        assert_eq!(fresh.create_customer().await.expect("reuse"), first);
        assert_eq!(provider.customer_count(), 1);
    }

    #[tokio::test]
    async fn test_add_card_provisions_customer_and_persists_method() {
        let (gateway, provider, stores, user) = gateway_with_user();
        let mut ug = gateway.with_user(user.clone());

        let method = ug.add_card("tok_visa", true).await.expect("add card");
        assert_eq!(method.card_type, "visa");
        assert_eq!(method.last_four, "4242");
        assert!(method.default);
        assert_eq!(provider.customer_count(), 1);

        let stored = stores
            .payment_methods
            .default_for_user(user.id)
            .await
            .expect("fetch")
            .expect("default");
        assert_eq!(stored.id, method.id);
    }

    #[tokio::test]
    async fn test_charge_without_payment_method_fails_fast() {
        let (gateway, provider, _stores, user) = gateway_with_user();
        let mut ug = gateway.with_user(user);

        let order = Order {
            id: orchard_core::OrderId::new(1),
            user_id: orchard_core::UserId::new(1),
            address_id: orchard_core::AddressId::new(1),
            shipping_method_id: orchard_core::ShippingMethodId::new(1),
            subtotal: money(1000),
            status: orchard_core::OrderStatus::Created,
            transaction_ref: None,
            failure_reason: None,
            created_at: chrono::Utc::now(),
            status_changed_at: chrono::Utc::now(),
        };

        let err = ug.charge(&order).await.expect_err("no method");
        assert!(matches!(err, GatewayError::NoPaymentMethod));
        assert!(!err.is_retryable());
        assert_eq!(provider.charge_count(), 0);
    }

    #[test]
    fn test_retryability_classification() {
        assert!(!GatewayError::Declined {
            reason: "insufficient_funds".to_owned()
        }
        .is_retryable());
        assert!(GatewayError::Provider {
            status: 503,
            message: "upstream".to_owned()
        }
        .is_retryable());
        assert!(GatewayError::Provider {
            status: 429,
            message: "rate limited".to_owned()
        }
        .is_retryable());
        assert!(!GatewayError::Provider {
            status: 400,
            message: "bad request".to_owned()
        }
        .is_retryable());
    }
}
