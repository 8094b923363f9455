//! Storage layer: repository traits and their implementations.
//!
//! Each collaborator (`UserStore`, `ProductCatalog`, cart, order, address
//! and payment-method persistence) is a trait seam so the service logic is
//! independent of the backing store. [`postgres`] is the production
//! implementation; [`memory`] backs tests and local seeding.

pub mod memory;
pub mod postgres;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use orchard_core::{AddressId, Money, OrderId, OrderStatus, ShippingMethodId, UserId, VariationId};

use crate::models::{
    Address, CartItem, CatalogVariation, NewAddress, NewPaymentMethod, Order, PaymentMethod, User,
};

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Referenced entity does not exist.
    #[error("Not found")]
    NotFound,

    /// A uniqueness or concurrent-write conflict.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A status update was attempted from a state the machine does not allow.
    #[error("invalid order status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Stored data failed to parse into domain types.
    #[error("Data corruption: {0}")]
    DataCorruption(String),
}

/// Resolve users and persist their remote customer reference.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn user_by_token(&self, token: &str) -> Result<Option<User>, RepositoryError>;

    async fn user_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// Persist the payment provider's customer reference for a user.
    async fn set_gateway_customer_id(
        &self,
        id: UserId,
        customer_ref: &str,
    ) -> Result<(), RepositoryError>;
}

/// Read-only product/variation/stock lookup.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Resolve a variation with its product fallback price and stock rows.
    ///
    /// Returns `None` when the variation id does not exist.
    async fn variation(&self, id: VariationId)
    -> Result<Option<CatalogVariation>, RepositoryError>;
}

/// Per-user cart persistence.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Upsert the given (variation, quantity) pairs into the user's cart.
    ///
    /// Overwrite-or-insert per key; rows not named in `items` are left
    /// untouched. Quantities are validated (>= 1) before this layer.
    async fn upsert_items(
        &self,
        user: UserId,
        items: &[(VariationId, u32)],
    ) -> Result<(), RepositoryError>;

    async fn items(&self, user: UserId) -> Result<Vec<CartItem>, RepositoryError>;

    /// Remove a single row. Returns whether a row existed.
    async fn remove_item(
        &self,
        user: UserId,
        variation: VariationId,
    ) -> Result<bool, RepositoryError>;

    async fn clear(&self, user: UserId) -> Result<(), RepositoryError>;
}

/// Order persistence with compare-and-set status transitions.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Create an order in status `created` with the given subtotal snapshot.
    async fn create(
        &self,
        user: UserId,
        address: AddressId,
        shipping_method: ShippingMethodId,
        subtotal: Money,
    ) -> Result<Order, RepositoryError>;

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    async fn for_user(&self, user: UserId) -> Result<Vec<Order>, RepositoryError>;

    /// Move an order to `to` only if its current status is in `expected`.
    ///
    /// The compare-and-set is what keeps overlapping worker retries
    /// single-effect: exactly one caller wins each transition, the rest get
    /// `InvalidTransition`.
    async fn transition(
        &self,
        id: OrderId,
        expected: &[OrderStatus],
        to: OrderStatus,
        transaction_ref: Option<&str>,
        failure_reason: Option<&str>,
    ) -> Result<Order, RepositoryError>;

    /// Orders sitting in `payment_pending` since before `older_than`.
    async fn stale_payment_pending(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Order>, RepositoryError>;
}

/// Payment method persistence with the one-default-per-user invariant.
#[async_trait]
pub trait PaymentMethodStore: Send + Sync {
    /// Insert a payment method; when `new.default` is set, the previous
    /// default is demoted in the same atomic scope.
    async fn create(
        &self,
        user: UserId,
        new: NewPaymentMethod,
    ) -> Result<PaymentMethod, RepositoryError>;

    async fn for_user(&self, user: UserId) -> Result<Vec<PaymentMethod>, RepositoryError>;

    async fn default_for_user(
        &self,
        user: UserId,
    ) -> Result<Option<PaymentMethod>, RepositoryError>;
}

/// Address persistence with the one-default-per-user invariant.
#[async_trait]
pub trait AddressStore: Send + Sync {
    async fn create(&self, user: UserId, new: NewAddress) -> Result<Address, RepositoryError>;

    async fn for_user(&self, user: UserId) -> Result<Vec<Address>, RepositoryError>;

    /// Fetch an address only if it belongs to `user`.
    async fn get(&self, user: UserId, id: AddressId) -> Result<Option<Address>, RepositoryError>;
}

/// The full set of storage handles the service needs.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub catalog: Arc<dyn ProductCatalog>,
    pub carts: Arc<dyn CartStore>,
    pub orders: Arc<dyn OrderStore>,
    pub payment_methods: Arc<dyn PaymentMethodStore>,
    pub addresses: Arc<dyn AddressStore>,
}

impl Stores {
    /// Postgres-backed stores sharing one pool.
    #[must_use]
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            users: Arc::new(postgres::PgUserStore::new(pool.clone())),
            catalog: Arc::new(postgres::PgProductCatalog::new(pool.clone())),
            carts: Arc::new(postgres::PgCartStore::new(pool.clone())),
            orders: Arc::new(postgres::PgOrderStore::new(pool.clone())),
            payment_methods: Arc::new(postgres::PgPaymentMethodStore::new(pool.clone())),
            addresses: Arc::new(postgres::PgAddressStore::new(pool)),
        }
    }

    /// In-memory stores over a shared [`memory::MemoryStore`].
    ///
    /// The handle is returned alongside so tests and the seeder can insert
    /// fixture data directly.
    #[must_use]
    pub fn in_memory() -> (Self, Arc<memory::MemoryStore>) {
        let store = Arc::new(memory::MemoryStore::new());
        let stores = Self {
            users: store.clone(),
            catalog: store.clone(),
            carts: store.clone(),
            orders: store.clone(),
            payment_methods: store.clone(),
            addresses: store.clone(),
        };
        (stores, store)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
