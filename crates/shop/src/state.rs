//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::broadcast;

use crate::config::ShopConfig;
use crate::db::Stores;
use crate::gateway::Gateway;
use crate::payments::{ChargeQueue, OrderPaymentFailed};

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`; hands out the storage traits, the payment
/// gateway and the charge queue.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ShopConfig,
    stores: Stores,
    gateway: Gateway,
    charge_queue: ChargeQueue,
    events: broadcast::Sender<OrderPaymentFailed>,
    /// Present when backed by Postgres; used by the readiness probe.
    pool: Option<PgPool>,
}

impl AppState {
    #[must_use]
    pub fn new(
        config: ShopConfig,
        stores: Stores,
        gateway: Gateway,
        charge_queue: ChargeQueue,
        events: broadcast::Sender<OrderPaymentFailed>,
        pool: Option<PgPool>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                stores,
                gateway,
                charge_queue,
                events,
                pool,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ShopConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn stores(&self) -> &Stores {
        &self.inner.stores
    }

    #[must_use]
    pub fn gateway(&self) -> &Gateway {
        &self.inner.gateway
    }

    #[must_use]
    pub fn charge_queue(&self) -> &ChargeQueue {
        &self.inner.charge_queue
    }

    /// Subscribe to payment failure events.
    #[must_use]
    pub fn subscribe_failures(&self) -> broadcast::Receiver<OrderPaymentFailed> {
        self.inner.events.subscribe()
    }

    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }
}
