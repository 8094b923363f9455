//! Payment worker: claims queued orders and charges them.
//!
//! Each order is claimed through a compare-and-set status transition before
//! any provider call, so overlapping deliveries of the same order id settle
//! exactly once. Retries are bounded, backed off with jitter, and never
//! applied to declines.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng as _;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument, warn};

use orchard_core::{OrderId, OrderStatus};

use super::events::OrderPaymentFailed;
use super::queue::ChargeReceiver;
use crate::db::{RepositoryError, Stores};
use crate::gateway::{ChargeReceipt, Gateway, GatewayError};
use crate::models::{Order, User};

/// Errors from processing a queued charge.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Bounded retry schedule for transient charge failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, the first included.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles each retry after that.
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given (1-based) failed attempt: exponential with
    /// jitter.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base_ms = u64::try_from(self.base_backoff.as_millis()).unwrap_or(u64::MAX);
        let shift = attempt.saturating_sub(1).min(10);
        let backoff_ms = base_ms.saturating_mul(1_u64 << shift);
        let jitter_ms = rand::rng().random_range(0..=base_ms / 2);
        Duration::from_millis(backoff_ms.saturating_add(jitter_ms))
    }
}

/// Background worker that settles queued charges.
pub struct PaymentWorker {
    stores: Stores,
    gateway: Gateway,
    events: broadcast::Sender<OrderPaymentFailed>,
    policy: RetryPolicy,
}

impl PaymentWorker {
    #[must_use]
    pub fn new(
        stores: Stores,
        gateway: Gateway,
        events: broadcast::Sender<OrderPaymentFailed>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            stores,
            gateway,
            events,
            policy,
        }
    }

    /// Run the worker loop until the queue closes.
    pub fn spawn(self: Arc<Self>, receiver: ChargeReceiver) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(order_id) = receiver.recv().await {
                if let Err(error) = self.process_order(order_id).await {
                    error!(order_id = %order_id, %error, "Charge processing failed");
                }
            }
            info!("Charge queue closed; payment worker stopping");
        })
    }

    /// Periodically expire orders stuck in `payment_pending`.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        every: Duration,
        pending_timeout: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match self.sweep_stale_pending(pending_timeout).await {
                    Ok(0) => {}
                    Ok(count) => warn!(count, "Expired stale pending payments"),
                    Err(error) => error!(%error, "Stale payment sweep failed"),
                }
            }
        })
    }

    /// Settle one order end to end.
    ///
    /// Returns the order's resulting state, or `None` if the id is unknown.
    /// Reprocessing an order that is already pending or paid is a no-op
    /// returning its current state.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn process_order(&self, order_id: OrderId) -> Result<Option<Order>, PaymentError> {
        let Some(order) = self.stores.orders.get(order_id).await? else {
            warn!("Queued order no longer exists");
            return Ok(None);
        };

        // Claim the order; losing the CAS means another worker owns it or
        // it has already settled.
        let claimed = match self
            .stores
            .orders
            .transition(
                order.id,
                &[OrderStatus::Created, OrderStatus::PaymentFailed],
                OrderStatus::PaymentPending,
                None,
                None,
            )
            .await
        {
            Ok(order) => order,
            Err(RepositoryError::InvalidTransition { from, .. }) => {
                info!(status = %from, "Order already claimed or settled");
                return Ok(self.stores.orders.get(order_id).await?);
            }
            Err(err) => return Err(err.into()),
        };

        let user = self
            .stores
            .users
            .user_by_id(claimed.user_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        match self.charge_with_retries(user, &claimed).await {
            Ok(receipt) => self.settle_paid(&claimed, &receipt).await,
            Err(err) => self.settle_failed(&claimed, &err).await,
        }
    }

    async fn settle_paid(
        &self,
        order: &Order,
        receipt: &ChargeReceipt,
    ) -> Result<Option<Order>, PaymentError> {
        let paid = self
            .stores
            .orders
            .transition(
                order.id,
                &[OrderStatus::PaymentPending],
                OrderStatus::Paid,
                Some(&receipt.transaction_ref),
                None,
            )
            .await?;

        // The order is settled; a failed cart clear must not undo that.
        if let Err(error) = self.stores.carts.clear(order.user_id).await {
            warn!(order_id = %order.id, %error, "Failed to clear cart after payment");
        }

        info!(
            order_id = %order.id,
            transaction_ref = %receipt.transaction_ref,
            amount = %receipt.amount,
            "Order paid"
        );
        Ok(Some(paid))
    }

    async fn settle_failed(
        &self,
        order: &Order,
        err: &GatewayError,
    ) -> Result<Option<Order>, PaymentError> {
        let reason = err.to_string();
        let failed = self
            .stores
            .orders
            .transition(
                order.id,
                &[OrderStatus::PaymentPending],
                OrderStatus::PaymentFailed,
                None,
                Some(&reason),
            )
            .await?;

        warn!(order_id = %order.id, %reason, "Order payment failed");
        // No subscribers is fine; the event is best-effort fan-out.
        let _ = self.events.send(OrderPaymentFailed {
            order_id: order.id,
            user_id: order.user_id,
            amount: order.subtotal,
            reason,
        });
        Ok(Some(failed))
    }

    /// Charge with bounded retries; declines and other final errors return
    /// immediately.
    async fn charge_with_retries(
        &self,
        user: User,
        order: &Order,
    ) -> Result<ChargeReceipt, GatewayError> {
        let mut gateway = self.gateway.with_user(user);
        let mut attempt = 1;
        loop {
            match gateway.charge(order).await {
                Ok(receipt) => return Ok(receipt),
                Err(err) if err.is_retryable() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        order_id = %order.id,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Charge attempt failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Fail every order stuck in `payment_pending` longer than `timeout`.
    ///
    /// Returns how many orders were expired.
    pub async fn sweep_stale_pending(&self, timeout: Duration) -> Result<usize, PaymentError> {
        let window = chrono::Duration::from_std(timeout)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        let stale = self
            .stores
            .orders
            .stale_payment_pending(Utc::now() - window)
            .await?;

        let mut expired = 0;
        for order in stale {
            match self
                .stores
                .orders
                .transition(
                    order.id,
                    &[OrderStatus::PaymentPending],
                    OrderStatus::PaymentFailed,
                    None,
                    Some("payment timed out"),
                )
                .await
            {
                Ok(_) => {
                    expired += 1;
                    let _ = self.events.send(OrderPaymentFailed {
                        order_id: order.id,
                        user_id: order.user_id,
                        amount: order.subtotal,
                        reason: "payment timed out".to_owned(),
                    });
                }
                // settled between the scan and the update
                Err(RepositoryError::InvalidTransition { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(expired)
    }
}
