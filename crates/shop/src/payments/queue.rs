//! In-process charge queue.
//!
//! An unbounded mpsc channel carries order ids to the payment worker. A
//! shared pending set keeps the queue deduplicated and lets callers cancel
//! an order before a worker claims it: cancelled ids stay in the channel
//! but are skipped on receive.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;

use orchard_core::OrderId;

/// Sending half: enqueue and cancel charges.
#[derive(Clone)]
pub struct ChargeQueue {
    tx: mpsc::UnboundedSender<OrderId>,
    pending: Arc<Mutex<HashSet<OrderId>>>,
}

/// Receiving half, shared by the payment worker pool.
///
/// Cloneable; concurrent `recv` calls hand each order to exactly one
/// caller.
#[derive(Clone)]
pub struct ChargeReceiver {
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<OrderId>>>,
    pending: Arc<Mutex<HashSet<OrderId>>>,
}

/// Create a connected queue/receiver pair.
#[must_use]
pub fn charge_queue() -> (ChargeQueue, ChargeReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let pending = Arc::new(Mutex::new(HashSet::new()));
    (
        ChargeQueue {
            tx,
            pending: pending.clone(),
        },
        ChargeReceiver {
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
            pending,
        },
    )
}

fn lock(pending: &Mutex<HashSet<OrderId>>) -> MutexGuard<'_, HashSet<OrderId>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ChargeQueue {
    /// Queue an order for charging.
    ///
    /// Returns `false` if the order is already queued or the worker side is
    /// gone.
    pub fn enqueue(&self, order: OrderId) -> bool {
        {
            let mut pending = lock(&self.pending);
            if !pending.insert(order) {
                debug!(order_id = %order, "Order already queued for charge");
                return false;
            }
        }

        if self.tx.send(order).is_err() {
            lock(&self.pending).remove(&order);
            return false;
        }
        true
    }

    /// Withdraw an order that no worker has claimed yet.
    ///
    /// Returns whether the order was still pending.
    pub fn cancel(&self, order: OrderId) -> bool {
        let removed = lock(&self.pending).remove(&order);
        if removed {
            debug!(order_id = %order, "Cancelled queued charge");
        }
        removed
    }

    /// Whether an order is queued and unclaimed.
    #[must_use]
    pub fn is_pending(&self, order: OrderId) -> bool {
        lock(&self.pending).contains(&order)
    }
}

impl ChargeReceiver {
    /// Receive the next live order id, skipping cancelled entries.
    ///
    /// Returns `None` once every sender is dropped and the channel drained.
    pub async fn recv(&self) -> Option<OrderId> {
        loop {
            let order = self.rx.lock().await.recv().await?;
            if lock(&self.pending).remove(&order) {
                return Some(order);
            }
            debug!(order_id = %order, "Skipping cancelled charge");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enqueue_then_receive() {
        let (queue, receiver) = charge_queue();
        assert!(queue.enqueue(OrderId::new(1)));
        assert!(queue.is_pending(OrderId::new(1)));

        assert_eq!(receiver.recv().await, Some(OrderId::new(1)));
        assert!(!queue.is_pending(OrderId::new(1)));
    }

    #[tokio::test]
    async fn test_duplicate_enqueue_is_rejected() {
        let (queue, receiver) = charge_queue();
        assert!(queue.enqueue(OrderId::new(1)));
        assert!(!queue.enqueue(OrderId::new(1)));

        assert_eq!(receiver.recv().await, Some(OrderId::new(1)));
        // once claimed, the id may be queued again
        assert!(queue.enqueue(OrderId::new(1)));
    }

    #[tokio::test]
    async fn test_cancelled_order_is_skipped() {
        let (queue, receiver) = charge_queue();
        queue.enqueue(OrderId::new(1));
        queue.enqueue(OrderId::new(2));

        assert!(queue.cancel(OrderId::new(1)));
        assert!(!queue.cancel(OrderId::new(1)));

        assert_eq!(receiver.recv().await, Some(OrderId::new(2)));
    }

    #[tokio::test]
    async fn test_recv_ends_when_senders_drop() {
        let (queue, receiver) = charge_queue();
        queue.enqueue(OrderId::new(1));
        drop(queue);

        assert_eq!(receiver.recv().await, Some(OrderId::new(1)));
        assert_eq!(receiver.recv().await, None);
    }
}
