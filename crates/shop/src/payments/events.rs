//! Payment pipeline events.

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::warn;

use orchard_core::{Money, OrderId, UserId};

/// Broadcast when an order's charge has conclusively failed.
///
/// Emitted exactly once per failed charge cycle: only the worker that won
/// the order's status claim publishes it.
#[derive(Debug, Clone)]
pub struct OrderPaymentFailed {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount: Money,
    pub reason: String,
}

/// Channel capacity before slow subscribers start lagging.
const EVENT_CAPACITY: usize = 64;

/// Create the failure event channel.
#[must_use]
pub fn channel() -> (
    broadcast::Sender<OrderPaymentFailed>,
    broadcast::Receiver<OrderPaymentFailed>,
) {
    broadcast::channel(EVENT_CAPACITY)
}

/// Subscribe a task that logs every payment failure.
///
/// Stands in for the customer notification hook; anything else interested
/// in failures subscribes to the same channel.
pub fn spawn_failure_logger(
    mut receiver: broadcast::Receiver<OrderPaymentFailed>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    warn!(
                        order_id = %event.order_id,
                        user_id = %event.user_id,
                        amount = %event.amount,
                        reason = %event.reason,
                        "Order payment failed"
                    );
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Failure logger lagged behind event stream");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
