//! Asynchronous payment pipeline.
//!
//! Checkout enqueues an order id on the [`queue::ChargeQueue`] and returns
//! immediately; a background [`worker::PaymentWorker`] claims the order,
//! charges it through the gateway with bounded retries, and settles its
//! status. [`events`] broadcasts payment failures to interested listeners.

pub mod events;
pub mod queue;
pub mod worker;

pub use events::{OrderPaymentFailed, spawn_failure_logger};
pub use queue::{ChargeQueue, ChargeReceiver, charge_queue};
pub use worker::{PaymentError, PaymentWorker, RetryPolicy};
