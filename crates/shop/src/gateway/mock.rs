//! Scriptable in-process payment provider for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{CardDetails, ChargeReceipt, ChargeRequest, GatewayError, PaymentProvider};

/// A failure the mock should inject on the next charge attempt.
#[derive(Debug, Clone)]
pub enum MockFailure {
    /// A final card decline with the given reason.
    Declined(String),
    /// A retryable provider-side fault (HTTP 503).
    Transient,
}

impl MockFailure {
    fn into_error(self) -> GatewayError {
        match self {
            Self::Declined(reason) => GatewayError::Declined { reason },
            Self::Transient => GatewayError::Provider {
                status: 503,
                message: "service unavailable".to_owned(),
            },
        }
    }
}

#[derive(Default)]
struct State {
    next_ref: u32,
    customers: Vec<String>,
    scripted: VecDeque<MockFailure>,
    /// Settled charges keyed by idempotency key.
    charges: HashMap<String, ChargeReceipt>,
    attempt_count: u32,
}

/// [`PaymentProvider`] double with scriptable failures.
///
/// Charges are idempotent the way a real processor's are: a repeated
/// idempotency key returns the original receipt without a new settlement.
#[derive(Default)]
pub struct MockProvider {
    state: Mutex<State>,
}

impl MockProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a failure for the next charge attempt. Calls stack in FIFO
    /// order.
    pub fn fail_next(&self, failure: MockFailure) {
        self.lock().scripted.push_back(failure);
    }

    /// Remote customers created so far.
    #[must_use]
    pub fn customer_count(&self) -> usize {
        self.lock().customers.len()
    }

    /// Distinct settled charges.
    #[must_use]
    pub fn charge_count(&self) -> usize {
        self.lock().charges.len()
    }

    /// Charge attempts, including scripted failures and idempotent replays.
    #[must_use]
    pub fn attempt_count(&self) -> u32 {
        self.lock().attempt_count
    }
}

#[async_trait]
impl PaymentProvider for MockProvider {
    async fn create_customer(&self, email: &str) -> Result<String, GatewayError> {
        let mut state = self.lock();
        state.next_ref += 1;
        let customer_ref = format!("cus_mock_{}", state.next_ref);
        state.customers.push(email.to_owned());
        Ok(customer_ref)
    }

    async fn attach_card(
        &self,
        _customer_ref: &str,
        card_token: &str,
    ) -> Result<(String, CardDetails), GatewayError> {
        let mut state = self.lock();
        state.next_ref += 1;
        let provider_ref = format!("pm_mock_{}", state.next_ref);
        // tokens look like "tok_visa"; everything after the prefix is the brand
        let card_type = card_token
            .strip_prefix("tok_")
            .unwrap_or("card")
            .to_owned();
        Ok((
            provider_ref,
            CardDetails {
                card_type,
                last_four: "4242".to_owned(),
            },
        ))
    }

    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeReceipt, GatewayError> {
        let mut state = self.lock();
        state.attempt_count += 1;

        if let Some(failure) = state.scripted.pop_front() {
            return Err(failure.into_error());
        }

        if let Some(existing) = state.charges.get(&request.idempotency_key) {
            return Ok(existing.clone());
        }

        state.next_ref += 1;
        let receipt = ChargeReceipt {
            transaction_ref: format!("ch_mock_{}", state.next_ref),
            amount: request.amount,
        };
        state
            .charges
            .insert(request.idempotency_key.clone(), receipt.clone());
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchard_core::{CurrencyCode, Money};

    fn request(key: &str) -> ChargeRequest {
        ChargeRequest {
            customer_ref: "cus_mock_1".to_owned(),
            payment_method_ref: "pm_mock_2".to_owned(),
            amount: Money::new(1000, CurrencyCode::GBP),
            idempotency_key: key.to_owned(),
        }
    }

    #[tokio::test]
    async fn test_repeated_key_returns_original_receipt() {
        let provider = MockProvider::new();

        let first = provider.charge(&request("order-1")).await.expect("charge");
        let second = provider.charge(&request("order-1")).await.expect("replay");

        assert_eq!(first.transaction_ref, second.transaction_ref);
        assert_eq!(provider.charge_count(), 1);
        assert_eq!(provider.attempt_count(), 2);
    }

    #[tokio::test]
    async fn test_scripted_failures_fire_in_order() {
        let provider = MockProvider::new();
        provider.fail_next(MockFailure::Transient);
        provider.fail_next(MockFailure::Declined("insufficient_funds".to_owned()));

        let first = provider.charge(&request("order-1")).await.expect_err("transient");
        assert!(first.is_retryable());

        let second = provider.charge(&request("order-1")).await.expect_err("declined");
        assert!(matches!(second, GatewayError::Declined { .. }));

        let third = provider.charge(&request("order-1")).await.expect("settles");
        assert!(third.transaction_ref.starts_with("ch_mock_"));
        assert_eq!(provider.charge_count(), 1);
    }
}
