//! Integration test harness for Orchard.
//!
//! Builds the real router against in-memory stores and the mock payment
//! provider, then drives it request by request with `tower::ServiceExt::
//! oneshot`. The payment worker is not spawned; tests pump the charge
//! queue explicitly with [`TestContext::process_next_charge`] so every
//! assertion runs against a settled state.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use secrecy::SecretString;
use serde_json::Value;
use tokio::sync::broadcast;
use tower::ServiceExt;

use orchard_core::{Money, OrderId};
use orchard_shop::config::{GatewayConfig, PaymentsConfig, ShopConfig};
use orchard_shop::db::Stores;
use orchard_shop::db::memory::MemoryStore;
use orchard_shop::gateway::{Gateway, MockProvider};
use orchard_shop::models::{Order, User};
use orchard_shop::payments::{
    self, ChargeQueue, ChargeReceiver, OrderPaymentFailed, PaymentWorker, RetryPolicy,
};
use orchard_shop::state::AppState;

fn test_config() -> ShopConfig {
    ShopConfig {
        database_url: SecretString::from("postgres://unused"),
        host: IpAddr::from([127, 0, 0, 1]),
        port: 0,
        gateway: GatewayConfig {
            secret_key: SecretString::from("sk_test_unused"),
            base_url: None,
        },
        payments: PaymentsConfig::default(),
        sentry_dsn: None,
        sentry_environment: "test".to_owned(),
    }
}

/// One application instance with handles into its seams.
pub struct TestContext {
    app: Router,
    pub stores: Stores,
    pub fixtures: Arc<MemoryStore>,
    pub provider: Arc<MockProvider>,
    pub queue: ChargeQueue,
    pub receiver: ChargeReceiver,
    pub worker: Arc<PaymentWorker>,
    pub failures: broadcast::Receiver<OrderPaymentFailed>,
}

impl TestContext {
    #[must_use]
    pub fn new() -> Self {
        let (stores, fixtures) = Stores::in_memory();
        let provider = Arc::new(MockProvider::new());
        let gateway = Gateway::new(provider.clone(), stores.clone());
        let (events_tx, _) = payments::events::channel();
        let (queue, receiver) = payments::charge_queue();

        let worker = Arc::new(PaymentWorker::new(
            stores.clone(),
            gateway.clone(),
            events_tx.clone(),
            RetryPolicy {
                max_attempts: 3,
                base_backoff: Duration::from_millis(1),
            },
        ));

        let state = AppState::new(
            test_config(),
            stores.clone(),
            gateway,
            queue.clone(),
            events_tx,
            None,
        );
        let failures = state.subscribe_failures();

        Self {
            app: orchard_shop::app(state),
            stores,
            fixtures,
            provider,
            queue,
            receiver,
            worker,
            failures,
        }
    }

    /// Send one request; returns status and parsed JSON body (Null when
    /// empty).
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("infallible service");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Claim the next queued charge and settle it through the worker.
    ///
    /// Panics if the queue is empty.
    pub async fn process_next_charge(&self) -> Order {
        let order_id = self
            .receiver
            .recv()
            .await
            .expect("charge queue has an entry");
        self.worker
            .process_order(order_id)
            .await
            .expect("processing succeeds")
            .expect("order exists")
    }

    /// Seed a user and return it with its bearer token.
    pub fn seed_user(&self, email: &str) -> (User, String) {
        self.fixtures.insert_user(email)
    }

    /// Seed one product with a single variation and plenty of stock.
    /// Returns the variation id.
    pub fn seed_variation(&self, name: &str, price: Money) -> i32 {
        let product = self.fixtures.insert_product(name, price);
        let variation = self.fixtures.insert_variation(product.id, "Standard", None);
        self.fixtures.insert_stock(variation.id, 100);
        variation.id.as_i32()
    }

    /// Seed a default address for a user via the API-facing store.
    pub async fn seed_address(&self, user: &User) -> i32 {
        self.stores
            .addresses
            .create(
                user.id,
                orchard_shop::models::NewAddress {
                    name: "Home".to_owned(),
                    address_line: "1 Orchard Lane".to_owned(),
                    city: "London".to_owned(),
                    postal_code: "E1 6AN".to_owned(),
                    country: "GB".to_owned(),
                    default: true,
                },
            )
            .await
            .expect("address")
            .id
            .as_i32()
    }

    /// Attach a default card through the API.
    pub async fn seed_card(&self, token: &str) {
        let (status, _) = self
            .request(
                "POST",
                "/payment-methods",
                Some(token),
                Some(serde_json::json!({ "token": "tok_visa" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    /// Fetch an order directly from storage.
    pub async fn order(&self, id: i64) -> Order {
        let id = i32::try_from(id).expect("small id");
        self.stores
            .orders
            .get(OrderId::new(id))
            .await
            .expect("get order")
            .expect("order exists")
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
