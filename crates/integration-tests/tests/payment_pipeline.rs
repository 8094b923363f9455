//! Asynchronous payment pipeline behavior: declines, retries,
//! cancellation and idempotence.

use axum::http::StatusCode;
use serde_json::json;

use orchard_core::{CurrencyCode, Money, OrderId, OrderStatus};
use orchard_integration_tests::TestContext;
use orchard_shop::gateway::MockFailure;

fn gbp(amount: i64) -> Money {
    Money::new(amount, CurrencyCode::GBP)
}

/// Create a ready-to-charge order through the API; returns its id.
async fn place_order(ctx: &TestContext, token: &str, address: i32, variation: i32) -> i64 {
    ctx.request(
        "POST",
        "/cart",
        Some(token),
        Some(json!({ "products": [{ "id": variation, "quantity": 2 }] })),
    )
    .await;
    let (status, body) = ctx
        .request(
            "POST",
            "/orders",
            Some(token),
            Some(json!({ "address_id": address, "shipping_method_id": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_i64().expect("order id")
}

#[tokio::test]
async fn test_declined_charge_fails_the_order_with_one_event() {
    let mut ctx = TestContext::new();
    let (user, token) = ctx.seed_user("shopper@example.com");
    let address = ctx.seed_address(&user).await;
    let variation = ctx.seed_variation("Tee", gbp(500));
    ctx.seed_card(&token).await;

    ctx.provider
        .fail_next(MockFailure::Declined("insufficient_funds".to_owned()));
    let order_id = place_order(&ctx, &token, address, variation).await;

    let settled = ctx.process_next_charge().await;
    assert_eq!(settled.status, OrderStatus::PaymentFailed);
    assert!(settled
        .failure_reason
        .as_deref()
        .expect("reason")
        .contains("insufficient_funds"));
    // declines are never retried
    assert_eq!(ctx.provider.attempt_count(), 1);

    let event = ctx.failures.try_recv().expect("exactly one event");
    assert_eq!(i64::from(event.order_id.as_i32()), order_id);
    assert!(ctx.failures.try_recv().is_err());

    // the async failure never surfaced through HTTP; the order record has it
    let (_, orders) = ctx.request("GET", "/orders", Some(&token), None).await;
    assert_eq!(orders[0]["status"], "payment_failed");
}

#[tokio::test]
async fn test_transient_provider_error_is_retried_to_success() {
    let mut ctx = TestContext::new();
    let (user, token) = ctx.seed_user("shopper@example.com");
    let address = ctx.seed_address(&user).await;
    let variation = ctx.seed_variation("Tee", gbp(500));
    ctx.seed_card(&token).await;

    ctx.provider.fail_next(MockFailure::Transient);
    place_order(&ctx, &token, address, variation).await;

    let settled = ctx.process_next_charge().await;
    assert_eq!(settled.status, OrderStatus::Paid);
    assert_eq!(ctx.provider.attempt_count(), 2);
    assert_eq!(ctx.provider.charge_count(), 1);
    assert!(ctx.failures.try_recv().is_err());
}

#[tokio::test]
async fn test_reprocessing_never_double_charges() {
    let ctx = TestContext::new();
    let (user, token) = ctx.seed_user("shopper@example.com");
    let address = ctx.seed_address(&user).await;
    let variation = ctx.seed_variation("Tee", gbp(500));
    ctx.seed_card(&token).await;

    let order_id = place_order(&ctx, &token, address, variation).await;
    let first = ctx.process_next_charge().await;
    assert_eq!(first.status, OrderStatus::Paid);

    // a duplicate delivery of the same order id is a no-op
    let id = OrderId::new(i32::try_from(order_id).expect("small id"));
    assert!(ctx.queue.enqueue(id));
    let second = ctx.process_next_charge().await;
    assert_eq!(second.status, OrderStatus::Paid);
    assert_eq!(second.transaction_ref, first.transaction_ref);
    assert_eq!(ctx.provider.charge_count(), 1);
}

#[tokio::test]
async fn test_cancelled_charge_is_skipped_by_the_worker() {
    let ctx = TestContext::new();
    let (user, token) = ctx.seed_user("shopper@example.com");
    let address = ctx.seed_address(&user).await;
    let variation = ctx.seed_variation("Tee", gbp(500));
    ctx.seed_card(&token).await;

    let first = place_order(&ctx, &token, address, variation).await;
    let second = place_order(&ctx, &token, address, variation).await;
    assert_ne!(first, second);

    let first_id = OrderId::new(i32::try_from(first).expect("small id"));
    assert!(ctx.queue.cancel(first_id));

    // the worker sees only the second order
    let settled = ctx.process_next_charge().await;
    assert_eq!(i64::from(settled.id.as_i32()), second);

    // the cancelled order never left `created`
    let untouched = ctx.order(first).await;
    assert_eq!(untouched.status, OrderStatus::Created);
    assert_eq!(ctx.provider.charge_count(), 1);
}

#[tokio::test]
async fn test_duplicate_enqueue_is_deduplicated() {
    let ctx = TestContext::new();
    let (user, token) = ctx.seed_user("shopper@example.com");
    let address = ctx.seed_address(&user).await;
    let variation = ctx.seed_variation("Tee", gbp(500));
    ctx.seed_card(&token).await;

    let order_id = place_order(&ctx, &token, address, variation).await;
    let id = OrderId::new(i32::try_from(order_id).expect("small id"));

    // already queued by checkout
    assert!(!ctx.queue.enqueue(id));
}
