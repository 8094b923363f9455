//! One-default-per-user invariants for payment methods and addresses.

use axum::http::StatusCode;
use serde_json::json;

use orchard_integration_tests::TestContext;

#[tokio::test]
async fn test_new_payment_method_demotes_previous_default() {
    let ctx = TestContext::new();
    let (_, token) = ctx.seed_user("shopper@example.com");

    ctx.seed_card(&token).await;
    let (status, second) = ctx
        .request(
            "POST",
            "/payment-methods",
            Some(&token),
            Some(json!({ "token": "tok_mastercard" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(second["default"], true);
    assert_eq!(second["card_type"], "mastercard");

    let (_, methods) = ctx
        .request("GET", "/payment-methods", Some(&token), None)
        .await;
    let methods = methods.as_array().expect("list");
    assert_eq!(methods.len(), 2);
    let defaults: Vec<_> = methods
        .iter()
        .filter(|m| m["default"] == true)
        .collect();
    assert_eq!(defaults.len(), 1);
    assert_eq!(defaults[0]["id"], second["id"]);
}

#[tokio::test]
async fn test_payment_method_body_never_exposes_provider_ref() {
    let ctx = TestContext::new();
    let (_, token) = ctx.seed_user("shopper@example.com");

    ctx.seed_card(&token).await;
    let (_, methods) = ctx
        .request("GET", "/payment-methods", Some(&token), None)
        .await;
    assert!(methods[0].get("provider_ref").is_none());
}

#[tokio::test]
async fn test_missing_card_token_is_a_validation_error() {
    let ctx = TestContext::new();
    let (_, token) = ctx.seed_user("shopper@example.com");

    let (status, body) = ctx
        .request(
            "POST",
            "/payment-methods",
            Some(&token),
            Some(json!({ "token": "  " })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["errors"]["token"][0], "The token field is required.");
}

#[tokio::test]
async fn test_new_default_address_demotes_previous_default() {
    let ctx = TestContext::new();
    let (_, token) = ctx.seed_user("shopper@example.com");

    for city in ["London", "Leeds"] {
        let (status, _) = ctx
            .request(
                "POST",
                "/addresses",
                Some(&token),
                Some(json!({
                    "name": "Home",
                    "address_line": "1 Orchard Lane",
                    "city": city,
                    "postal_code": "E1 6AN",
                    "country": "GB",
                    "default": true,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, addresses) = ctx.request("GET", "/addresses", Some(&token), None).await;
    let addresses = addresses.as_array().expect("list");
    assert_eq!(addresses.len(), 2);
    let defaults: Vec<_> = addresses
        .iter()
        .filter(|a| a["default"] == true)
        .collect();
    assert_eq!(defaults.len(), 1);
    assert_eq!(defaults[0]["city"], "Leeds");
}

#[tokio::test]
async fn test_blank_address_fields_are_validation_errors() {
    let ctx = TestContext::new();
    let (_, token) = ctx.seed_user("shopper@example.com");

    let (status, body) = ctx
        .request(
            "POST",
            "/addresses",
            Some(&token),
            Some(json!({
                "name": "",
                "address_line": "1 Orchard Lane",
                "city": "",
                "postal_code": "E1 6AN",
                "country": "GB",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["errors"]["name"][0], "The name field is required.");
    assert_eq!(body["errors"]["city"][0], "The city field is required.");
}
