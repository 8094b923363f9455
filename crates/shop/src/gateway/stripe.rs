//! Stripe API client for customer, card and charge operations.
//!
//! Requests are form-encoded per Stripe convention; charges carry an
//! `Idempotency-Key` header so resubmitting the same order never double
//! charges.

use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Deserialize;

use super::{CardDetails, ChargeReceipt, ChargeRequest, GatewayError, PaymentProvider};
use crate::config::GatewayConfig;

/// Stripe API base URL.
const BASE_URL: &str = "https://api.stripe.com";

/// Stripe-backed [`PaymentProvider`].
#[derive(Clone)]
pub struct StripeProvider {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct Customer {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AttachedPaymentMethod {
    id: String,
    card: Card,
}

#[derive(Debug, Deserialize)]
struct Card {
    brand: String,
    last4: String,
}

#[derive(Debug, Deserialize)]
struct PaymentIntent {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    decline_code: Option<String>,
}

impl StripeProvider {
    /// Create a new Stripe client.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] if the HTTP client cannot be built
    /// from the configured secret key.
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", config.secret_key.expose_secret());
        let mut auth_header = HeaderValue::from_str(&auth_value)
            .map_err(|e| GatewayError::Config(format!("invalid secret key: {e}")))?;
        auth_header.set_sensitive(true);
        headers.insert("Authorization", auth_header);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| BASE_URL.to_owned()),
        })
    }

    /// Decode an error response, separating declines from provider faults.
    async fn decode_error(response: reqwest::Response) -> GatewayError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) if envelope.error.kind == "card_error" => GatewayError::Declined {
                reason: envelope
                    .error
                    .decline_code
                    .unwrap_or(envelope.error.message),
            },
            Ok(envelope) => GatewayError::Provider {
                status,
                message: envelope.error.message,
            },
            Err(_) => GatewayError::Provider {
                status,
                message: body,
            },
        }
    }
}

#[async_trait::async_trait]
impl PaymentProvider for StripeProvider {
    async fn create_customer(&self, email: &str) -> Result<String, GatewayError> {
        let url = format!("{}/v1/customers", self.base_url);
        let response = self
            .client
            .post(&url)
            .form(&[("email", email)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::decode_error(response).await);
        }

        let customer: Customer = response.json().await?;
        Ok(customer.id)
    }

    async fn attach_card(
        &self,
        customer_ref: &str,
        card_token: &str,
    ) -> Result<(String, CardDetails), GatewayError> {
        let url = format!("{}/v1/payment_methods/{card_token}/attach", self.base_url);
        let response = self
            .client
            .post(&url)
            .form(&[("customer", customer_ref)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::decode_error(response).await);
        }

        let method: AttachedPaymentMethod = response.json().await?;
        let details = CardDetails {
            card_type: method.card.brand,
            last_four: method.card.last4,
        };
        Ok((method.id, details))
    }

    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeReceipt, GatewayError> {
        let url = format!("{}/v1/payment_intents", self.base_url);
        let amount = request.amount.amount().to_string();
        let response = self
            .client
            .post(&url)
            .header("Idempotency-Key", &request.idempotency_key)
            .form(&[
                ("amount", amount.as_str()),
                ("currency", request.amount.currency().code()),
                ("customer", request.customer_ref.as_str()),
                ("payment_method", request.payment_method_ref.as_str()),
                ("confirm", "true"),
                ("off_session", "true"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::decode_error(response).await);
        }

        let intent: PaymentIntent = response.json().await?;
        if intent.status != "succeeded" {
            return Err(GatewayError::Declined {
                reason: intent.status,
            });
        }

        Ok(ChargeReceipt {
            transaction_ref: intent.id,
            amount: request.amount,
        })
    }
}
