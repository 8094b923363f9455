//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers return `Result<T, AppError>`.
//! Client-facing bodies use the `{"message": ...}` envelope, with an
//! `"errors"` map keyed by field for validation failures.

use std::collections::BTreeMap;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::gateway::GatewayError;
use crate::services::CartError;

/// Field-keyed validation messages, rendered under `"errors"` in a 422
/// response.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message against a field. Fields accumulate.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Single-field convenience constructor.
    #[must_use]
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }
}

/// Application-level error type for the shop API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Payment gateway operation failed.
    #[error("Gateway error: {0}")]
    Gateway(GatewayError),

    /// Request is missing or carrying an invalid bearer token.
    #[error("Unauthenticated")]
    Unauthenticated,

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request payload failed validation.
    #[error("Validation failed")]
    Validation(ValidationErrors),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<CartError> for AppError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::Repository(err) => Self::Database(err),
            CartError::UnknownVariation(id) => Self::Validation(ValidationErrors::single(
                "products",
                format!("Unknown product variation {id}."),
            )),
            CartError::ZeroQuantity(id) => Self::Validation(ValidationErrors::single(
                "products",
                format!("Quantity for variation {id} must be at least 1."),
            )),
            CartError::Money(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Storage(err) => Self::Database(err),
            other => Self::Gateway(other),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<&'a ValidationErrors>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server-side faults to Sentry. Conflicts are expected
        // under concurrent writes and answered with 409, not reported.
        let server_fault = match &self {
            Self::Database(RepositoryError::Conflict(_)) => false,
            Self::Database(_) | Self::Internal(_) => true,
            Self::Gateway(
                GatewayError::Http(_)
                    | GatewayError::Provider { .. }
                    | GatewayError::Config(_)
                    | GatewayError::Storage(_),
            ) => true,
            _ => false,
        };
        if server_fault {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let (status, message) = match &self {
            Self::Database(RepositoryError::Conflict(_)) => (
                StatusCode::CONFLICT,
                "The resource was modified concurrently. Please retry.".to_owned(),
            ),
            Self::Database(_)
            | Self::Internal(_)
            | Self::Gateway(GatewayError::Config(_) | GatewayError::Storage(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_owned(),
            ),
            Self::Gateway(GatewayError::Http(_) | GatewayError::Provider { .. }) => (
                StatusCode::BAD_GATEWAY,
                "Payment provider error".to_owned(),
            ),
            Self::Gateway(GatewayError::Declined { reason }) => (
                StatusCode::PAYMENT_REQUIRED,
                format!("Payment declined: {reason}."),
            ),
            Self::Gateway(GatewayError::NoPaymentMethod) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "No default payment method on file.".to_owned(),
            ),
            Self::Unauthenticated => (StatusCode::UNAUTHORIZED, "Unauthenticated.".to_owned()),
            Self::NotFound(what) => (StatusCode::NOT_FOUND, format!("{what} not found.")),
            Self::Validation(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "The given data was invalid.".to_owned(),
            ),
        };

        let errors = match &self {
            Self::Validation(errors) => Some(errors),
            _ => None,
        };

        (
            status,
            Json(ErrorBody {
                message: &message,
                errors,
            }),
        )
            .into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
