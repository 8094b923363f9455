//! Payment method endpoints.

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;

use crate::error::{AppError, Result, ValidationErrors};
use crate::middleware::RequireUser;
use crate::models::PaymentMethod;
use crate::state::AppState;

/// `POST /payment-methods` request body.
#[derive(Debug, Deserialize)]
pub struct AddCardPayload {
    pub token: String,
}

/// `GET /payment-methods` - the user's stored payment methods.
pub async fn index(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<Vec<PaymentMethod>>> {
    let methods = state.stores().payment_methods.for_user(user.id).await?;
    Ok(Json(methods))
}

/// `POST /payment-methods` - attach a tokenized card.
///
/// Provisions the remote customer on first use. The new card becomes the
/// default; any previous default is demoted in the same write.
pub async fn create(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(payload): Json<AddCardPayload>,
) -> Result<(StatusCode, Json<PaymentMethod>)> {
    if payload.token.trim().is_empty() {
        return Err(AppError::Validation(ValidationErrors::single(
            "token",
            "The token field is required.",
        )));
    }

    let mut gateway = state.gateway().with_user(user);
    let method = gateway.add_card(payload.token.trim(), true).await?;
    Ok((StatusCode::CREATED, Json(method)))
}
