//! Address endpoints.

use axum::{Json, extract::State, http::StatusCode};

use crate::error::{AppError, Result, ValidationErrors};
use crate::middleware::RequireUser;
use crate::models::{Address, NewAddress};
use crate::state::AppState;

/// `GET /addresses` - the user's addresses.
pub async fn index(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<Vec<Address>>> {
    let addresses = state.stores().addresses.for_user(user.id).await?;
    Ok(Json(addresses))
}

/// `POST /addresses` - create an address.
///
/// When `default` is set, the previous default is demoted atomically.
pub async fn create(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(payload): Json<NewAddress>,
) -> Result<(StatusCode, Json<Address>)> {
    let mut errors = ValidationErrors::new();
    for (field, value) in [
        ("name", &payload.name),
        ("address_line", &payload.address_line),
        ("city", &payload.city),
        ("postal_code", &payload.postal_code),
        ("country", &payload.country),
    ] {
        if value.trim().is_empty() {
            errors.add(field, format!("The {field} field is required."));
        }
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let address = state.stores().addresses.create(user.id, payload).await?;
    Ok((StatusCode::CREATED, Json(address)))
}
