//! Cart endpoints.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};

use orchard_core::VariationId;

use crate::error::{AppError, Result, ValidationErrors};
use crate::middleware::RequireUser;
use crate::services::Cart;
use crate::state::AppState;

/// `POST /cart` request body.
#[derive(Debug, Deserialize)]
pub struct AddItemsPayload {
    #[serde(default)]
    pub products: Vec<ProductPayload>,
}

#[derive(Debug, Deserialize)]
pub struct ProductPayload {
    pub id: i32,
    pub quantity: u32,
}

/// Cart representation returned by every cart endpoint.
#[derive(Debug, Serialize)]
pub struct CartBody {
    pub items: Vec<CartItemBody>,
    /// Formatted subtotal, e.g. `"£10.00"`.
    pub subtotal: String,
    /// Subtotal in minor units.
    pub subtotal_minor: i64,
    pub currency: String,
}

#[derive(Debug, Serialize)]
pub struct CartItemBody {
    pub variation_id: VariationId,
    pub name: String,
    pub quantity: u32,
    pub unit_price: String,
    pub line_total: String,
}

async fn cart_body(cart: &Cart) -> Result<CartBody> {
    let items = cart
        .detailed_items()
        .await?
        .into_iter()
        .map(|line| CartItemBody {
            variation_id: line.item.variation_id,
            name: line.catalog.variation.name.clone(),
            quantity: line.item.quantity,
            unit_price: line.catalog.effective_price().format(),
            line_total: line.line_total.format(),
        })
        .collect();
    let subtotal = cart.subtotal().await?;

    Ok(CartBody {
        items,
        subtotal: subtotal.format(),
        subtotal_minor: subtotal.amount(),
        currency: subtotal.currency().to_string(),
    })
}

/// `GET /cart` - current cart with line totals.
pub async fn show(State(state): State<AppState>, RequireUser(user): RequireUser) -> Result<Json<CartBody>> {
    let cart = Cart::for_user(user.id, state.stores().clone());
    Ok(Json(cart_body(&cart).await?))
}

/// `POST /cart` - add or overwrite cart lines.
///
/// Validates every entry before writing anything: a single bad entry
/// rejects the whole request with field-scoped errors and leaves the cart
/// untouched.
pub async fn add_items(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(payload): Json<AddItemsPayload>,
) -> Result<Json<CartBody>> {
    let mut errors = ValidationErrors::new();
    if payload.products.is_empty() {
        errors.add("products", "The products field is required.");
    }

    for (index, product) in payload.products.iter().enumerate() {
        if product.quantity == 0 {
            errors.add(
                format!("products.{index}.quantity"),
                "The quantity must be at least 1.",
            );
            continue;
        }
        let exists = state
            .stores()
            .catalog
            .variation(VariationId::new(product.id))
            .await?
            .is_some();
        if !exists {
            errors.add(format!("products.{index}.id"), "The selected id is invalid.");
        }
    }

    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let items: Vec<(VariationId, u32)> = payload
        .products
        .iter()
        .map(|product| (VariationId::new(product.id), product.quantity))
        .collect();

    let cart = Cart::for_user(user.id, state.stores().clone());
    cart.add(&items).await?;
    Ok(Json(cart_body(&cart).await?))
}

/// `DELETE /cart/{variation_id}` - remove one line.
pub async fn remove_item(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(variation_id): Path<i32>,
) -> Result<Json<CartBody>> {
    let cart = Cart::for_user(user.id, state.stores().clone());
    if !cart.remove(VariationId::new(variation_id)).await? {
        return Err(AppError::NotFound("Cart item".to_owned()));
    }
    Ok(Json(cart_body(&cart).await?))
}
