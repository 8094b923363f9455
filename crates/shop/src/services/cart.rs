//! Cart service.
//!
//! A thin facade over [`CartStore`] and [`ProductCatalog`] scoped to one
//! user. Pricing is resolved at read time: the subtotal always reflects the
//! catalog's current effective prices, not what prices were when items were
//! added.

use thiserror::Error;

use orchard_core::{Money, MoneyError, UserId, VariationId};

use crate::db::{RepositoryError, Stores};
use crate::models::{CartItem, CatalogVariation};

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// The request named a variation the catalog does not know.
    #[error("unknown product variation: {0}")]
    UnknownVariation(VariationId),

    /// A quantity of zero is not a cart line.
    #[error("quantity must be at least 1 for variation {0}")]
    ZeroQuantity(VariationId),

    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// A cart line joined against the catalog, with its line total.
#[derive(Debug, Clone)]
pub struct DetailedCartItem {
    pub item: CartItem,
    pub catalog: CatalogVariation,
    pub line_total: Money,
}

/// A user's shopping cart.
#[derive(Clone)]
pub struct Cart {
    user: UserId,
    stores: Stores,
}

impl Cart {
    #[must_use]
    pub fn for_user(user: UserId, stores: Stores) -> Self {
        Self { user, stores }
    }

    /// Add items to the cart, overwriting quantities for variations already
    /// present and leaving other lines untouched.
    ///
    /// Every variation is validated against the catalog first; if any is
    /// unknown or has a zero quantity, nothing is written.
    ///
    /// # Errors
    ///
    /// [`CartError::UnknownVariation`] for ids the catalog cannot resolve,
    /// [`CartError::ZeroQuantity`] for zero quantities.
    pub async fn add(&self, items: &[(VariationId, u32)]) -> Result<(), CartError> {
        for &(variation, quantity) in items {
            if quantity == 0 {
                return Err(CartError::ZeroQuantity(variation));
            }
            if self.stores.catalog.variation(variation).await?.is_none() {
                return Err(CartError::UnknownVariation(variation));
            }
        }
        self.stores.carts.upsert_items(self.user, items).await?;
        Ok(())
    }

    /// The raw cart rows.
    pub async fn items(&self) -> Result<Vec<CartItem>, CartError> {
        Ok(self.stores.carts.items(self.user).await?)
    }

    /// Cart rows joined with their catalog variations and line totals.
    ///
    /// A row whose variation has since disappeared from the catalog is
    /// `RepositoryError::NotFound`; validation on add normally prevents it.
    pub async fn detailed_items(&self) -> Result<Vec<DetailedCartItem>, CartError> {
        let mut detailed = Vec::new();
        for item in self.items().await? {
            let catalog = self
                .stores
                .catalog
                .variation(item.variation_id)
                .await?
                .ok_or(RepositoryError::NotFound)?;
            let line_total = catalog.effective_price().multiply(item.quantity);
            detailed.push(DetailedCartItem {
                item,
                catalog,
                line_total,
            });
        }
        Ok(detailed)
    }

    /// Sum of line totals at current catalog prices.
    ///
    /// An empty cart totals zero in the default currency.
    pub async fn subtotal(&self) -> Result<Money, CartError> {
        let mut total = Money::zero(orchard_core::CurrencyCode::default());
        let mut first = true;
        for line in self.detailed_items().await? {
            if first {
                total = line.line_total;
                first = false;
            } else {
                total = total.add(line.line_total)?;
            }
        }
        Ok(total)
    }

    /// Remove one line. Returns whether it existed.
    pub async fn remove(&self, variation: VariationId) -> Result<bool, CartError> {
        Ok(self.stores.carts.remove_item(self.user, variation).await?)
    }

    /// Drop every line.
    pub async fn clear(&self) -> Result<(), CartError> {
        Ok(self.stores.carts.clear(self.user).await?)
    }

    pub async fn is_empty(&self) -> Result<bool, CartError> {
        Ok(self.items().await?.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchard_core::CurrencyCode;

    fn money(amount: i64) -> Money {
        Money::new(amount, CurrencyCode::GBP)
    }

    #[tokio::test]
    async fn test_add_then_subtotal() {
        let (stores, fixtures) = Stores::in_memory();
        let (user, _) = fixtures.insert_user("u@example.com");
        let product = fixtures.insert_product("Tee", money(500));
        let variation = fixtures.insert_variation(product.id, "M", None);

        let cart = Cart::for_user(user.id, stores);
        cart.add(&[(variation.id, 2)]).await.expect("add");

        assert_eq!(cart.subtotal().await.expect("subtotal"), money(1000));
    }

    #[tokio::test]
    async fn test_add_overwrites_existing_quantity() {
        let (stores, fixtures) = Stores::in_memory();
        let (user, _) = fixtures.insert_user("u@example.com");
        let product = fixtures.insert_product("Tee", money(500));
        let variation = fixtures.insert_variation(product.id, "M", None);

        let cart = Cart::for_user(user.id, stores);
        cart.add(&[(variation.id, 3)]).await.expect("add");
        cart.add(&[(variation.id, 1)]).await.expect("add");

        let items = cart.items().await.expect("items");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 1);
        assert_eq!(cart.subtotal().await.expect("subtotal"), money(500));
    }

    #[tokio::test]
    async fn test_unknown_variation_writes_nothing() {
        let (stores, fixtures) = Stores::in_memory();
        let (user, _) = fixtures.insert_user("u@example.com");
        let product = fixtures.insert_product("Tee", money(500));
        let variation = fixtures.insert_variation(product.id, "M", None);

        let cart = Cart::for_user(user.id, stores);
        let err = cart
            .add(&[(variation.id, 1), (VariationId::new(999), 1)])
            .await
            .expect_err("unknown id");
        assert!(matches!(err, CartError::UnknownVariation(id) if id == VariationId::new(999)));
        assert!(cart.is_empty().await.expect("is_empty"));
    }

    #[tokio::test]
    async fn test_subtotal_uses_variation_price_override() {
        let (stores, fixtures) = Stores::in_memory();
        let (user, _) = fixtures.insert_user("u@example.com");
        let product = fixtures.insert_product("Tee", money(500));
        let plain = fixtures.insert_variation(product.id, "M", None);
        let premium = fixtures.insert_variation(product.id, "XL", Some(money(700)));

        let cart = Cart::for_user(user.id, stores);
        cart.add(&[(plain.id, 1), (premium.id, 2)]).await.expect("add");

        // 500 + 2 * 700
        assert_eq!(cart.subtotal().await.expect("subtotal"), money(1900));
    }

    #[tokio::test]
    async fn test_subtotal_tracks_later_price_changes() {
        let (stores, fixtures) = Stores::in_memory();
        let (user, _) = fixtures.insert_user("u@example.com");
        let product = fixtures.insert_product("Tee", money(500));
        let variation = fixtures.insert_variation(product.id, "M", None);

        let cart = Cart::for_user(user.id, stores);
        cart.add(&[(variation.id, 2)]).await.expect("add");
        fixtures.set_product_price(product.id, money(600));

        assert_eq!(cart.subtotal().await.expect("subtotal"), money(1200));
    }

    #[tokio::test]
    async fn test_empty_cart_subtotal_is_zero() {
        let (stores, fixtures) = Stores::in_memory();
        let (user, _) = fixtures.insert_user("u@example.com");

        let cart = Cart::for_user(user.id, stores);
        assert_eq!(
            cart.subtotal().await.expect("subtotal"),
            Money::zero(CurrencyCode::GBP)
        );
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let (stores, fixtures) = Stores::in_memory();
        let (user, _) = fixtures.insert_user("u@example.com");
        let product = fixtures.insert_product("Tee", money(500));
        let m = fixtures.insert_variation(product.id, "M", None);
        let l = fixtures.insert_variation(product.id, "L", None);

        let cart = Cart::for_user(user.id, stores);
        cart.add(&[(m.id, 1), (l.id, 1)]).await.expect("add");

        assert!(cart.remove(m.id).await.expect("remove"));
        assert!(!cart.remove(m.id).await.expect("remove again"));
        assert_eq!(cart.items().await.expect("items").len(), 1);

        cart.clear().await.expect("clear");
        assert!(cart.is_empty().await.expect("is_empty"));
    }
}
