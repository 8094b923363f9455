//! Product catalog read models.

use serde::Serialize;

use orchard_core::{Money, ProductId, StockId, VariationId};

/// A product with a base price.
#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
}

/// A purchasable variation of a product.
///
/// The price is an optional override; a variation without its own price
/// sells at the parent product's price.
#[derive(Debug, Clone, Serialize)]
pub struct ProductVariation {
    pub id: VariationId,
    pub product_id: ProductId,
    pub name: String,
    pub price: Option<Money>,
}

/// Stock on hand for a variation at one location.
#[derive(Debug, Clone, Serialize)]
pub struct Stock {
    pub id: StockId,
    pub variation_id: VariationId,
    pub quantity: i64,
}

/// A variation resolved through the catalog: the variation itself, its
/// product's fallback price, and its stock rows.
///
/// This is the unit the cart and checkout work with; the catalog guarantees
/// the pieces are consistent at read time.
#[derive(Debug, Clone)]
pub struct CatalogVariation {
    pub variation: ProductVariation,
    pub product_price: Money,
    pub stocks: Vec<Stock>,
}

impl CatalogVariation {
    /// The price this variation sells at: its own price if set, else the
    /// product's.
    #[must_use]
    pub fn effective_price(&self) -> Money {
        self.variation.price.unwrap_or(self.product_price)
    }

    /// Whether the variation's own price differs from the product's.
    #[must_use]
    pub fn price_varies(&self) -> bool {
        self.variation
            .price
            .is_some_and(|price| price != self.product_price)
    }

    /// Total quantity on hand across all stock rows.
    #[must_use]
    pub fn stock_count(&self) -> i64 {
        self.stocks.iter().map(|stock| stock.quantity).sum()
    }

    /// Whether any stock is available.
    #[must_use]
    pub fn in_stock(&self) -> bool {
        self.stock_count() > 0
    }

    /// The smallest single stock row that can satisfy `wanted` on its own.
    #[must_use]
    pub fn min_stock(&self, wanted: i64) -> Option<&Stock> {
        self.stocks
            .iter()
            .filter(|stock| stock.quantity >= wanted)
            .min_by_key(|stock| stock.quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchard_core::{CurrencyCode, Money};

    fn variation(price: Option<i64>) -> CatalogVariation {
        CatalogVariation {
            variation: ProductVariation {
                id: VariationId::new(1),
                product_id: ProductId::new(1),
                name: "Large".to_owned(),
                price: price.map(|p| Money::new(p, CurrencyCode::GBP)),
            },
            product_price: Money::new(1000, CurrencyCode::GBP),
            stocks: Vec::new(),
        }
    }

    fn with_stocks(quantities: &[i64]) -> CatalogVariation {
        let mut cv = variation(Some(500));
        cv.stocks = quantities
            .iter()
            .enumerate()
            .map(|(i, &quantity)| Stock {
                id: StockId::new(i32::try_from(i).expect("small index") + 1),
                variation_id: VariationId::new(1),
                quantity,
            })
            .collect();
        cv
    }

    #[test]
    fn test_effective_price_uses_own_price_when_set() {
        assert_eq!(variation(Some(2000)).effective_price().amount(), 2000);
    }

    #[test]
    fn test_effective_price_falls_back_to_product() {
        assert_eq!(variation(None).effective_price().amount(), 1000);
    }

    #[test]
    fn test_product_price_change_flows_through_null_priced_variation() {
        let mut cv = variation(None);
        cv.product_price = Money::new(1500, CurrencyCode::GBP);
        assert_eq!(cv.effective_price().amount(), 1500);
    }

    #[test]
    fn test_price_varies() {
        assert!(variation(Some(2000)).price_varies());
        assert!(!variation(Some(1000)).price_varies());
        assert!(!variation(None).price_varies());
    }

    #[test]
    fn test_stock_count_sums_rows() {
        assert_eq!(with_stocks(&[5, 3]).stock_count(), 8);
        assert_eq!(with_stocks(&[]).stock_count(), 0);
    }

    #[test]
    fn test_in_stock() {
        assert!(with_stocks(&[1]).in_stock());
        assert!(!with_stocks(&[0]).in_stock());
        assert!(!with_stocks(&[]).in_stock());
    }

    #[test]
    fn test_min_stock_picks_smallest_sufficient_row() {
        let cv = with_stocks(&[10, 4, 7]);
        assert_eq!(cv.min_stock(5).map(|s| s.quantity), Some(7));
        assert_eq!(cv.min_stock(4).map(|s| s.quantity), Some(4));
        assert!(cv.min_stock(11).is_none());
    }
}
