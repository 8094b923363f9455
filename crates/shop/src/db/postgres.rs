//! Postgres repositories.
//!
//! Queries use the runtime sqlx API with explicit binds; rows are mapped by
//! hand into domain models so Money/status parsing stays in one place.
//! Multi-statement writes (default demotion, order creation from cart reads)
//! run inside transactions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::future::Future;
use std::time::Duration;

use orchard_core::{
    AddressId, CurrencyCode, Money, OrderId, OrderStatus, PaymentMethodId, ProductId,
    ShippingMethodId, StockId, UserId, VariationId,
};

use super::{
    AddressStore, CartStore, OrderStore, PaymentMethodStore, ProductCatalog, RepositoryError,
    UserStore,
};
use crate::models::{
    Address, CartItem, CatalogVariation, NewAddress, NewPaymentMethod, Order, PaymentMethod,
    ProductVariation, Stock, User,
};

/// How long catalog lookups stay cached.
const CATALOG_CACHE_TTL: Duration = Duration::from_secs(60);

fn parse_currency(text: &str) -> Result<CurrencyCode, RepositoryError> {
    text.parse()
        .map_err(|e| RepositoryError::DataCorruption(format!("invalid currency in database: {e}")))
}

fn parse_status(text: &str) -> Result<OrderStatus, RepositoryError> {
    text.parse().map_err(|e| {
        RepositoryError::DataCorruption(format!("invalid order status in database: {e}"))
    })
}

fn map_user(row: &PgRow) -> Result<User, RepositoryError> {
    Ok(User {
        id: UserId::new(row.try_get("id")?),
        email: row.try_get("email")?,
        gateway_customer_id: row.try_get("gateway_customer_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn map_order(row: &PgRow) -> Result<Order, RepositoryError> {
    let currency = parse_currency(row.try_get::<String, _>("currency")?.as_str())?;
    let status = parse_status(row.try_get::<String, _>("status")?.as_str())?;
    Ok(Order {
        id: OrderId::new(row.try_get("id")?),
        user_id: UserId::new(row.try_get("user_id")?),
        address_id: AddressId::new(row.try_get("address_id")?),
        shipping_method_id: ShippingMethodId::new(row.try_get("shipping_method_id")?),
        subtotal: Money::new(row.try_get("subtotal")?, currency),
        status,
        transaction_ref: row.try_get("transaction_ref")?,
        failure_reason: row.try_get("failure_reason")?,
        created_at: row.try_get("created_at")?,
        status_changed_at: row.try_get("status_changed_at")?,
    })
}

fn map_payment_method(row: &PgRow) -> Result<PaymentMethod, RepositoryError> {
    Ok(PaymentMethod {
        id: PaymentMethodId::new(row.try_get("id")?),
        user_id: UserId::new(row.try_get("user_id")?),
        card_type: row.try_get("card_type")?,
        last_four: row.try_get("last_four")?,
        provider_ref: row.try_get("provider_ref")?,
        default: row.try_get("default")?,
        created_at: row.try_get("created_at")?,
    })
}

fn map_address(row: &PgRow) -> Result<Address, RepositoryError> {
    Ok(Address {
        id: AddressId::new(row.try_get("id")?),
        user_id: UserId::new(row.try_get("user_id")?),
        name: row.try_get("name")?,
        address_line: row.try_get("address_line")?,
        city: row.try_get("city")?,
        postal_code: row.try_get("postal_code")?,
        country: row.try_get("country")?,
        default: row.try_get("default")?,
        created_at: row.try_get("created_at")?,
    })
}

const ORDER_COLUMNS: &str = "id, user_id, address_id, shipping_method_id, subtotal, currency, \
                             status, transaction_ref, failure_reason, created_at, status_changed_at";

/// Run a conflict-prone write, retrying once when a concurrent writer got
/// there first.
///
/// Two transactions can both demote the current default row without seeing
/// each other's uncommitted insert; the partial unique index catches the
/// loser, whose retry then demotes the winner's committed row.
async fn retry_once_on_conflict<T, F, Fut>(mut op: F) -> Result<T, RepositoryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RepositoryError>>,
{
    match op().await {
        Err(RepositoryError::Conflict(reason)) => {
            tracing::debug!(%reason, "Retrying conflicted write");
            op().await
        }
        other => other,
    }
}

/// User repository over Postgres.
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn user_by_token(&self, token: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, email, gateway_customer_id, created_at FROM users WHERE api_token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_user).transpose()
    }

    async fn user_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, email, gateway_customer_id, created_at FROM users WHERE id = $1",
        )
        .bind(id.as_i32())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_user).transpose()
    }

    async fn set_gateway_customer_id(
        &self,
        id: UserId,
        customer_ref: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE users SET gateway_customer_id = $1 WHERE id = $2")
            .bind(customer_ref)
            .bind(id.as_i32())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

/// Catalog repository over Postgres with a short-lived read cache.
pub struct PgProductCatalog {
    pool: PgPool,
    cache: Cache<VariationId, CatalogVariation>,
}

impl PgProductCatalog {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            cache: Cache::builder().time_to_live(CATALOG_CACHE_TTL).build(),
        }
    }

    async fn load_variation(
        &self,
        id: VariationId,
    ) -> Result<Option<CatalogVariation>, RepositoryError> {
        let row = sqlx::query(
            "SELECT v.id, v.product_id, v.name, v.price, p.price AS product_price, p.currency \
             FROM product_variations v \
             JOIN products p ON p.id = v.product_id \
             WHERE v.id = $1",
        )
        .bind(id.as_i32())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let currency = parse_currency(row.try_get::<String, _>("currency")?.as_str())?;
        let variation = ProductVariation {
            id: VariationId::new(row.try_get("id")?),
            product_id: ProductId::new(row.try_get("product_id")?),
            name: row.try_get("name")?,
            price: row
                .try_get::<Option<i64>, _>("price")?
                .map(|amount| Money::new(amount, currency)),
        };
        let product_price = Money::new(row.try_get("product_price")?, currency);

        let stock_rows = sqlx::query(
            "SELECT id, product_variation_id, quantity FROM stocks \
             WHERE product_variation_id = $1 ORDER BY id",
        )
        .bind(id.as_i32())
        .fetch_all(&self.pool)
        .await?;

        let mut stocks = Vec::with_capacity(stock_rows.len());
        for stock in &stock_rows {
            stocks.push(Stock {
                id: StockId::new(stock.try_get("id")?),
                variation_id: VariationId::new(stock.try_get("product_variation_id")?),
                quantity: stock.try_get("quantity")?,
            });
        }

        Ok(Some(CatalogVariation {
            variation,
            product_price,
            stocks,
        }))
    }
}

#[async_trait]
impl ProductCatalog for PgProductCatalog {
    async fn variation(
        &self,
        id: VariationId,
    ) -> Result<Option<CatalogVariation>, RepositoryError> {
        if let Some(cached) = self.cache.get(&id).await {
            return Ok(Some(cached));
        }

        let loaded = self.load_variation(id).await?;
        if let Some(found) = &loaded {
            self.cache.insert(id, found.clone()).await;
        }
        Ok(loaded)
    }
}

/// Cart repository over Postgres.
pub struct PgCartStore {
    pool: PgPool,
}

impl PgCartStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CartStore for PgCartStore {
    async fn upsert_items(
        &self,
        user: UserId,
        items: &[(VariationId, u32)],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for (variation, quantity) in items {
            sqlx::query(
                "INSERT INTO cart_items (user_id, product_variation_id, quantity) \
                 VALUES ($1, $2, $3) \
                 ON CONFLICT (user_id, product_variation_id) \
                 DO UPDATE SET quantity = EXCLUDED.quantity, updated_at = now()",
            )
            .bind(user.as_i32())
            .bind(variation.as_i32())
            .bind(i32::try_from(*quantity).map_err(|_| {
                RepositoryError::Conflict("quantity exceeds supported range".to_owned())
            })?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn items(&self, user: UserId) -> Result<Vec<CartItem>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT user_id, product_variation_id, quantity, updated_at \
             FROM cart_items WHERE user_id = $1 ORDER BY product_variation_id",
        )
        .bind(user.as_i32())
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            let quantity: i32 = row.try_get("quantity")?;
            items.push(CartItem {
                user_id: UserId::new(row.try_get("user_id")?),
                variation_id: VariationId::new(row.try_get("product_variation_id")?),
                quantity: u32::try_from(quantity).map_err(|_| {
                    RepositoryError::DataCorruption(format!("negative cart quantity: {quantity}"))
                })?,
                updated_at: row.try_get("updated_at")?,
            });
        }
        Ok(items)
    }

    async fn remove_item(
        &self,
        user: UserId,
        variation: VariationId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM cart_items WHERE user_id = $1 AND product_variation_id = $2",
        )
        .bind(user.as_i32())
        .bind(variation.as_i32())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear(&self, user: UserId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user.as_i32())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Order repository over Postgres.
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create(
        &self,
        user: UserId,
        address: AddressId,
        shipping_method: ShippingMethodId,
        subtotal: Money,
    ) -> Result<Order, RepositoryError> {
        let row = sqlx::query(&format!(
            "INSERT INTO orders (user_id, address_id, shipping_method_id, subtotal, currency) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {ORDER_COLUMNS}"
        ))
        .bind(user.as_i32())
        .bind(address.as_i32())
        .bind(shipping_method.as_i32())
        .bind(subtotal.amount())
        .bind(subtotal.currency().to_string())
        .fetch_one(&self.pool)
        .await?;

        map_order(&row)
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id.as_i32())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_order).transpose()
    }

    async fn for_user(&self, user: UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user.as_i32())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_order).collect()
    }

    async fn transition(
        &self,
        id: OrderId,
        expected: &[OrderStatus],
        to: OrderStatus,
        transaction_ref: Option<&str>,
        failure_reason: Option<&str>,
    ) -> Result<Order, RepositoryError> {
        let expected_text: Vec<String> = expected.iter().map(ToString::to_string).collect();

        let row = sqlx::query(&format!(
            "UPDATE orders SET status = $2, \
             transaction_ref = COALESCE($3, transaction_ref), \
             failure_reason = $4, \
             status_changed_at = now() \
             WHERE id = $1 AND status = ANY($5) RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id.as_i32())
        .bind(to.to_string())
        .bind(transaction_ref)
        .bind(failure_reason)
        .bind(&expected_text)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => map_order(&row),
            None => {
                // Distinguish a missing order from a lost CAS race.
                let current = self.get(id).await?.ok_or(RepositoryError::NotFound)?;
                Err(RepositoryError::InvalidTransition {
                    from: current.status,
                    to,
                })
            }
        }
    }

    async fn stale_payment_pending(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE status = 'payment_pending' AND status_changed_at < $1"
        ))
        .bind(older_than)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_order).collect()
    }
}

/// Payment method repository over Postgres.
pub struct PgPaymentMethodStore {
    pool: PgPool,
}

impl PgPaymentMethodStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn try_create(
        &self,
        user: UserId,
        new: &NewPaymentMethod,
    ) -> Result<PaymentMethod, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        if new.default {
            sqlx::query(
                "UPDATE payment_methods SET \"default\" = FALSE \
                 WHERE user_id = $1 AND \"default\"",
            )
            .bind(user.as_i32())
            .execute(&mut *tx)
            .await?;
        }

        let row = sqlx::query(
            "INSERT INTO payment_methods (user_id, card_type, last_four, provider_ref, \"default\") \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, user_id, card_type, last_four, provider_ref, \"default\", created_at",
        )
        .bind(user.as_i32())
        .bind(&new.card_type)
        .bind(&new.last_four)
        .bind(&new.provider_ref)
        .bind(new.default)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return RepositoryError::Conflict("concurrent default payment method".to_owned());
            }
            RepositoryError::Database(e)
        })?;

        tx.commit().await?;
        map_payment_method(&row)
    }
}

#[async_trait]
impl PaymentMethodStore for PgPaymentMethodStore {
    async fn create(
        &self,
        user: UserId,
        new: NewPaymentMethod,
    ) -> Result<PaymentMethod, RepositoryError> {
        retry_once_on_conflict(|| self.try_create(user, &new)).await
    }

    async fn for_user(&self, user: UserId) -> Result<Vec<PaymentMethod>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, user_id, card_type, last_four, provider_ref, \"default\", created_at \
             FROM payment_methods WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user.as_i32())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_payment_method).collect()
    }

    async fn default_for_user(
        &self,
        user: UserId,
    ) -> Result<Option<PaymentMethod>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, user_id, card_type, last_four, provider_ref, \"default\", created_at \
             FROM payment_methods WHERE user_id = $1 AND \"default\"",
        )
        .bind(user.as_i32())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_payment_method).transpose()
    }
}

/// Address repository over Postgres.
pub struct PgAddressStore {
    pool: PgPool,
}

impl PgAddressStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn try_create(
        &self,
        user: UserId,
        new: &NewAddress,
    ) -> Result<Address, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        if new.default {
            sqlx::query(
                "UPDATE addresses SET \"default\" = FALSE WHERE user_id = $1 AND \"default\"",
            )
            .bind(user.as_i32())
            .execute(&mut *tx)
            .await?;
        }

        let row = sqlx::query(
            "INSERT INTO addresses (user_id, name, address_line, city, postal_code, country, \"default\") \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING id, user_id, name, address_line, city, postal_code, country, \"default\", created_at",
        )
        .bind(user.as_i32())
        .bind(&new.name)
        .bind(&new.address_line)
        .bind(&new.city)
        .bind(&new.postal_code)
        .bind(&new.country)
        .bind(new.default)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return RepositoryError::Conflict("concurrent default address".to_owned());
            }
            RepositoryError::Database(e)
        })?;

        tx.commit().await?;
        map_address(&row)
    }
}

#[async_trait]
impl AddressStore for PgAddressStore {
    async fn create(&self, user: UserId, new: NewAddress) -> Result<Address, RepositoryError> {
        retry_once_on_conflict(|| self.try_create(user, &new)).await
    }

    async fn for_user(&self, user: UserId) -> Result<Vec<Address>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, user_id, name, address_line, city, postal_code, country, \"default\", created_at \
             FROM addresses WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user.as_i32())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_address).collect()
    }

    async fn get(&self, user: UserId, id: AddressId) -> Result<Option<Address>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, user_id, name, address_line, city, postal_code, country, \"default\", created_at \
             FROM addresses WHERE id = $1 AND user_id = $2",
        )
        .bind(id.as_i32())
        .bind(user.as_i32())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_address).transpose()
    }
}
