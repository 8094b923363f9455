//! In-memory storage.
//!
//! Backs unit/integration tests and `orchard-cli seed`'s demo mode. All
//! state sits behind one mutex, which gives the same atomicity the Postgres
//! transactions provide for default demotion and status compare-and-set.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use orchard_core::{
    AddressId, Money, OrderId, OrderStatus, PaymentMethodId, ProductId, ShippingMethodId, StockId,
    UserId, VariationId,
};

use super::{
    AddressStore, CartStore, OrderStore, PaymentMethodStore, ProductCatalog, RepositoryError,
    UserStore,
};
use crate::models::{
    Address, CartItem, CatalogVariation, NewAddress, NewPaymentMethod, Order, PaymentMethod,
    Product, ProductVariation, Stock, User,
};

struct UserRecord {
    user: User,
    api_token: String,
}

#[derive(Default)]
struct Inner {
    next_id: i32,
    users: BTreeMap<UserId, UserRecord>,
    products: BTreeMap<ProductId, Product>,
    variations: BTreeMap<VariationId, ProductVariation>,
    stocks: Vec<Stock>,
    cart: BTreeMap<(UserId, VariationId), CartItem>,
    orders: BTreeMap<OrderId, Order>,
    payment_methods: BTreeMap<PaymentMethodId, PaymentMethod>,
    addresses: BTreeMap<AddressId, Address>,
}

impl Inner {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory implementation of every storage trait.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------
    // Fixture helpers (tests, seeding)
    // ------------------------------------------------------------------

    /// Insert a user and return it with its bearer token.
    pub fn insert_user(&self, email: &str) -> (User, String) {
        let mut inner = self.lock();
        let id = UserId::new(inner.next_id());
        let token = format!("tok-{id}");
        let user = User {
            id,
            email: email.to_owned(),
            gateway_customer_id: None,
            created_at: Utc::now(),
        };
        inner.users.insert(
            id,
            UserRecord {
                user: user.clone(),
                api_token: token.clone(),
            },
        );
        (user, token)
    }

    pub fn insert_product(&self, name: &str, price: Money) -> Product {
        let mut inner = self.lock();
        let id = ProductId::new(inner.next_id());
        let product = Product {
            id,
            name: name.to_owned(),
            price,
        };
        inner.products.insert(id, product.clone());
        product
    }

    pub fn insert_variation(
        &self,
        product_id: ProductId,
        name: &str,
        price: Option<Money>,
    ) -> ProductVariation {
        let mut inner = self.lock();
        let id = VariationId::new(inner.next_id());
        let variation = ProductVariation {
            id,
            product_id,
            name: name.to_owned(),
            price,
        };
        inner.variations.insert(id, variation.clone());
        variation
    }

    pub fn insert_stock(&self, variation_id: VariationId, quantity: i64) -> Stock {
        let mut inner = self.lock();
        let id = StockId::new(inner.next_id());
        let stock = Stock {
            id,
            variation_id,
            quantity,
        };
        inner.stocks.push(stock.clone());
        stock
    }

    /// Reprice a product in place (variations without their own price follow).
    pub fn set_product_price(&self, product_id: ProductId, price: Money) {
        let mut inner = self.lock();
        if let Some(product) = inner.products.get_mut(&product_id) {
            product.price = price;
        }
    }

    /// Rewind an order's `status_changed_at`, for exercising the stale sweep.
    pub fn backdate_order_status(&self, order_id: OrderId, status_changed_at: DateTime<Utc>) {
        let mut inner = self.lock();
        if let Some(order) = inner.orders.get_mut(&order_id) {
            order.status_changed_at = status_changed_at;
        }
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn user_by_token(&self, token: &str) -> Result<Option<User>, RepositoryError> {
        let inner = self.lock();
        Ok(inner
            .users
            .values()
            .find(|record| record.api_token == token)
            .map(|record| record.user.clone()))
    }

    async fn user_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let inner = self.lock();
        Ok(inner.users.get(&id).map(|record| record.user.clone()))
    }

    async fn set_gateway_customer_id(
        &self,
        id: UserId,
        customer_ref: &str,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.lock();
        let record = inner.users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        record.user.gateway_customer_id = Some(customer_ref.to_owned());
        Ok(())
    }
}

#[async_trait]
impl ProductCatalog for MemoryStore {
    async fn variation(
        &self,
        id: VariationId,
    ) -> Result<Option<CatalogVariation>, RepositoryError> {
        let inner = self.lock();
        let Some(variation) = inner.variations.get(&id) else {
            return Ok(None);
        };
        let product = inner
            .products
            .get(&variation.product_id)
            .ok_or_else(|| {
                RepositoryError::DataCorruption(format!(
                    "variation {id} references missing product {}",
                    variation.product_id
                ))
            })?;
        let stocks = inner
            .stocks
            .iter()
            .filter(|stock| stock.variation_id == id)
            .cloned()
            .collect();

        Ok(Some(CatalogVariation {
            variation: variation.clone(),
            product_price: product.price,
            stocks,
        }))
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn upsert_items(
        &self,
        user: UserId,
        items: &[(VariationId, u32)],
    ) -> Result<(), RepositoryError> {
        let mut inner = self.lock();
        for (variation, quantity) in items {
            inner.cart.insert(
                (user, *variation),
                CartItem {
                    user_id: user,
                    variation_id: *variation,
                    quantity: *quantity,
                    updated_at: Utc::now(),
                },
            );
        }
        Ok(())
    }

    async fn items(&self, user: UserId) -> Result<Vec<CartItem>, RepositoryError> {
        let inner = self.lock();
        Ok(inner
            .cart
            .range((user, VariationId::new(i32::MIN))..=(user, VariationId::new(i32::MAX)))
            .map(|(_, item)| item.clone())
            .collect())
    }

    async fn remove_item(
        &self,
        user: UserId,
        variation: VariationId,
    ) -> Result<bool, RepositoryError> {
        let mut inner = self.lock();
        Ok(inner.cart.remove(&(user, variation)).is_some())
    }

    async fn clear(&self, user: UserId) -> Result<(), RepositoryError> {
        let mut inner = self.lock();
        inner.cart.retain(|(owner, _), _| *owner != user);
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn create(
        &self,
        user: UserId,
        address: AddressId,
        shipping_method: ShippingMethodId,
        subtotal: Money,
    ) -> Result<Order, RepositoryError> {
        let mut inner = self.lock();
        let id = OrderId::new(inner.next_id());
        let now = Utc::now();
        let order = Order {
            id,
            user_id: user,
            address_id: address,
            shipping_method_id: shipping_method,
            subtotal,
            status: OrderStatus::Created,
            transaction_ref: None,
            failure_reason: None,
            created_at: now,
            status_changed_at: now,
        };
        inner.orders.insert(id, order.clone());
        Ok(order)
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let inner = self.lock();
        Ok(inner.orders.get(&id).cloned())
    }

    async fn for_user(&self, user: UserId) -> Result<Vec<Order>, RepositoryError> {
        let inner = self.lock();
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|order| order.user_id == user)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn transition(
        &self,
        id: OrderId,
        expected: &[OrderStatus],
        to: OrderStatus,
        transaction_ref: Option<&str>,
        failure_reason: Option<&str>,
    ) -> Result<Order, RepositoryError> {
        let mut inner = self.lock();
        let order = inner.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;

        if !expected.contains(&order.status) {
            return Err(RepositoryError::InvalidTransition {
                from: order.status,
                to,
            });
        }

        order.status = to;
        order.status_changed_at = Utc::now();
        if let Some(reference) = transaction_ref {
            order.transaction_ref = Some(reference.to_owned());
        }
        order.failure_reason = failure_reason.map(ToOwned::to_owned);
        Ok(order.clone())
    }

    async fn stale_payment_pending(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Order>, RepositoryError> {
        let inner = self.lock();
        Ok(inner
            .orders
            .values()
            .filter(|order| {
                order.status == OrderStatus::PaymentPending
                    && order.status_changed_at < older_than
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PaymentMethodStore for MemoryStore {
    async fn create(
        &self,
        user: UserId,
        new: NewPaymentMethod,
    ) -> Result<PaymentMethod, RepositoryError> {
        let mut inner = self.lock();
        if new.default {
            for method in inner.payment_methods.values_mut() {
                if method.user_id == user {
                    method.default = false;
                }
            }
        }

        let id = PaymentMethodId::new(inner.next_id());
        let method = PaymentMethod {
            id,
            user_id: user,
            card_type: new.card_type,
            last_four: new.last_four,
            provider_ref: new.provider_ref,
            default: new.default,
            created_at: Utc::now(),
        };
        inner.payment_methods.insert(id, method.clone());
        Ok(method)
    }

    async fn for_user(&self, user: UserId) -> Result<Vec<PaymentMethod>, RepositoryError> {
        let inner = self.lock();
        Ok(inner
            .payment_methods
            .values()
            .filter(|method| method.user_id == user)
            .cloned()
            .collect())
    }

    async fn default_for_user(
        &self,
        user: UserId,
    ) -> Result<Option<PaymentMethod>, RepositoryError> {
        let inner = self.lock();
        Ok(inner
            .payment_methods
            .values()
            .find(|method| method.user_id == user && method.default)
            .cloned())
    }
}

#[async_trait]
impl AddressStore for MemoryStore {
    async fn create(&self, user: UserId, new: NewAddress) -> Result<Address, RepositoryError> {
        let mut inner = self.lock();
        if new.default {
            for address in inner.addresses.values_mut() {
                if address.user_id == user {
                    address.default = false;
                }
            }
        }

        let id = AddressId::new(inner.next_id());
        let address = Address {
            id,
            user_id: user,
            name: new.name,
            address_line: new.address_line,
            city: new.city,
            postal_code: new.postal_code,
            country: new.country,
            default: new.default,
            created_at: Utc::now(),
        };
        inner.addresses.insert(id, address.clone());
        Ok(address)
    }

    async fn for_user(&self, user: UserId) -> Result<Vec<Address>, RepositoryError> {
        let inner = self.lock();
        Ok(inner
            .addresses
            .values()
            .filter(|address| address.user_id == user)
            .cloned()
            .collect())
    }

    async fn get(&self, user: UserId, id: AddressId) -> Result<Option<Address>, RepositoryError> {
        let inner = self.lock();
        Ok(inner
            .addresses
            .get(&id)
            .filter(|address| address.user_id == user)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchard_core::CurrencyCode;

    fn money(amount: i64) -> Money {
        Money::new(amount, CurrencyCode::GBP)
    }

    fn new_method(default: bool) -> NewPaymentMethod {
        NewPaymentMethod {
            card_type: "visa".to_owned(),
            last_four: "4242".to_owned(),
            provider_ref: "pm_test".to_owned(),
            default,
        }
    }

    fn new_address(default: bool) -> NewAddress {
        NewAddress {
            name: "Home".to_owned(),
            address_line: "1 Orchard Lane".to_owned(),
            city: "London".to_owned(),
            postal_code: "E1 6AN".to_owned(),
            country: "GB".to_owned(),
            default,
        }
    }

    #[tokio::test]
    async fn test_upsert_overwrites_quantity() {
        let store = MemoryStore::new();
        let (user, _) = store.insert_user("u@example.com");
        let variation = VariationId::new(10);

        store
            .upsert_items(user.id, &[(variation, 1)])
            .await
            .expect("upsert");
        store
            .upsert_items(user.id, &[(variation, 5)])
            .await
            .expect("upsert");

        let items = store.items(user.id).await.expect("items");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 5);
    }

    #[tokio::test]
    async fn test_cart_rows_are_per_user() {
        let store = MemoryStore::new();
        let (alice, _) = store.insert_user("alice@example.com");
        let (bob, _) = store.insert_user("bob@example.com");
        let variation = VariationId::new(10);

        store
            .upsert_items(alice.id, &[(variation, 2)])
            .await
            .expect("upsert");

        assert!(store.items(bob.id).await.expect("items").is_empty());
        store.clear(bob.id).await.expect("clear");
        assert_eq!(store.items(alice.id).await.expect("items").len(), 1);
    }

    #[tokio::test]
    async fn test_second_default_payment_method_demotes_first() {
        let store = MemoryStore::new();
        let (user, _) = store.insert_user("u@example.com");

        let first = PaymentMethodStore::create(&store, user.id, new_method(true))
            .await
            .expect("create");
        let second = PaymentMethodStore::create(&store, user.id, new_method(true))
            .await
            .expect("create");

        let methods = PaymentMethodStore::for_user(&store, user.id)
            .await
            .expect("list");
        let defaults: Vec<_> = methods.iter().filter(|m| m.default).collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].id, second.id);
        assert!(!methods.iter().find(|m| m.id == first.id).expect("first").default);
    }

    #[tokio::test]
    async fn test_second_default_address_demotes_first() {
        let store = MemoryStore::new();
        let (user, _) = store.insert_user("u@example.com");

        AddressStore::create(&store, user.id, new_address(true))
            .await
            .expect("create");
        let second = AddressStore::create(&store, user.id, new_address(true))
            .await
            .expect("create");

        let addresses = AddressStore::for_user(&store, user.id).await.expect("list");
        let defaults: Vec<_> = addresses.iter().filter(|a| a.default).collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].id, second.id);
    }

    #[tokio::test]
    async fn test_transition_compare_and_set() {
        let store = MemoryStore::new();
        let (user, _) = store.insert_user("u@example.com");
        let address = AddressStore::create(&store, user.id, new_address(true))
            .await
            .expect("address");
        let order = OrderStore::create(
            &store,
            user.id,
            address.id,
            ShippingMethodId::new(1),
            money(1000),
        )
        .await
        .expect("order");

        // created -> payment_pending succeeds
        let pending = store
            .transition(
                order.id,
                &[OrderStatus::Created],
                OrderStatus::PaymentPending,
                None,
                None,
            )
            .await
            .expect("claim");
        assert_eq!(pending.status, OrderStatus::PaymentPending);

        // a second claim loses the CAS
        let lost = store
            .transition(
                order.id,
                &[OrderStatus::Created],
                OrderStatus::PaymentPending,
                None,
                None,
            )
            .await;
        assert!(matches!(
            lost,
            Err(RepositoryError::InvalidTransition { .. })
        ));

        // settle as paid, keeping the transaction ref
        let paid = store
            .transition(
                order.id,
                &[OrderStatus::PaymentPending],
                OrderStatus::Paid,
                Some("ch_1"),
                None,
            )
            .await
            .expect("settle");
        assert_eq!(paid.status, OrderStatus::Paid);
        assert_eq!(paid.transaction_ref.as_deref(), Some("ch_1"));
    }

    #[tokio::test]
    async fn test_stale_payment_pending_filters_by_age() {
        let store = MemoryStore::new();
        let (user, _) = store.insert_user("u@example.com");
        let address = AddressStore::create(&store, user.id, new_address(true))
            .await
            .expect("address");
        let order = OrderStore::create(
            &store,
            user.id,
            address.id,
            ShippingMethodId::new(1),
            money(500),
        )
        .await
        .expect("order");
        store
            .transition(
                order.id,
                &[OrderStatus::Created],
                OrderStatus::PaymentPending,
                None,
                None,
            )
            .await
            .expect("claim");

        let cutoff = Utc::now() - chrono::Duration::minutes(5);
        assert!(store
            .stale_payment_pending(cutoff)
            .await
            .expect("sweep")
            .is_empty());

        store.backdate_order_status(order.id, cutoff - chrono::Duration::minutes(1));
        let stale = store.stale_payment_pending(cutoff).await.expect("sweep");
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, order.id);
    }
}
