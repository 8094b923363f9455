//! Domain models for the shop.

pub mod address;
pub mod cart;
pub mod order;
pub mod payment_method;
pub mod product;
pub mod user;

pub use address::{Address, NewAddress};
pub use cart::CartItem;
pub use order::Order;
pub use payment_method::{NewPaymentMethod, PaymentMethod};
pub use product::{CatalogVariation, Product, ProductVariation, Stock};
pub use user::User;
