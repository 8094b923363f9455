//! Domain services built on the storage traits.

pub mod cart;

pub use cart::{Cart, CartError, DetailedCartItem};
