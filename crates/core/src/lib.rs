//! `shopswift-core`: storefront domain building blocks.
//!
//! This crate contains **pure domain** primitives shared by the catalog and
//! ordering crates (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod patch;
pub mod value_object;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{CartId, CartItemId, CategoryId, OrderId, OrderItemId, ProductId, ReviewId, UserId};
pub use money::Money;
pub use patch::Patch;
pub use value_object::ValueObject;
