//! Cart and order domain module.
//!
//! Cart line-item rules, the order status lifecycle, and checkout planning.
//! This crate is deterministic domain logic (no IO, no HTTP, no storage): the
//! storage layer supplies locked product snapshots and applies the resulting
//! plan inside one transaction.

pub mod cart;
pub mod checkout;
pub mod order;

pub use cart::{Cart, CartItem, CartLine, CartView};
pub use checkout::{CheckoutPlan, CheckoutRequest, StockDecrement, plan_checkout};
pub use order::{Order, OrderItem, OrderStatus};
