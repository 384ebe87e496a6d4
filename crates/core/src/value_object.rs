//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have **no identity** and are **immutable**: two instances with the
/// same attribute values are interchangeable. `Money` is the canonical example in
/// this workspace; a snapshot price copied onto an order line is a value, not a
/// reference to the product it came from.
///
/// ```ignore
/// let a = Money::from_cents(1000);
/// let b = Money::from_cents(1000);
/// assert_eq!(a, b); // equal by value
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
