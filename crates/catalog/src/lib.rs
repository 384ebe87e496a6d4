//! Catalog domain module.
//!
//! Products, categories and reviews, the rating aggregator, and the product
//! query model. Everything here is deterministic domain logic (no IO, no HTTP,
//! no storage); storage backends evaluate queries with the rules defined here.

pub mod category;
pub mod product;
pub mod query;
pub mod rating;
pub mod review;

pub use category::{Category, CategoryUpdate, CategoryView, NewCategory};
pub use product::{NewProduct, Product, ProductUpdate};
pub use query::{
    Page, PageRequest, ProductFilter, ProductQuery, ProductSort, ProductView, SortDirection,
    SortField, select_products,
};
pub use rating::{RatingIndex, RatingSummary};
pub use review::{NewReview, Review, ReviewUpdate};
