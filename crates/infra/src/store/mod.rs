//! Transactional storage boundary.
//!
//! Services open a [`UnitOfWork`] with [`Store::begin`], perform all reads and
//! writes of one operation through it, and [`UnitOfWork::commit`]. Dropping a
//! unit of work without committing discards every write made through it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use shopswift_catalog::{Category, CategoryView, Product, ProductQuery, Review};
use shopswift_core::{
    CartId, CartItemId, CategoryId, OrderId, ProductId, ReviewId, UserId,
};
use shopswift_orders::{Cart, CartItem, Order};

use crate::config::AppConfig;
use crate::error::ServiceResult;

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

/// Isolation required by a unit of work.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TxMode {
    /// Consistent read-only snapshot (list pages and their rating aggregates
    /// come from the same point in time).
    Snapshot,
    /// Read-write. Rows read through `products_for_update`, `product_for_update`
    /// and `get_or_create_cart` stay locked until commit or rollback.
    Write,
}

impl TxMode {
    /// `SET TRANSACTION` characteristics for Postgres.
    pub fn as_sql(self) -> &'static str {
        match self {
            TxMode::Snapshot => "ISOLATION LEVEL REPEATABLE READ, READ ONLY",
            TxMode::Write => "ISOLATION LEVEL READ COMMITTED, READ WRITE",
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self, mode: TxMode) -> ServiceResult<Box<dyn UnitOfWork>>;
}

#[async_trait]
impl<S> Store for Arc<S>
where
    S: Store + ?Sized,
{
    async fn begin(&self, mode: TxMode) -> ServiceResult<Box<dyn UnitOfWork>> {
        (**self).begin(mode).await
    }
}

/// Products, categories and reviews.
#[async_trait]
pub trait CatalogRepo: Send {
    async fn product(&mut self, id: ProductId) -> ServiceResult<Option<Product>>;

    /// Read and lock one product for a read-modify-write of the whole row.
    async fn product_for_update(&mut self, id: ProductId) -> ServiceResult<Option<Product>>;

    async fn products(&mut self, ids: &[ProductId]) -> ServiceResult<Vec<Product>>;

    /// Read and lock the given products, in ascending id order.
    async fn products_for_update(&mut self, ids: &[ProductId]) -> ServiceResult<Vec<Product>>;

    async fn insert_product(&mut self, product: &Product) -> ServiceResult<()>;

    async fn update_product(&mut self, product: &Product) -> ServiceResult<()>;

    /// Remove the row. Reviews and cart lines go with it; order lines keep
    /// their frozen data with the product reference cleared.
    async fn delete_product(&mut self, id: ProductId) -> ServiceResult<bool>;

    /// Subtract `quantity` from stock only if enough remains. Returns whether
    /// the row was updated.
    async fn decrement_stock(&mut self, id: ProductId, quantity: u32) -> ServiceResult<bool>;

    /// One page of matching products plus the pre-pagination total.
    async fn query_products(&mut self, query: &ProductQuery) -> ServiceResult<(Vec<Product>, u64)>;

    async fn count_products_in_category(
        &mut self,
        id: CategoryId,
        active_only: bool,
    ) -> ServiceResult<u64>;

    async fn category(&mut self, id: CategoryId) -> ServiceResult<Option<Category>>;

    async fn categories(&mut self, ids: &[CategoryId]) -> ServiceResult<Vec<Category>>;

    /// Case-insensitive lookup.
    async fn category_by_name(&mut self, name: &str) -> ServiceResult<Option<Category>>;

    /// Categories by name, with their active product counts.
    async fn list_categories(&mut self, active_only: bool) -> ServiceResult<Vec<CategoryView>>;

    async fn insert_category(&mut self, category: &Category) -> ServiceResult<()>;

    async fn update_category(&mut self, category: &Category) -> ServiceResult<()>;

    async fn delete_category(&mut self, id: CategoryId) -> ServiceResult<bool>;

    async fn review(&mut self, id: ReviewId) -> ServiceResult<Option<Review>>;

    async fn review_by_author(
        &mut self,
        user_id: UserId,
        product_id: ProductId,
    ) -> ServiceResult<Option<Review>>;

    async fn insert_review(&mut self, review: &Review) -> ServiceResult<()>;

    async fn update_review(&mut self, review: &Review) -> ServiceResult<()>;

    async fn delete_review(&mut self, id: ReviewId) -> ServiceResult<bool>;

    /// Newest first.
    async fn reviews_for_product(
        &mut self,
        product_id: ProductId,
        skip: u64,
        limit: u32,
    ) -> ServiceResult<Vec<Review>>;

    /// Every `(product, rating)` pair for the given products.
    async fn ratings(&mut self, product_ids: &[ProductId]) -> ServiceResult<Vec<(ProductId, u8)>>;
}

#[async_trait]
pub trait CartRepo: Send {
    /// The user's cart with its lines (oldest line first), created empty if absent.
    ///
    /// The cart stays locked until the unit of work ends; only call it from a
    /// write unit of work.
    async fn get_or_create_cart(&mut self, user_id: UserId, now: DateTime<Utc>) -> ServiceResult<Cart>;

    /// Insert or update a line, keyed by its id.
    async fn save_cart_item(&mut self, item: &CartItem) -> ServiceResult<()>;

    async fn delete_cart_item(&mut self, cart_id: CartId, item_id: CartItemId) -> ServiceResult<bool>;

    async fn clear_cart(&mut self, cart_id: CartId) -> ServiceResult<()>;

    async fn touch_cart(&mut self, cart_id: CartId, now: DateTime<Utc>) -> ServiceResult<()>;
}

#[async_trait]
pub trait OrderRepo: Send {
    /// Insert the header and all of its items.
    async fn insert_order(&mut self, order: &Order) -> ServiceResult<()>;

    async fn order(&mut self, id: OrderId) -> ServiceResult<Option<Order>>;

    /// Newest first.
    async fn orders_for_user(&mut self, user_id: UserId) -> ServiceResult<Vec<Order>>;

    /// Newest first.
    async fn all_orders(&mut self) -> ServiceResult<Vec<Order>>;

    async fn update_order_status(&mut self, order: &Order) -> ServiceResult<()>;
}

/// One transaction over every repository.
#[async_trait]
pub trait UnitOfWork: CatalogRepo + CartRepo + OrderRepo {
    async fn commit(self: Box<Self>) -> ServiceResult<()>;

    async fn rollback(self: Box<Self>) -> ServiceResult<()>;
}

/// Open the configured backend: Postgres when a database URL is set,
/// otherwise an empty in-memory store.
pub async fn connect_store(config: &AppConfig) -> ServiceResult<Arc<dyn Store>> {
    match &config.database_url {
        Some(url) => {
            let store = PostgresStore::connect(url, config.database_max_connections).await?;
            store.migrate().await?;
            tracing::info!("using postgres store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory store");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_modes_map_to_postgres_isolation() {
        assert!(TxMode::Snapshot.as_sql().contains("REPEATABLE READ"));
        assert!(TxMode::Snapshot.as_sql().contains("READ ONLY"));
        assert!(TxMode::Write.as_sql().contains("READ COMMITTED"));
    }
}
