use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use shopswift_catalog::{
    Category, CategoryView, Product, ProductQuery, RatingIndex, Review, select_products,
};
use shopswift_core::{
    CartId, CartItemId, CategoryId, DomainError, OrderId, ProductId, ReviewId, UserId,
};
use shopswift_orders::{Cart, CartItem, Order};

use super::{CartRepo, CatalogRepo, OrderRepo, Store, TxMode, UnitOfWork};
use crate::error::ServiceResult;

#[derive(Debug, Clone)]
struct CartRow {
    id: CartId,
    user_id: UserId,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    products: BTreeMap<ProductId, Product>,
    categories: BTreeMap<CategoryId, Category>,
    reviews: BTreeMap<ReviewId, Review>,
    carts: BTreeMap<CartId, CartRow>,
    cart_items: BTreeMap<CartItemId, CartItem>,
    orders: BTreeMap<OrderId, Order>,
}

/// In-memory store.
///
/// Intended for tests/dev. Units of work are fully serialized: each one holds
/// the store lock from `begin` until it is committed or dropped, and writes
/// go to a private copy that replaces the shared tables on commit.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self, _mode: TxMode) -> ServiceResult<Box<dyn UnitOfWork>> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryUnitOfWork { guard, working }))
    }
}

struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

impl InMemoryUnitOfWork {
    fn cart_of(&self, row: &CartRow) -> Cart {
        let mut items: Vec<CartItem> = self
            .working
            .cart_items
            .values()
            .filter(|i| i.cart_id == row.id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.added_at.cmp(&b.added_at).then(a.id.cmp(&b.id)));
        Cart {
            id: row.id,
            user_id: row.user_id,
            items,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        orders
    }
}

#[async_trait]
impl CatalogRepo for InMemoryUnitOfWork {
    async fn product(&mut self, id: ProductId) -> ServiceResult<Option<Product>> {
        Ok(self.working.products.get(&id).cloned())
    }

    // The unit of work already holds the store-wide lock.
    async fn product_for_update(&mut self, id: ProductId) -> ServiceResult<Option<Product>> {
        self.product(id).await
    }

    async fn products(&mut self, ids: &[ProductId]) -> ServiceResult<Vec<Product>> {
        Ok(ids
            .iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .filter_map(|id| self.working.products.get(id).cloned())
            .collect())
    }

    async fn products_for_update(&mut self, ids: &[ProductId]) -> ServiceResult<Vec<Product>> {
        let mut rows = self.products(ids).await?;
        rows.sort_by_key(|p| p.id);
        Ok(rows)
    }

    async fn insert_product(&mut self, product: &Product) -> ServiceResult<()> {
        if self.working.products.contains_key(&product.id) {
            return Err(DomainError::conflict("product already exists").into());
        }
        self.working.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn update_product(&mut self, product: &Product) -> ServiceResult<()> {
        match self.working.products.get_mut(&product.id) {
            Some(row) => {
                *row = product.clone();
                Ok(())
            }
            None => Err(DomainError::not_found("product").into()),
        }
    }

    async fn delete_product(&mut self, id: ProductId) -> ServiceResult<bool> {
        if self.working.products.remove(&id).is_none() {
            return Ok(false);
        }
        self.working.reviews.retain(|_, r| r.product_id != id);
        self.working.cart_items.retain(|_, i| i.product_id != id);
        for order in self.working.orders.values_mut() {
            for item in &mut order.items {
                if item.product_id == Some(id) {
                    item.product_id = None;
                }
            }
        }
        Ok(true)
    }

    async fn decrement_stock(&mut self, id: ProductId, quantity: u32) -> ServiceResult<bool> {
        match self.working.products.get_mut(&id) {
            Some(p) if p.stock_quantity >= quantity => {
                p.stock_quantity -= quantity;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn query_products(&mut self, query: &ProductQuery) -> ServiceResult<(Vec<Product>, u64)> {
        let ratings = RatingIndex::from_pairs(
            self.working
                .reviews
                .values()
                .map(|r| (r.product_id, r.rating)),
        );
        Ok(select_products(
            self.working.products.values(),
            &ratings,
            query,
        ))
    }

    async fn count_products_in_category(
        &mut self,
        id: CategoryId,
        active_only: bool,
    ) -> ServiceResult<u64> {
        Ok(self
            .working
            .products
            .values()
            .filter(|p| p.category_id == Some(id) && (!active_only || p.is_active))
            .count() as u64)
    }

    async fn category(&mut self, id: CategoryId) -> ServiceResult<Option<Category>> {
        Ok(self.working.categories.get(&id).cloned())
    }

    async fn categories(&mut self, ids: &[CategoryId]) -> ServiceResult<Vec<Category>> {
        Ok(ids
            .iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .filter_map(|id| self.working.categories.get(id).cloned())
            .collect())
    }

    async fn category_by_name(&mut self, name: &str) -> ServiceResult<Option<Category>> {
        Ok(self
            .working
            .categories
            .values()
            .find(|c| c.has_name(name))
            .cloned())
    }

    async fn list_categories(&mut self, active_only: bool) -> ServiceResult<Vec<CategoryView>> {
        let mut views: Vec<CategoryView> = self
            .working
            .categories
            .values()
            .filter(|c| !active_only || c.is_active)
            .map(|c| CategoryView {
                category: c.clone(),
                product_count: self
                    .working
                    .products
                    .values()
                    .filter(|p| p.category_id == Some(c.id) && p.is_active)
                    .count() as u64,
            })
            .collect();
        views.sort_by(|a, b| {
            a.category
                .name
                .as_bytes()
                .cmp(b.category.name.as_bytes())
                .then(a.category.id.cmp(&b.category.id))
        });
        Ok(views)
    }

    async fn insert_category(&mut self, category: &Category) -> ServiceResult<()> {
        if self
            .working
            .categories
            .values()
            .any(|c| c.has_name(&category.name))
        {
            return Err(DomainError::conflict("category name already exists").into());
        }
        self.working.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn update_category(&mut self, category: &Category) -> ServiceResult<()> {
        if self
            .working
            .categories
            .values()
            .any(|c| c.id != category.id && c.has_name(&category.name))
        {
            return Err(DomainError::conflict("category name already exists").into());
        }
        match self.working.categories.get_mut(&category.id) {
            Some(row) => {
                *row = category.clone();
                Ok(())
            }
            None => Err(DomainError::not_found("category").into()),
        }
    }

    async fn delete_category(&mut self, id: CategoryId) -> ServiceResult<bool> {
        if self
            .working
            .products
            .values()
            .any(|p| p.category_id == Some(id))
        {
            return Err(DomainError::conflict("category still has products").into());
        }
        Ok(self.working.categories.remove(&id).is_some())
    }

    async fn review(&mut self, id: ReviewId) -> ServiceResult<Option<Review>> {
        Ok(self.working.reviews.get(&id).cloned())
    }

    async fn review_by_author(
        &mut self,
        user_id: UserId,
        product_id: ProductId,
    ) -> ServiceResult<Option<Review>> {
        Ok(self
            .working
            .reviews
            .values()
            .find(|r| r.user_id == user_id && r.product_id == product_id)
            .cloned())
    }

    async fn insert_review(&mut self, review: &Review) -> ServiceResult<()> {
        if self
            .working
            .reviews
            .values()
            .any(|r| r.user_id == review.user_id && r.product_id == review.product_id)
        {
            return Err(DomainError::conflict("product already reviewed by this user").into());
        }
        self.working.reviews.insert(review.id, review.clone());
        Ok(())
    }

    async fn update_review(&mut self, review: &Review) -> ServiceResult<()> {
        match self.working.reviews.get_mut(&review.id) {
            Some(row) => {
                *row = review.clone();
                Ok(())
            }
            None => Err(DomainError::not_found("review").into()),
        }
    }

    async fn delete_review(&mut self, id: ReviewId) -> ServiceResult<bool> {
        Ok(self.working.reviews.remove(&id).is_some())
    }

    async fn reviews_for_product(
        &mut self,
        product_id: ProductId,
        skip: u64,
        limit: u32,
    ) -> ServiceResult<Vec<Review>> {
        let mut reviews: Vec<Review> = self
            .working
            .reviews
            .values()
            .filter(|r| r.product_id == product_id)
            .cloned()
            .collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(reviews
            .into_iter()
            .skip(usize::try_from(skip).unwrap_or(usize::MAX))
            .take(limit as usize)
            .collect())
    }

    async fn ratings(&mut self, product_ids: &[ProductId]) -> ServiceResult<Vec<(ProductId, u8)>> {
        let wanted: HashSet<&ProductId> = product_ids.iter().collect();
        Ok(self
            .working
            .reviews
            .values()
            .filter(|r| wanted.contains(&r.product_id))
            .map(|r| (r.product_id, r.rating))
            .collect())
    }
}

#[async_trait]
impl CartRepo for InMemoryUnitOfWork {
    async fn get_or_create_cart(&mut self, user_id: UserId, now: DateTime<Utc>) -> ServiceResult<Cart> {
        if let Some(row) = self.working.carts.values().find(|c| c.user_id == user_id) {
            return Ok(self.cart_of(row));
        }
        let row = CartRow {
            id: CartId::new(),
            user_id,
            created_at: now,
            updated_at: None,
        };
        let cart = self.cart_of(&row);
        self.working.carts.insert(row.id, row);
        Ok(cart)
    }

    async fn save_cart_item(&mut self, item: &CartItem) -> ServiceResult<()> {
        if !self.working.carts.contains_key(&item.cart_id) {
            return Err(DomainError::not_found("cart").into());
        }
        self.working.cart_items.insert(item.id, item.clone());
        Ok(())
    }

    async fn delete_cart_item(&mut self, cart_id: CartId, item_id: CartItemId) -> ServiceResult<bool> {
        match self.working.cart_items.get(&item_id) {
            Some(item) if item.cart_id == cart_id => {
                self.working.cart_items.remove(&item_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn clear_cart(&mut self, cart_id: CartId) -> ServiceResult<()> {
        self.working.cart_items.retain(|_, i| i.cart_id != cart_id);
        Ok(())
    }

    async fn touch_cart(&mut self, cart_id: CartId, now: DateTime<Utc>) -> ServiceResult<()> {
        if let Some(row) = self.working.carts.get_mut(&cart_id) {
            row.updated_at = Some(now);
        }
        Ok(())
    }
}

#[async_trait]
impl OrderRepo for InMemoryUnitOfWork {
    async fn insert_order(&mut self, order: &Order) -> ServiceResult<()> {
        if self.working.orders.contains_key(&order.id) {
            return Err(DomainError::conflict("order already exists").into());
        }
        self.working.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn order(&mut self, id: OrderId) -> ServiceResult<Option<Order>> {
        Ok(self.working.orders.get(&id).cloned())
    }

    async fn orders_for_user(&mut self, user_id: UserId) -> ServiceResult<Vec<Order>> {
        Ok(Self::newest_first(
            self.working
                .orders
                .values()
                .filter(|o| o.user_id == user_id)
                .cloned()
                .collect(),
        ))
    }

    async fn all_orders(&mut self) -> ServiceResult<Vec<Order>> {
        Ok(Self::newest_first(
            self.working.orders.values().cloned().collect(),
        ))
    }

    async fn update_order_status(&mut self, order: &Order) -> ServiceResult<()> {
        match self.working.orders.get_mut(&order.id) {
            Some(row) => {
                row.status = order.status;
                row.updated_at = order.updated_at;
                Ok(())
            }
            None => Err(DomainError::not_found("order").into()),
        }
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn commit(self: Box<Self>) -> ServiceResult<()> {
        let InMemoryUnitOfWork { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> ServiceResult<()> {
        Ok(())
    }
}
