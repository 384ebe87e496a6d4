//! Postgres-backed store.
//!
//! ## Isolation
//!
//! Every unit of work is one SQL transaction. [`TxMode::Snapshot`] runs at
//! REPEATABLE READ so a list page and its rating aggregates come from the same
//! snapshot. [`TxMode::Write`] runs at READ COMMITTED; checkout relies on
//! `SELECT ... FOR UPDATE` (taken in ascending id order) plus a guarded
//! decrement, so concurrent checkouts against the same stock serialize on the
//! product rows and stock can never go negative. `get_or_create_cart` locks
//! the cart row, so two checkouts of one cart cannot both see its lines.
//! Admin edits read through `product_for_update` and never write back a stock
//! level that a concurrent checkout has already changed.
//!
//! ## Error Mapping
//!
//! | PostgreSQL Error Code | ServiceError |
//! |-----------------------|--------------|
//! | `23505` unique violation | `Domain(Conflict)` |
//! | `23503` foreign key violation | `Domain(Conflict)` |
//! | `23514` check violation | `Domain(Validation)` |
//! | anything else | `Database` |

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use shopswift_catalog::{
    Category, CategoryView, Product, ProductFilter, ProductQuery, ProductSort, Review, SortField,
};
use shopswift_core::{
    CartId, CartItemId, CategoryId, DomainError, Money, OrderId, OrderItemId, ProductId, ReviewId,
    UserId,
};
use shopswift_orders::{Cart, CartItem, Order, OrderItem, OrderStatus};

use super::{CartRepo, CatalogRepo, OrderRepo, Store, TxMode, UnitOfWork};
use crate::error::{ServiceError, ServiceResult};

const SCHEMA: &str = include_str!("../../migrations/0001_store_schema.sql");

const PRODUCT_COLUMNS: &str = "p.id, p.name, p.description, p.price_cents, p.stock_quantity, \
     p.category_id, p.image, p.is_active, p.is_featured, p.created_at, p.updated_at";

const CATEGORY_COLUMNS: &str = "c.id, c.name, c.description, c.is_active, c.created_at, c.updated_at";

const REVIEW_COLUMNS: &str = "id, user_id, product_id, rating, comment, created_at, updated_at";

const ORDER_COLUMNS: &str = "id, user_id, total_amount_cents, status, shipping_address, \
     payment_reference, created_at, updated_at";

/// Product filter predicates, binds `$1..=$6`.
const PRODUCT_FILTER: &str = r#"
    ($1 OR p.is_active)
    AND ($2::uuid IS NULL OR p.category_id = $2)
    AND ($3::text IS NULL OR p.name ILIKE $3 OR p.description ILIKE $3)
    AND ($4::bigint IS NULL OR p.price_cents >= $4)
    AND ($5::bigint IS NULL OR p.price_cents <= $5)
    AND (NOT $6 OR p.is_featured)
"#;

/// Postgres-backed store. Cheap to clone (the pool is reference counted).
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> ServiceResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema. Idempotent.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> ServiceResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn begin(&self, mode: TxMode) -> ServiceResult<Box<dyn UnitOfWork>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        sqlx::query(&format!("SET TRANSACTION {}", mode.as_sql()))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_transaction", e))?;
        Ok(Box::new(PostgresUnitOfWork { tx }))
    }
}

struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

impl PostgresUnitOfWork {
    async fn fetch_products(&mut self, sql: &str, ids: &[ProductId]) -> ServiceResult<Vec<Product>> {
        let rows = sqlx::query(sql)
            .bind(uuids(ids))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("products", e))?;
        rows.iter().map(product_from_row).collect()
    }

    async fn cart_items(&mut self, cart_id: CartId) -> ServiceResult<Vec<CartItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, cart_id, product_id, quantity, added_at
            FROM cart_items
            WHERE cart_id = $1
            ORDER BY added_at ASC, id ASC
            "#,
        )
        .bind(cart_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("cart_items", e))?;

        rows.iter()
            .map(|row| {
                let row = CartItemRow::from_row(row)
                    .map_err(|e| ServiceError::decode("cart_item", e.to_string()))?;
                CartItem::try_from(row)
            })
            .collect()
    }

    /// Attach items to order headers, preserving header order.
    async fn with_items(&mut self, rows: Vec<PgRow>) -> ServiceResult<Vec<Order>> {
        let headers = rows
            .iter()
            .map(|row| OrderRow::from_row(row).map_err(|e| ServiceError::decode("order", e.to_string())))
            .collect::<ServiceResult<Vec<_>>>()?;
        if headers.is_empty() {
            return Ok(Vec::new());
        }

        let order_ids: Vec<Uuid> = headers.iter().map(|h| h.id).collect();
        let item_rows = sqlx::query(
            r#"
            SELECT id, order_id, product_id, quantity, price_cents
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY id ASC
            "#,
        )
        .bind(order_ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("order_items", e))?;

        let mut items: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in &item_rows {
            let row = OrderItemRow::from_row(row)
                .map_err(|e| ServiceError::decode("order_item", e.to_string()))?;
            items.entry(row.order_id).or_default().push(OrderItem::try_from(row)?);
        }

        headers
            .into_iter()
            .map(|h| {
                let lines = items.remove(&h.id).unwrap_or_default();
                h.into_order(lines)
            })
            .collect()
    }
}

#[async_trait]
impl CatalogRepo for PostgresUnitOfWork {
    async fn product(&mut self, id: ProductId) -> ServiceResult<Option<Product>> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("product", e))?;
        row.as_ref().map(product_from_row).transpose()
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn product_for_update(&mut self, id: ProductId) -> ServiceResult<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("product_for_update", e))?;
        row.as_ref().map(product_from_row).transpose()
    }

    async fn products(&mut self, ids: &[ProductId]) -> ServiceResult<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.id = ANY($1)");
        self.fetch_products(&sql, ids).await
    }

    #[instrument(skip(self, ids), fields(product_count = ids.len()), err)]
    async fn products_for_update(&mut self, ids: &[ProductId]) -> ServiceResult<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.id = ANY($1) ORDER BY p.id ASC FOR UPDATE"
        );
        self.fetch_products(&sql, ids).await
    }

    async fn insert_product(&mut self, product: &Product) -> ServiceResult<()> {
        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, description, price_cents, stock_quantity, category_id,
                image, is_active, is_featured, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.description)
        .bind(cents(product.price)?)
        .bind(i64::from(product.stock_quantity))
        .bind(product.category_id.map(Uuid::from))
        .bind(&product.image)
        .bind(product.is_active)
        .bind(product.is_featured)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;
        Ok(())
    }

    async fn update_product(&mut self, product: &Product) -> ServiceResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET name = $2, description = $3, price_cents = $4, stock_quantity = $5,
                category_id = $6, image = $7, is_active = $8, is_featured = $9, updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.description)
        .bind(cents(product.price)?)
        .bind(i64::from(product.stock_quantity))
        .bind(product.category_id.map(Uuid::from))
        .bind(&product.image)
        .bind(product.is_active)
        .bind(product.is_featured)
        .bind(product.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_product", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("product").into());
        }
        Ok(())
    }

    async fn delete_product(&mut self, id: ProductId) -> ServiceResult<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_product", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn decrement_stock(&mut self, id: ProductId, quantity: u32) -> ServiceResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET stock_quantity = stock_quantity - $2
            WHERE id = $1 AND stock_quantity >= $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(i64::from(quantity))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("decrement_stock", e))?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(
        skip(self, query),
        fields(
            sort = ?query.sort,
            page_skip = query.page.skip(),
            page_limit = query.page.limit(),
            total = tracing::field::Empty
        ),
        err
    )]
    async fn query_products(&mut self, query: &ProductQuery) -> ServiceResult<(Vec<Product>, u64)> {
        let binds = FilterBinds::from_filter(&query.filter)?;

        let count_sql = format!("SELECT COUNT(*) AS total FROM products p WHERE {PRODUCT_FILTER}");
        let total: i64 = binds
            .bind(sqlx::query(&count_sql))
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("count_products", e))?
            .try_get("total")
            .map_err(|e| map_sqlx_error("count_products", e))?;

        let page_sql = format!(
            r#"
            SELECT {PRODUCT_COLUMNS}
            FROM products p
            LEFT JOIN (
                SELECT product_id, AVG(rating)::float8 AS avg_rating
                FROM reviews
                GROUP BY product_id
            ) r ON r.product_id = p.id
            WHERE {PRODUCT_FILTER}
            ORDER BY {order}
            LIMIT $7 OFFSET $8
            "#,
            order = order_by(query.sort),
        );
        let rows = binds
            .bind(sqlx::query(&page_sql))
            .bind(i64::from(query.page.limit()))
            .bind(i64::try_from(query.page.skip()).unwrap_or(i64::MAX))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("query_products", e))?;

        let products = rows.iter().map(product_from_row).collect::<ServiceResult<Vec<_>>>()?;
        let total = u64::try_from(total).unwrap_or_default();
        Span::current().record("total", total);
        Ok((products, total))
    }

    async fn count_products_in_category(
        &mut self,
        id: CategoryId,
        active_only: bool,
    ) -> ServiceResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM products WHERE category_id = $1 AND (NOT $2 OR is_active)",
        )
        .bind(id.as_uuid())
        .bind(active_only)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("count_products_in_category", e))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn category(&mut self, id: CategoryId) -> ServiceResult<Option<Category>> {
        let row = sqlx::query(&format!("SELECT {CATEGORY_COLUMNS} FROM categories c WHERE c.id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("category", e))?;
        row.as_ref().map(category_from_row).transpose()
    }

    async fn categories(&mut self, ids: &[CategoryId]) -> ServiceResult<Vec<Category>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories c WHERE c.id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("categories", e))?;
        rows.iter().map(category_from_row).collect()
    }

    async fn category_by_name(&mut self, name: &str) -> ServiceResult<Option<Category>> {
        let row = sqlx::query(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories c WHERE lower(c.name) = lower($1)"
        ))
        .bind(name.trim())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("category_by_name", e))?;
        row.as_ref().map(category_from_row).transpose()
    }

    async fn list_categories(&mut self, active_only: bool) -> ServiceResult<Vec<CategoryView>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {CATEGORY_COLUMNS},
                   (SELECT COUNT(*) FROM products p WHERE p.category_id = c.id AND p.is_active) AS product_count
            FROM categories c
            WHERE (NOT $1 OR c.is_active)
            ORDER BY c.name COLLATE "C" ASC, c.id ASC
            "#
        ))
        .bind(active_only)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("list_categories", e))?;

        rows.iter()
            .map(|row| {
                let count: i64 = row
                    .try_get("product_count")
                    .map_err(|e| ServiceError::decode("category", e.to_string()))?;
                Ok(CategoryView {
                    category: category_from_row(row)?,
                    product_count: u64::try_from(count).unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn insert_category(&mut self, category: &Category) -> ServiceResult<()> {
        sqlx::query(
            r#"
            INSERT INTO categories (id, name, description, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(category.id.as_uuid())
        .bind(&category.name)
        .bind(&category.description)
        .bind(category.is_active)
        .bind(category.created_at)
        .bind(category.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_category", e))?;
        Ok(())
    }

    async fn update_category(&mut self, category: &Category) -> ServiceResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE categories
            SET name = $2, description = $3, is_active = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(category.id.as_uuid())
        .bind(&category.name)
        .bind(&category.description)
        .bind(category.is_active)
        .bind(category.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_category", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("category").into());
        }
        Ok(())
    }

    async fn delete_category(&mut self, id: CategoryId) -> ServiceResult<bool> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_category", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn review(&mut self, id: ReviewId) -> ServiceResult<Option<Review>> {
        let row = sqlx::query(&format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("review", e))?;
        row.as_ref().map(review_from_row).transpose()
    }

    async fn review_by_author(
        &mut self,
        user_id: UserId,
        product_id: ProductId,
    ) -> ServiceResult<Option<Review>> {
        let row = sqlx::query(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE user_id = $1 AND product_id = $2"
        ))
        .bind(user_id.as_uuid())
        .bind(product_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("review_by_author", e))?;
        row.as_ref().map(review_from_row).transpose()
    }

    async fn insert_review(&mut self, review: &Review) -> ServiceResult<()> {
        sqlx::query(
            r#"
            INSERT INTO reviews (id, user_id, product_id, rating, comment, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(review.id.as_uuid())
        .bind(review.user_id.as_uuid())
        .bind(review.product_id.as_uuid())
        .bind(i16::from(review.rating))
        .bind(&review.comment)
        .bind(review.created_at)
        .bind(review.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_review", e))?;
        Ok(())
    }

    async fn update_review(&mut self, review: &Review) -> ServiceResult<()> {
        let result = sqlx::query(
            "UPDATE reviews SET rating = $2, comment = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(review.id.as_uuid())
        .bind(i16::from(review.rating))
        .bind(&review.comment)
        .bind(review.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_review", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("review").into());
        }
        Ok(())
    }

    async fn delete_review(&mut self, id: ReviewId) -> ServiceResult<bool> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_review", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn reviews_for_product(
        &mut self,
        product_id: ProductId,
        skip: u64,
        limit: u32,
    ) -> ServiceResult<Vec<Review>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {REVIEW_COLUMNS}
            FROM reviews
            WHERE product_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(product_id.as_uuid())
        .bind(i64::from(limit))
        .bind(i64::try_from(skip).unwrap_or(i64::MAX))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("reviews_for_product", e))?;
        rows.iter().map(review_from_row).collect()
    }

    async fn ratings(&mut self, product_ids: &[ProductId]) -> ServiceResult<Vec<(ProductId, u8)>> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query("SELECT product_id, rating FROM reviews WHERE product_id = ANY($1)")
            .bind(uuids(product_ids))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("ratings", e))?;

        rows.iter()
            .map(|row| {
                let product_id: Uuid = row
                    .try_get("product_id")
                    .map_err(|e| ServiceError::decode("review", e.to_string()))?;
                let rating: i16 = row
                    .try_get("rating")
                    .map_err(|e| ServiceError::decode("review", e.to_string()))?;
                Ok((ProductId::from_uuid(product_id), to_u8("review", rating)?))
            })
            .collect()
    }
}

#[async_trait]
impl CartRepo for PostgresUnitOfWork {
    async fn get_or_create_cart(&mut self, user_id: UserId, now: DateTime<Utc>) -> ServiceResult<Cart> {
        sqlx::query(
            r#"
            INSERT INTO carts (id, user_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(CartId::new().as_uuid())
        .bind(user_id.as_uuid())
        .bind(now)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("create_cart", e))?;

        // Held until commit: checkouts and edits of one user's cart serialize here,
        // and the lines below are read only after the lock is granted.
        let row = sqlx::query(
            "SELECT id, user_id, created_at, updated_at FROM carts WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("cart", e))?;
        let header = CartRow::from_row(&row).map_err(|e| ServiceError::decode("cart", e.to_string()))?;

        let cart_id = CartId::from_uuid(header.id);
        let items = self.cart_items(cart_id).await?;
        Ok(Cart {
            id: cart_id,
            user_id: UserId::from_uuid(header.user_id),
            items,
            created_at: header.created_at,
            updated_at: header.updated_at,
        })
    }

    async fn save_cart_item(&mut self, item: &CartItem) -> ServiceResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cart_items (id, cart_id, product_id, quantity, added_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET quantity = EXCLUDED.quantity
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(item.cart_id.as_uuid())
        .bind(item.product_id.as_uuid())
        .bind(i64::from(item.quantity))
        .bind(item.added_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("save_cart_item", e))?;
        Ok(())
    }

    async fn delete_cart_item(&mut self, cart_id: CartId, item_id: CartItemId) -> ServiceResult<bool> {
        let result = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND cart_id = $2")
            .bind(item_id.as_uuid())
            .bind(cart_id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_cart_item", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_cart(&mut self, cart_id: CartId) -> ServiceResult<()> {
        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("clear_cart", e))?;
        Ok(())
    }

    async fn touch_cart(&mut self, cart_id: CartId, now: DateTime<Utc>) -> ServiceResult<()> {
        sqlx::query("UPDATE carts SET updated_at = $2 WHERE id = $1")
            .bind(cart_id.as_uuid())
            .bind(now)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("touch_cart", e))?;
        Ok(())
    }
}

#[async_trait]
impl OrderRepo for PostgresUnitOfWork {
    #[instrument(skip(self, order), fields(order_id = %order.id, item_count = order.items.len()), err)]
    async fn insert_order(&mut self, order: &Order) -> ServiceResult<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, user_id, total_amount_cents, status, shipping_address,
                payment_reference, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(cents(order.total_amount)?)
        .bind(order.status.as_str())
        .bind(&order.shipping_address)
        .bind(&order.payment_reference)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;

        for item in &order.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, product_id, quantity, price_cents)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(item.order_id.as_uuid())
            .bind(item.product_id.map(Uuid::from))
            .bind(i64::from(item.quantity))
            .bind(cents(item.price)?)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_order_item", e))?;
        }
        Ok(())
    }

    async fn order(&mut self, id: OrderId) -> ServiceResult<Option<Order>> {
        let rows = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("order", e))?;
        Ok(self.with_items(rows).await?.into_iter().next())
    }

    async fn orders_for_user(&mut self, user_id: UserId) -> ServiceResult<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("orders_for_user", e))?;
        self.with_items(rows).await
    }

    async fn all_orders(&mut self) -> ServiceResult<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("all_orders", e))?;
        self.with_items(rows).await
    }

    async fn update_order_status(&mut self, order: &Order) -> ServiceResult<()> {
        let result = sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(order.id.as_uuid())
            .bind(order.status.as_str())
            .bind(order.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("update_order_status", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("order").into());
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn commit(self: Box<Self>) -> ServiceResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(self: Box<Self>) -> ServiceResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

// Query building

/// Owned bind values for [`PRODUCT_FILTER`].
struct FilterBinds {
    include_inactive: bool,
    category_id: Option<Uuid>,
    pattern: Option<String>,
    min_price: Option<i64>,
    max_price: Option<i64>,
    featured_only: bool,
}

impl FilterBinds {
    fn from_filter(filter: &ProductFilter) -> ServiceResult<Self> {
        Ok(Self {
            include_inactive: filter.include_inactive,
            category_id: filter.category_id.map(Uuid::from),
            pattern: filter.search_term().map(|t| format!("%{}%", escape_like(&t))),
            min_price: filter.min_price.map(cents).transpose()?,
            max_price: filter.max_price.map(cents).transpose()?,
            featured_only: filter.featured_only,
        })
    }

    fn bind<'q>(&self, query: Query<'q, Postgres, PgArguments>) -> Query<'q, Postgres, PgArguments> {
        query
            .bind(self.include_inactive)
            .bind(self.category_id)
            .bind(self.pattern.clone())
            .bind(self.min_price)
            .bind(self.max_price)
            .bind(self.featured_only)
    }
}

/// ORDER BY clause. Column names come from a fixed whitelist, never from input.
fn order_by(sort: ProductSort) -> String {
    let key = match sort.field {
        SortField::Price => "p.price_cents",
        SortField::Name => r#"p.name COLLATE "C""#,
        SortField::CreatedAt => "p.created_at",
        SortField::Rating => "COALESCE(r.avg_rating, 0)",
    };
    format!("{key} {}, p.id ASC", sort.direction.as_sql())
}

/// Escape LIKE metacharacters so the search term matches literally.
fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn uuids(ids: &[ProductId]) -> Vec<Uuid> {
    ids.iter().map(|id| *id.as_uuid()).collect()
}

fn cents(amount: Money) -> ServiceResult<i64> {
    i64::try_from(amount.cents())
        .map_err(|_| DomainError::validation("amount exceeds storable range").into())
}

fn money(entity: &'static str, cents: i64) -> ServiceResult<Money> {
    u64::try_from(cents)
        .map(Money::from_cents)
        .map_err(|_| ServiceError::decode(entity, format!("negative amount {cents}")))
}

fn to_u32(entity: &'static str, value: i64) -> ServiceResult<u32> {
    u32::try_from(value).map_err(|_| ServiceError::decode(entity, format!("quantity {value} out of range")))
}

fn to_u8(entity: &'static str, value: i16) -> ServiceResult<u8> {
    u8::try_from(value).map_err(|_| ServiceError::decode(entity, format!("rating {value} out of range")))
}

fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> ServiceError {
    match err {
        sqlx::Error::Database(db_err) => {
            let constraint = db_err.constraint().map(str::to_string);
            match db_err.code().as_deref() {
                Some("23505") => DomainError::conflict(match constraint.as_deref() {
                    Some("reviews_user_product_key") => "product already reviewed by this user",
                    Some("categories_name_lower_key") => "category name already exists",
                    Some("carts_user_id_key") => "cart already exists",
                    _ => "duplicate record",
                })
                .into(),
                Some("23503") => DomainError::conflict(match constraint.as_deref() {
                    Some("products_category_id_fkey") => "category is still referenced by products",
                    _ => "referenced record is missing or still in use",
                })
                .into(),
                Some("23514") => DomainError::validation(format!(
                    "value rejected by {}",
                    constraint.as_deref().unwrap_or("check constraint")
                ))
                .into(),
                _ => ServiceError::database(operation, db_err.message().to_string()),
            }
        }
        sqlx::Error::PoolClosed => ServiceError::database(operation, "connection pool closed"),
        other => ServiceError::database(operation, other.to_string()),
    }
}

// SQLx row types

#[derive(Debug)]
struct ProductRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    price_cents: i64,
    stock_quantity: i64,
    category_id: Option<Uuid>,
    image: Option<String>,
    is_active: bool,
    is_featured: bool,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for ProductRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProductRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            price_cents: row.try_get("price_cents")?,
            stock_quantity: row.try_get("stock_quantity")?,
            category_id: row.try_get("category_id")?,
            image: row.try_get("image")?,
            is_active: row.try_get("is_active")?,
            is_featured: row.try_get("is_featured")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn product_from_row(row: &PgRow) -> ServiceResult<Product> {
    let row = ProductRow::from_row(row).map_err(|e| ServiceError::decode("product", e.to_string()))?;
    Ok(Product {
        id: ProductId::from_uuid(row.id),
        name: row.name,
        description: row.description,
        price: money("product", row.price_cents)?,
        stock_quantity: to_u32("product", row.stock_quantity)?,
        category_id: row.category_id.map(CategoryId::from_uuid),
        image: row.image,
        is_active: row.is_active,
        is_featured: row.is_featured,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn category_from_row(row: &PgRow) -> ServiceResult<Category> {
    let decode = |e: sqlx::Error| ServiceError::decode("category", e.to_string());
    Ok(Category {
        id: CategoryId::from_uuid(row.try_get("id").map_err(decode)?),
        name: row.try_get("name").map_err(decode)?,
        description: row.try_get("description").map_err(decode)?,
        is_active: row.try_get("is_active").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    })
}

fn review_from_row(row: &PgRow) -> ServiceResult<Review> {
    let decode = |e: sqlx::Error| ServiceError::decode("review", e.to_string());
    let rating: i16 = row.try_get("rating").map_err(decode)?;
    Ok(Review {
        id: ReviewId::from_uuid(row.try_get("id").map_err(decode)?),
        user_id: UserId::from_uuid(row.try_get("user_id").map_err(decode)?),
        product_id: ProductId::from_uuid(row.try_get("product_id").map_err(decode)?),
        rating: to_u8("review", rating)?,
        comment: row.try_get("comment").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    })
}

#[derive(Debug)]
struct CartRow {
    id: Uuid,
    user_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for CartRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(CartRow {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug)]
struct CartItemRow {
    id: Uuid,
    cart_id: Uuid,
    product_id: Uuid,
    quantity: i64,
    added_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for CartItemRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(CartItemRow {
            id: row.try_get("id")?,
            cart_id: row.try_get("cart_id")?,
            product_id: row.try_get("product_id")?,
            quantity: row.try_get("quantity")?,
            added_at: row.try_get("added_at")?,
        })
    }
}

impl TryFrom<CartItemRow> for CartItem {
    type Error = ServiceError;

    fn try_from(row: CartItemRow) -> Result<Self, Self::Error> {
        Ok(CartItem {
            id: CartItemId::from_uuid(row.id),
            cart_id: CartId::from_uuid(row.cart_id),
            product_id: ProductId::from_uuid(row.product_id),
            quantity: to_u32("cart_item", row.quantity)?,
            added_at: row.added_at,
        })
    }
}

#[derive(Debug)]
struct OrderRow {
    id: Uuid,
    user_id: Uuid,
    total_amount_cents: i64,
    status: String,
    shipping_address: String,
    payment_reference: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for OrderRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderRow {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            total_amount_cents: row.try_get("total_amount_cents")?,
            status: row.try_get("status")?,
            shipping_address: row.try_get("shipping_address")?,
            payment_reference: row.try_get("payment_reference")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> ServiceResult<Order> {
        Ok(Order {
            id: OrderId::from_uuid(self.id),
            user_id: UserId::from_uuid(self.user_id),
            total_amount: money("order", self.total_amount_cents)?,
            status: OrderStatus::from_str(&self.status)
                .map_err(|e| ServiceError::decode("order", e.to_string()))?,
            shipping_address: self.shipping_address,
            payment_reference: self.payment_reference,
            items,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Option<Uuid>,
    quantity: i64,
    price_cents: i64,
}

impl<'r> FromRow<'r, PgRow> for OrderItemRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderItemRow {
            id: row.try_get("id")?,
            order_id: row.try_get("order_id")?,
            product_id: row.try_get("product_id")?,
            quantity: row.try_get("quantity")?,
            price_cents: row.try_get("price_cents")?,
        })
    }
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = ServiceError;

    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        Ok(OrderItem {
            id: OrderItemId::from_uuid(row.id),
            order_id: OrderId::from_uuid(row.order_id),
            product_id: row.product_id.map(ProductId::from_uuid),
            quantity: to_u32("order_item", row.quantity)?,
            price: money("order_item", row.price_cents)?,
        })
    }
}
