//! Integration tests for the service layer over `PostgresStore`.
//!
//! Run only when `DATABASE_URL` points at a Postgres database; otherwise each
//! test returns immediately. Every test works on freshly created rows, so the
//! database can be shared between runs.
//!
//! Verifies:
//! - Concurrent checkouts never oversell, across users and within one cart
//! - Admin edits never write back stock a checkout has already taken
//! - A rejected checkout rolls everything back
//! - Rating-sorted pages tile the result set
//! - Permanent deletes keep order lines with the product reference cleared

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use shopswift_auth::{Principal, Role};
    use shopswift_catalog::{
        NewCategory, NewProduct, NewReview, PageRequest, ProductFilter, ProductQuery, ProductSort,
        ProductUpdate, SortDirection, SortField,
    };
    use shopswift_core::{CategoryId, DomainError, Money, ProductId, UserId};
    use shopswift_orders::CheckoutRequest;
    use tokio::sync::Mutex;

    use crate::error::ServiceError;
    use crate::external::{InMemoryImageStorage, RecordingNotifier};
    use crate::services::Services;
    use crate::store::PostgresStore;

    static MIGRATED: Mutex<bool> = Mutex::const_new(false);

    /// Time given to spawned checkouts to queue up on a held row lock.
    const LOCK_WAIT: Duration = Duration::from_millis(300);

    struct Harness {
        store: PostgresStore,
        services: Services,
        admin: Principal,
    }

    async fn setup() -> Option<Harness> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let store = PostgresStore::connect(&url, 10).await.unwrap();
        {
            let mut migrated = MIGRATED.lock().await;
            if !*migrated {
                store.migrate().await.unwrap();
                *migrated = true;
            }
        }
        let services = Services::new(
            Arc::new(store.clone()),
            Arc::new(InMemoryImageStorage::new()),
            Arc::new(RecordingNotifier::new()),
        );
        Some(Harness {
            store,
            services,
            admin: Principal::new(UserId::new(), vec![Role::admin()]),
        })
    }

    fn shopper() -> Principal {
        Principal::new(UserId::new(), vec![Role::new("customer")])
    }

    fn domain(err: ServiceError) -> DomainError {
        err.as_domain()
            .cloned()
            .unwrap_or_else(|| panic!("expected a domain error, got {err}"))
    }

    fn checkout_request() -> CheckoutRequest {
        CheckoutRequest {
            shipping_address: "1 Market Street, Springfield".to_string(),
            payment_reference: None,
        }
    }

    fn new_product(name: &str, cents: u64, stock: u32, category_id: Option<CategoryId>) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            description: None,
            price: Money::from_cents(cents),
            stock_quantity: stock,
            category_id,
            image: None,
            is_featured: false,
        }
    }

    impl Harness {
        async fn product(&self, name: &str, cents: u64, stock: u32) -> ProductId {
            self.product_in(name, cents, stock, None).await
        }

        async fn product_in(
            &self,
            name: &str,
            cents: u64,
            stock: u32,
            category_id: Option<CategoryId>,
        ) -> ProductId {
            self.services
                .moderation
                .create_product(&self.admin, new_product(name, cents, stock, category_id))
                .await
                .unwrap()
                .product
                .id
        }

        async fn stock_of(&self, id: ProductId) -> u32 {
            let stock: i64 = sqlx::query_scalar("SELECT stock_quantity FROM products WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_one(self.store.pool())
                .await
                .unwrap();
            u32::try_from(stock).unwrap()
        }

        /// Open a raw transaction holding the product row lock until committed.
        async fn lock_product(
            &self,
            id: ProductId,
            statement: &str,
        ) -> sqlx::Transaction<'static, sqlx::Postgres> {
            let mut tx = self.store.pool().begin().await.unwrap();
            sqlx::query(statement)
                .bind(id.as_uuid())
                .execute(&mut *tx)
                .await
                .unwrap();
            tx
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_checkouts_sell_the_last_unit_once() {
        let Some(h) = setup().await else { return };
        let last_unit = h.product("Last unit", 500, 1).await;
        let alice = shopper().user_id();
        let bob = shopper().user_id();
        h.services.cart.add_item(alice, last_unit, 1).await.unwrap();
        h.services.cart.add_item(bob, last_unit, 1).await.unwrap();

        let checkout_a = h.services.checkout.clone();
        let checkout_b = h.services.checkout.clone();
        let (a, b) = tokio::join!(
            tokio::spawn(async move { checkout_a.place_order(alice, checkout_request()).await }),
            tokio::spawn(async move { checkout_b.place_order(bob, checkout_request()).await }),
        );
        let results = [a.unwrap(), b.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let failure = results.into_iter().find_map(Result::err).unwrap();
        assert!(matches!(
            domain(failure),
            DomainError::InsufficientStock { available: 0, .. }
        ));
        assert_eq!(h.stock_of(last_unit).await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn one_cart_checked_out_twice_yields_one_order() {
        let Some(h) = setup().await else { return };
        let mug = h.product("Mug", 800, 10).await;
        let user = shopper().user_id();
        h.services.cart.add_item(user, mug, 2).await.unwrap();

        // Both checkouts start while the product is locked elsewhere, so the
        // first one has read the cart before the second one tries to.
        let blocker = h
            .lock_product(mug, "SELECT id FROM products WHERE id = $1 FOR UPDATE")
            .await;
        let first = h.services.checkout.clone();
        let second = h.services.checkout.clone();
        let a = tokio::spawn(async move { first.place_order(user, checkout_request()).await });
        let b = tokio::spawn(async move { second.place_order(user, checkout_request()).await });
        tokio::time::sleep(LOCK_WAIT).await;
        blocker.commit().await.unwrap();

        let results = [a.await.unwrap(), b.await.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let failure = results.into_iter().find_map(Result::err).unwrap();
        assert_eq!(domain(failure), DomainError::EmptyCart);

        assert_eq!(h.services.checkout.orders_for(user).await.unwrap().len(), 1);
        assert_eq!(h.stock_of(mug).await, 8);
        assert!(h.services.cart.cart(user).await.unwrap().items.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn admin_edit_waits_for_a_concurrent_sale() {
        let Some(h) = setup().await else { return };
        let lamp = h.product("Lamp", 1500, 1).await;

        // A sale in flight holds the row with the stock already taken.
        let sale = h
            .lock_product(
                lamp,
                "UPDATE products SET stock_quantity = stock_quantity - 1 WHERE id = $1",
            )
            .await;
        let moderation = h.services.moderation.clone();
        let admin = h.admin.clone();
        let toggle = tokio::spawn(async move { moderation.toggle_featured(&admin, lamp).await });
        tokio::time::sleep(LOCK_WAIT).await;
        sale.commit().await.unwrap();

        let toggled = toggle.await.unwrap().unwrap();
        assert!(toggled.is_featured);
        assert_eq!(toggled.stock_quantity, 0);
        assert_eq!(h.stock_of(lamp).await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn price_edit_waits_for_a_concurrent_sale() {
        let Some(h) = setup().await else { return };
        let lamp = h.product("Desk lamp", 1500, 3).await;

        let sale = h
            .lock_product(
                lamp,
                "UPDATE products SET stock_quantity = stock_quantity - 2 WHERE id = $1",
            )
            .await;
        let moderation = h.services.moderation.clone();
        let admin = h.admin.clone();
        let update = ProductUpdate {
            price: Some(Money::from_cents(1200)),
            ..ProductUpdate::default()
        };
        let edit =
            tokio::spawn(async move { moderation.update_product(&admin, lamp, update).await });
        tokio::time::sleep(LOCK_WAIT).await;
        sale.commit().await.unwrap();

        let view = edit.await.unwrap().unwrap();
        assert_eq!(view.product.price, Money::from_cents(1200));
        assert_eq!(h.stock_of(lamp).await, 1);
    }

    #[tokio::test]
    async fn rejected_checkout_rolls_back_every_line() {
        let Some(h) = setup().await else { return };
        let user = shopper().user_id();
        let a = h.product("Product A", 1000, 5).await;
        let b = h.product("Product B", 750, 5).await;
        h.services.cart.add_item(user, a, 2).await.unwrap();
        h.services.cart.add_item(user, b, 2).await.unwrap();
        let update = ProductUpdate {
            stock_quantity: Some(1),
            ..ProductUpdate::default()
        };
        h.services.moderation.update_product(&h.admin, b, update).await.unwrap();

        let err = h.services.checkout.place_order(user, checkout_request()).await.unwrap_err();
        assert_eq!(
            domain(err),
            DomainError::InsufficientStock {
                product_id: b,
                requested: 2,
                available: 1
            }
        );
        assert_eq!(h.stock_of(a).await, 5);
        assert_eq!(h.stock_of(b).await, 1);
        assert_eq!(h.services.cart.cart(user).await.unwrap().items.len(), 2);
        assert!(h.services.checkout.orders_for(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rating_sorted_pages_tile_the_category() {
        let Some(h) = setup().await else { return };
        let category = h
            .services
            .moderation
            .create_category(
                &h.admin,
                NewCategory {
                    name: format!("Rated {}", UserId::new()),
                    description: None,
                    is_active: true,
                },
            )
            .await
            .unwrap();

        // Several ties, including the unrated ones that sort as zero.
        let ratings: [&[u8]; 7] = [&[5], &[4, 2], &[3], &[], &[5, 1], &[], &[3]];
        for (i, stars) in ratings.iter().enumerate() {
            let id = h
                .product_in(&format!("Rated item {i}"), 100, 1, Some(category.id))
                .await;
            for &rating in *stars {
                h.services
                    .catalog
                    .create_review(&shopper(), id, NewReview { rating, comment: None })
                    .await
                    .unwrap();
            }
        }

        let mut seen = Vec::new();
        let mut averages = Vec::new();
        for skip in (0..7).step_by(3) {
            let page = h
                .services
                .catalog
                .query_products(ProductQuery {
                    filter: ProductFilter {
                        category_id: Some(category.id),
                        ..ProductFilter::default()
                    },
                    sort: ProductSort::new(SortField::Rating, SortDirection::Desc),
                    page: PageRequest::new(skip, 3).unwrap(),
                })
                .await
                .unwrap();
            assert_eq!(page.total, 7);
            for view in page.items {
                seen.push(view.product.id);
                averages.push(view.average_rating);
            }
        }

        assert_eq!(seen.len(), 7);
        let mut unique = seen.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 7);
        assert!(averages.windows(2).all(|w| w[0] >= w[1]), "{averages:?}");
    }

    #[tokio::test]
    async fn permanent_delete_keeps_order_lines() {
        let Some(h) = setup().await else { return };
        let user = shopper().user_id();
        let vase = h.product("Vase", 2500, 4).await;
        h.services.cart.add_item(user, vase, 1).await.unwrap();
        let order = h.services.checkout.place_order(user, checkout_request()).await.unwrap();

        h.services
            .moderation
            .delete_product_permanently(&h.admin, vase)
            .await
            .unwrap();

        let stored = h.services.checkout.order(user, order.id).await.unwrap();
        assert_eq!(stored.items.len(), 1);
        assert_eq!(stored.items[0].product_id, None);
        assert_eq!(stored.items[0].price, Money::from_cents(2500));
        assert_eq!(stored.total_amount, Money::from_cents(2500));
    }
}
