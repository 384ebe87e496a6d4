//! Order fulfillment: converting a cart into an order.
//!
//! ## Checkout Flow
//!
//! ```text
//! place_order(user, request)
//!   ↓
//! 1. Open a write unit of work
//!   ↓
//! 2. Load the user's cart (EmptyCart if it has no lines)
//!   ↓
//! 3. Lock every product in the cart, in ascending id order
//!   ↓
//! 4. Plan: snapshot prices, re-check stock for every line, compute the total
//!   ↓
//! 5. Write: insert order + items, decrement stock (guarded), drain the cart
//!   ↓
//! 6. Commit, then notify
//! ```
//!
//! ## Failure Semantics
//!
//! Steps 1–5 happen inside one unit of work. Any failure before the commit
//! drops it, so stock, orders and the cart are left exactly as they were.
//! Planning never writes, which makes step 4 all-or-nothing by construction;
//! the guarded decrement in step 5 is a second line of defence should the row
//! have changed since it was locked.
//!
//! ## Concurrency
//!
//! Two checkouts touching the same product serialize on that product's row
//! lock. Locks are always taken in ascending product id order, so overlapping
//! carts cannot deadlock. The loser re-reads the post-commit stock and fails
//! with `InsufficientStock` if the winner used it up.
//!
//! Notification happens after the commit and is best-effort: a failing
//! notifier is logged and never fails the order.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{Span, info, instrument, warn};

use shopswift_core::{DomainError, OrderId, ProductId, UserId};
use shopswift_orders::{CheckoutRequest, Order, plan_checkout};

use crate::error::ServiceResult;
use crate::external::OrderNotifier;
use crate::store::{Store, TxMode};

#[derive(Clone)]
pub struct CheckoutService {
    store: Arc<dyn Store>,
    notifier: Arc<dyn OrderNotifier>,
}

impl CheckoutService {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn OrderNotifier>) -> Self {
        Self { store, notifier }
    }

    /// Atomically turn the user's cart into a pending order.
    #[instrument(
        skip(self, request),
        fields(user_id = %user_id, order_id = tracing::field::Empty),
        err
    )]
    pub async fn place_order(&self, user_id: UserId, request: CheckoutRequest) -> ServiceResult<Order> {
        let now = Utc::now();
        let mut uow = self.store.begin(TxMode::Write).await?;

        let cart = uow.get_or_create_cart(user_id, now).await?;
        if cart.is_empty() {
            return Err(DomainError::EmptyCart.into());
        }

        let mut product_ids: Vec<ProductId> = cart.items.iter().map(|i| i.product_id).collect();
        product_ids.sort();
        product_ids.dedup();
        let products: HashMap<ProductId, _> = uow
            .products_for_update(&product_ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let plan = match plan_checkout(&cart, &products, request, now) {
            Ok(plan) => plan,
            Err(err) => {
                if let DomainError::InsufficientStock {
                    product_id,
                    requested,
                    available,
                } = &err
                {
                    warn!(%product_id, requested, available, "checkout rejected: insufficient stock");
                }
                uow.rollback().await?;
                return Err(err.into());
            }
        };

        uow.insert_order(&plan.order).await?;
        for decrement in &plan.decrements {
            if !uow.decrement_stock(decrement.product_id, decrement.quantity).await? {
                let available = products
                    .get(&decrement.product_id)
                    .map(|p| p.stock_quantity)
                    .unwrap_or_default();
                warn!(product_id = %decrement.product_id, "checkout rejected: stock changed under lock");
                return Err(DomainError::insufficient_stock(
                    decrement.product_id,
                    decrement.quantity,
                    available,
                )
                .into());
            }
        }
        uow.clear_cart(cart.id).await?;
        uow.touch_cart(cart.id, now).await?;
        uow.commit().await?;

        let order = plan.order;
        Span::current().record("order_id", tracing::field::display(order.id));
        info!(
            order_id = %order.id,
            user_id = %order.user_id,
            lines = order.items.len(),
            total = %order.total_amount,
            "order placed"
        );

        if let Err(err) = self.notifier.order_placed(&order).await {
            warn!(order_id = %order.id, error = %err, "order notification failed");
        }
        Ok(order)
    }

    /// The user's orders, newest first.
    pub async fn orders_for(&self, user_id: UserId) -> ServiceResult<Vec<Order>> {
        let mut uow = self.store.begin(TxMode::Snapshot).await?;
        let orders = uow.orders_for_user(user_id).await?;
        uow.commit().await?;
        Ok(orders)
    }

    /// One of the user's orders. Orders of other users read as missing.
    pub async fn order(&self, user_id: UserId, id: OrderId) -> ServiceResult<Order> {
        let mut uow = self.store.begin(TxMode::Snapshot).await?;
        let order = uow
            .order(id)
            .await?
            .filter(|o| o.is_owned_by(user_id))
            .ok_or(DomainError::NotFound("order"))?;
        uow.commit().await?;
        Ok(order)
    }
}
