//! Shopping cart operations, keyed by the authenticated user.
//!
//! Stock checks here are advisory: they compare against the product's stock at
//! the time of the call and reserve nothing. Checkout re-validates under lock.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument};

use shopswift_core::{CartItemId, DomainError, ProductId, UserId};
use shopswift_orders::{Cart, CartView};

use super::product_views;
use crate::error::ServiceResult;
use crate::store::{Store, TxMode, UnitOfWork};

#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn Store>,
}

impl CartService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// The user's cart, created empty on first access.
    pub async fn cart(&self, user_id: UserId) -> ServiceResult<CartView> {
        let mut uow = self.store.begin(TxMode::Write).await?;
        let cart = uow.get_or_create_cart(user_id, Utc::now()).await?;
        let view = cart_view(&mut *uow, cart).await?;
        uow.commit().await?;
        Ok(view)
    }

    /// Add `quantity` of a product; repeated adds sum into one line.
    #[instrument(skip(self), fields(user_id = %user_id, product_id = %product_id), err)]
    pub async fn add_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> ServiceResult<CartView> {
        let now = Utc::now();
        let mut uow = self.store.begin(TxMode::Write).await?;
        let mut cart = uow.get_or_create_cart(user_id, now).await?;
        let product = uow
            .product(product_id)
            .await?
            .ok_or(DomainError::NotFound("product"))?;

        let item = cart.add_item(&product, quantity, now)?.clone();
        uow.save_cart_item(&item).await?;
        uow.touch_cart(cart.id, now).await?;
        debug!(item_id = %item.id, quantity = item.quantity, "cart line saved");

        let view = cart_view(&mut *uow, cart).await?;
        uow.commit().await?;
        Ok(view)
    }

    /// Overwrite a line's quantity. The line must be in the caller's cart.
    #[instrument(skip(self), fields(user_id = %user_id, item_id = %item_id), err)]
    pub async fn update_item(
        &self,
        user_id: UserId,
        item_id: CartItemId,
        quantity: u32,
    ) -> ServiceResult<CartView> {
        let now = Utc::now();
        let mut uow = self.store.begin(TxMode::Write).await?;
        let mut cart = uow.get_or_create_cart(user_id, now).await?;
        let product_id = cart.item(item_id)?.product_id;
        let product = uow
            .product(product_id)
            .await?
            .ok_or(DomainError::NotFound("product"))?;

        let item = cart.set_quantity(item_id, quantity, &product, now)?.clone();
        uow.save_cart_item(&item).await?;
        uow.touch_cart(cart.id, now).await?;

        let view = cart_view(&mut *uow, cart).await?;
        uow.commit().await?;
        Ok(view)
    }

    pub async fn remove_item(&self, user_id: UserId, item_id: CartItemId) -> ServiceResult<CartView> {
        let now = Utc::now();
        let mut uow = self.store.begin(TxMode::Write).await?;
        let mut cart = uow.get_or_create_cart(user_id, now).await?;
        let removed = cart.remove_item(item_id, now)?;
        if !uow.delete_cart_item(cart.id, removed.id).await? {
            return Err(DomainError::NotFound("cart item").into());
        }
        uow.touch_cart(cart.id, now).await?;

        let view = cart_view(&mut *uow, cart).await?;
        uow.commit().await?;
        Ok(view)
    }

    /// Drain every line. The cart itself stays.
    pub async fn clear(&self, user_id: UserId) -> ServiceResult<CartView> {
        let now = Utc::now();
        let mut uow = self.store.begin(TxMode::Write).await?;
        let mut cart = uow.get_or_create_cart(user_id, now).await?;
        uow.clear_cart(cart.id).await?;
        uow.touch_cart(cart.id, now).await?;
        cart.clear(now);

        let view = cart_view(&mut *uow, cart).await?;
        uow.commit().await?;
        Ok(view)
    }
}

/// Join every line with its live product and price the cart.
async fn cart_view(uow: &mut dyn UnitOfWork, cart: Cart) -> ServiceResult<CartView> {
    let ids: Vec<ProductId> = cart.items.iter().map(|i| i.product_id).collect();
    let products = uow.products(&ids).await?;
    let mut views: HashMap<ProductId, _> = product_views(uow, products)
        .await?
        .into_iter()
        .map(|v| (v.product.id, v))
        .collect();
    Ok(CartView::assemble(cart, |id| views.remove(&id))?)
}
