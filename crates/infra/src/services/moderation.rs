//! Administrative catalog and order management.
//!
//! Every operation first checks `require_admin(principal)`; non-admins get
//! `Forbidden` before anything is read.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use shopswift_auth::{Principal, require_admin};
use shopswift_catalog::{
    Category, CategoryUpdate, CategoryView, NewCategory, NewProduct, Page, Product, ProductQuery,
    ProductUpdate, ProductView,
};
use shopswift_core::{CategoryId, DomainError, OrderId, ProductId};
use shopswift_orders::{Order, OrderStatus};

use super::{CatalogService, product_views};
use crate::error::ServiceResult;
use crate::external::{ImageStorage, ImageType, validate_image};
use crate::store::{Store, TxMode, UnitOfWork};

#[derive(Clone)]
pub struct ModerationService {
    store: Arc<dyn Store>,
    images: Arc<dyn ImageStorage>,
}

impl ModerationService {
    pub fn new(store: Arc<dyn Store>, images: Arc<dyn ImageStorage>) -> Self {
        Self { store, images }
    }

    // Products

    #[instrument(skip(self, principal, request), fields(admin_id = %principal.user_id()), err)]
    pub async fn create_product(
        &self,
        principal: &Principal,
        request: NewProduct,
    ) -> ServiceResult<ProductView> {
        require_admin(principal)?;
        let mut uow = self.store.begin(TxMode::Write).await?;
        if let Some(category_id) = request.category_id {
            ensure_category(&mut *uow, category_id).await?;
        }

        let product = Product::create(request, Utc::now())?;
        uow.insert_product(&product).await?;
        let view = single_view(&mut *uow, product).await?;
        uow.commit().await?;

        info!(product_id = %view.product.id, "product created");
        Ok(view)
    }

    /// Partial update; a newly referenced category must exist.
    #[instrument(skip(self, principal, update), fields(product_id = %id), err)]
    pub async fn update_product(
        &self,
        principal: &Principal,
        id: ProductId,
        update: ProductUpdate,
    ) -> ServiceResult<ProductView> {
        require_admin(principal)?;
        let mut uow = self.store.begin(TxMode::Write).await?;
        let mut product = load_product(&mut *uow, id).await?;
        if let Some(category_id) = update.new_category() {
            ensure_category(&mut *uow, category_id).await?;
        }

        product.apply_update(update, Utc::now())?;
        uow.update_product(&product).await?;
        let view = single_view(&mut *uow, product).await?;
        uow.commit().await?;
        Ok(view)
    }

    /// Hide a product from shoppers without removing it.
    #[instrument(skip(self, principal), fields(product_id = %id), err)]
    pub async fn soft_delete_product(&self, principal: &Principal, id: ProductId) -> ServiceResult<Product> {
        require_admin(principal)?;
        self.modify_product(id, |p, now| p.deactivate(now)).await
    }

    #[instrument(skip(self, principal), fields(product_id = %id), err)]
    pub async fn restore_product(&self, principal: &Principal, id: ProductId) -> ServiceResult<Product> {
        require_admin(principal)?;
        self.modify_product(id, |p, now| p.restore(now)).await
    }

    pub async fn toggle_featured(&self, principal: &Principal, id: ProductId) -> ServiceResult<Product> {
        require_admin(principal)?;
        self.modify_product(id, |p, now| {
            p.toggle_featured(now);
            Ok(())
        })
        .await
    }

    /// Remove the row. Reviews and cart lines go with it; order lines keep
    /// their snapshot with the product reference cleared.
    #[instrument(skip(self, principal), fields(product_id = %id), err)]
    pub async fn delete_product_permanently(
        &self,
        principal: &Principal,
        id: ProductId,
    ) -> ServiceResult<()> {
        require_admin(principal)?;
        let mut uow = self.store.begin(TxMode::Write).await?;
        let product = load_product(&mut *uow, id).await?;
        if !uow.delete_product(id).await? {
            return Err(DomainError::NotFound("product").into());
        }
        uow.commit().await?;

        info!(product_id = %id, "product deleted permanently");
        if let Some(image) = product.image {
            self.discard_image(&image).await;
        }
        Ok(())
    }

    /// Catalog listing for moderators; honours `include_inactive`.
    pub async fn list_products(
        &self,
        principal: &Principal,
        query: ProductQuery,
    ) -> ServiceResult<Page<ProductView>> {
        require_admin(principal)?;
        CatalogService::new(self.store.clone()).run_query(&query).await
    }

    /// Store a new product image and point the product at it. The previous
    /// image is removed once the new reference is committed.
    #[instrument(skip(self, principal, bytes), fields(product_id = %id, size = bytes.len()), err)]
    pub async fn set_product_image(
        &self,
        principal: &Principal,
        id: ProductId,
        content_type: &str,
        bytes: &[u8],
    ) -> ServiceResult<Product> {
        require_admin(principal)?;
        let image_type = ImageType::from_content_type(content_type)?;
        validate_image(bytes)?;

        {
            let mut uow = self.store.begin(TxMode::Snapshot).await?;
            uow.product(id).await?.ok_or(DomainError::NotFound("product"))?;
            uow.commit().await?;
        }

        let uri = self.images.store(id, image_type, bytes).await?;
        let result = self
            .modify_product_with(id, |p, now| Ok(p.replace_image(uri.clone(), now)))
            .await;

        match result {
            Ok((product, previous)) => {
                if let Some(previous) = previous.filter(|old| *old != uri) {
                    self.discard_image(&previous).await;
                }
                info!(image = %uri, "product image replaced");
                Ok(product)
            }
            Err(err) => {
                self.discard_image(&uri).await;
                Err(err)
            }
        }
    }

    // Categories

    /// All categories, inactive included, with active product counts.
    pub async fn list_categories(&self, principal: &Principal) -> ServiceResult<Vec<CategoryView>> {
        require_admin(principal)?;
        let mut uow = self.store.begin(TxMode::Snapshot).await?;
        let categories = uow.list_categories(false).await?;
        uow.commit().await?;
        Ok(categories)
    }

    #[instrument(skip(self, principal, request), fields(name = %request.name), err)]
    pub async fn create_category(
        &self,
        principal: &Principal,
        request: NewCategory,
    ) -> ServiceResult<Category> {
        require_admin(principal)?;
        let category = Category::create(request, Utc::now())?;
        let mut uow = self.store.begin(TxMode::Write).await?;
        if uow.category_by_name(&category.name).await?.is_some() {
            return Err(DomainError::conflict("category name already exists").into());
        }
        uow.insert_category(&category).await?;
        uow.commit().await?;
        Ok(category)
    }

    pub async fn update_category(
        &self,
        principal: &Principal,
        id: CategoryId,
        update: CategoryUpdate,
    ) -> ServiceResult<Category> {
        require_admin(principal)?;
        let mut uow = self.store.begin(TxMode::Write).await?;
        let mut category = uow.category(id).await?.ok_or(DomainError::NotFound("category"))?;
        category.apply_update(update, Utc::now())?;

        let taken = uow
            .category_by_name(&category.name)
            .await?
            .is_some_and(|existing| existing.id != id);
        if taken {
            return Err(DomainError::conflict("category name already exists").into());
        }
        uow.update_category(&category).await?;
        uow.commit().await?;
        Ok(category)
    }

    /// Delete a category nothing references. Inactive products count as references.
    #[instrument(skip(self, principal), fields(category_id = %id), err)]
    pub async fn delete_category(&self, principal: &Principal, id: CategoryId) -> ServiceResult<()> {
        require_admin(principal)?;
        let mut uow = self.store.begin(TxMode::Write).await?;
        uow.category(id).await?.ok_or(DomainError::NotFound("category"))?;

        let dependents = uow.count_products_in_category(id, false).await?;
        if dependents > 0 {
            return Err(DomainError::conflict(format!(
                "cannot delete category with {dependents} products"
            ))
            .into());
        }
        uow.delete_category(id).await?;
        uow.commit().await?;
        Ok(())
    }

    // Orders

    /// Every order, newest first.
    pub async fn list_orders(&self, principal: &Principal) -> ServiceResult<Vec<Order>> {
        require_admin(principal)?;
        let mut uow = self.store.begin(TxMode::Snapshot).await?;
        let orders = uow.all_orders().await?;
        uow.commit().await?;
        Ok(orders)
    }

    #[instrument(skip(self, principal), fields(order_id = %id, next = %status), err)]
    pub async fn update_order_status(
        &self,
        principal: &Principal,
        id: OrderId,
        status: OrderStatus,
    ) -> ServiceResult<Order> {
        require_admin(principal)?;
        let mut uow = self.store.begin(TxMode::Write).await?;
        let mut order = uow.order(id).await?.ok_or(DomainError::NotFound("order"))?;
        let previous = order.status;
        order.change_status(status, Utc::now())?;
        uow.update_order_status(&order).await?;
        uow.commit().await?;

        info!(from = %previous, to = %order.status, "order status changed");
        Ok(order)
    }

    // Helpers

    async fn modify_product<F>(&self, id: ProductId, change: F) -> ServiceResult<Product>
    where
        F: FnOnce(&mut Product, chrono::DateTime<Utc>) -> Result<(), DomainError> + Send,
    {
        self.modify_product_with(id, change).await.map(|(product, ())| product)
    }

    /// Load, change and save one product in a single write unit of work.
    async fn modify_product_with<F, T>(&self, id: ProductId, change: F) -> ServiceResult<(Product, T)>
    where
        F: FnOnce(&mut Product, chrono::DateTime<Utc>) -> Result<T, DomainError> + Send,
        T: Send,
    {
        let mut uow = self.store.begin(TxMode::Write).await?;
        let mut product = load_product(&mut *uow, id).await?;
        let out = change(&mut product, Utc::now())?;
        uow.update_product(&product).await?;
        uow.commit().await?;
        Ok((product, out))
    }

    /// Best-effort removal of a stored image.
    async fn discard_image(&self, uri: &str) {
        if let Err(err) = self.images.remove(uri).await {
            warn!(image = %uri, error = %err, "failed to remove product image");
        }
    }
}

/// Load and lock a product for a whole-row write, so the stock level written
/// back is the one current at commit time.
async fn load_product(uow: &mut dyn UnitOfWork, id: ProductId) -> ServiceResult<Product> {
    Ok(uow
        .product_for_update(id)
        .await?
        .ok_or(DomainError::NotFound("product"))?)
}

async fn ensure_category(uow: &mut dyn UnitOfWork, id: CategoryId) -> ServiceResult<()> {
    uow.category(id).await?.ok_or(DomainError::NotFound("category"))?;
    Ok(())
}

async fn single_view(uow: &mut dyn UnitOfWork, product: Product) -> ServiceResult<ProductView> {
    product_views(uow, vec![product])
        .await?
        .pop()
        .ok_or_else(|| DomainError::NotFound("product").into())
}
