//! Application services.
//!
//! Each service owns an injected [`Store`] handle and runs every operation as
//! exactly one unit of work: open, read/validate/write through the
//! repositories, commit. Any `?` before the commit drops the unit of work,
//! which discards its writes.

use std::collections::HashMap;
use std::sync::Arc;

use shopswift_catalog::{Category, Product, ProductView, RatingIndex};
use shopswift_core::{CategoryId, ProductId};

use crate::error::ServiceResult;
use crate::external::{ImageStorage, InMemoryImageStorage, LogNotifier, OrderNotifier};
use crate::store::{InMemoryStore, Store, UnitOfWork};

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod moderation;

pub use cart::CartService;
pub use catalog::{CatalogService, ProductDetail};
pub use checkout::CheckoutService;
pub use moderation::ModerationService;

/// Every service, wired to one store.
#[derive(Clone)]
pub struct Services {
    pub catalog: CatalogService,
    pub cart: CartService,
    pub checkout: CheckoutService,
    pub moderation: ModerationService,
}

impl Services {
    pub fn new(
        store: Arc<dyn Store>,
        images: Arc<dyn ImageStorage>,
        notifier: Arc<dyn OrderNotifier>,
    ) -> Self {
        Self {
            catalog: CatalogService::new(store.clone()),
            cart: CartService::new(store.clone()),
            checkout: CheckoutService::new(store.clone(), notifier),
            moderation: ModerationService::new(store, images),
        }
    }

    /// Empty in-memory store, in-memory images and log notifications.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryImageStorage::new()),
            Arc::new(LogNotifier),
        )
    }
}

/// Attach category and rating summary to each product, batching both lookups.
pub(crate) async fn product_views(
    uow: &mut dyn UnitOfWork,
    products: Vec<Product>,
) -> ServiceResult<Vec<ProductView>> {
    if products.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<ProductId> = products.iter().map(|p| p.id).collect();
    let ratings = RatingIndex::from_pairs(uow.ratings(&ids).await?);

    let mut category_ids: Vec<CategoryId> = products.iter().filter_map(|p| p.category_id).collect();
    category_ids.sort();
    category_ids.dedup();
    let categories: HashMap<CategoryId, Category> = uow
        .categories(&category_ids)
        .await?
        .into_iter()
        .map(|c| (c.id, c))
        .collect();

    Ok(products
        .into_iter()
        .map(|product| {
            let summary = ratings.summary(product.id);
            let category = product
                .category_id
                .and_then(|id| categories.get(&id).cloned());
            ProductView::new(product, category, summary)
        })
        .collect())
}
