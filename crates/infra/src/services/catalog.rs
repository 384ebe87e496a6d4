//! Public catalog reads and shopper reviews.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{Span, info, instrument};

use shopswift_auth::{Principal, is_admin};
use shopswift_catalog::{
    CategoryView, NewReview, Page, PageRequest, ProductFilter, ProductQuery, ProductSort,
    ProductView, Review, ReviewUpdate,
};
use shopswift_core::{CategoryId, DomainError, ProductId, ReviewId};

use super::product_views;
use crate::error::ServiceResult;
use crate::store::{Store, TxMode};

pub const DEFAULT_FEATURED_LIMIT: u32 = 8;
pub const MAX_FEATURED_LIMIT: u32 = 20;
pub const DEFAULT_REVIEW_LIMIT: u32 = 50;
pub const MAX_REVIEW_LIMIT: u32 = 100;

/// Product detail page: the product view plus its reviews, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: ProductView,
    pub reviews: Vec<Review>,
}

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Filtered, sorted, paginated active products with rating summaries.
    ///
    /// The page, its total and the rating aggregates are all read from one
    /// snapshot, so `total` never disagrees with the rows it counts.
    #[instrument(skip(self, query), fields(total = tracing::field::Empty), err)]
    pub async fn query_products(&self, mut query: ProductQuery) -> ServiceResult<Page<ProductView>> {
        query.filter.include_inactive = false;
        let page = self.run_query(&query).await?;
        Span::current().record("total", page.total);
        Ok(page)
    }

    pub(crate) async fn run_query(&self, query: &ProductQuery) -> ServiceResult<Page<ProductView>> {
        let mut uow = self.store.begin(TxMode::Snapshot).await?;
        let (products, total) = uow.query_products(query).await?;
        let items = product_views(&mut *uow, products).await?;
        uow.commit().await?;
        Ok(Page::new(items, total, query.page))
    }

    /// Active featured products, newest first.
    pub async fn featured_products(&self, limit: Option<u32>) -> ServiceResult<Vec<ProductView>> {
        let page = PageRequest::bounded(
            0,
            limit.unwrap_or(DEFAULT_FEATURED_LIMIT),
            MAX_FEATURED_LIMIT,
        )?;
        let query = ProductQuery {
            filter: ProductFilter {
                featured_only: true,
                ..ProductFilter::default()
            },
            sort: ProductSort::newest_first(),
            page,
        };
        Ok(self.run_query(&query).await?.items)
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    pub async fn product_detail(&self, id: ProductId) -> ServiceResult<ProductDetail> {
        let mut uow = self.store.begin(TxMode::Snapshot).await?;
        let product = uow
            .product(id)
            .await?
            .filter(|p| p.is_active)
            .ok_or(DomainError::NotFound("product"))?;
        let reviews = uow.reviews_for_product(id, 0, u32::MAX).await?;
        let mut views = product_views(&mut *uow, vec![product]).await?;
        uow.commit().await?;

        let product = views.pop().ok_or(DomainError::NotFound("product"))?;
        Ok(ProductDetail { product, reviews })
    }

    /// One page of a product's reviews, newest first.
    pub async fn product_reviews(
        &self,
        id: ProductId,
        skip: u64,
        limit: Option<u32>,
    ) -> ServiceResult<Vec<Review>> {
        let page = PageRequest::bounded(skip, limit.unwrap_or(DEFAULT_REVIEW_LIMIT), MAX_REVIEW_LIMIT)?;
        let mut uow = self.store.begin(TxMode::Snapshot).await?;
        let reviews = uow
            .reviews_for_product(id, page.skip(), page.limit())
            .await?;
        uow.commit().await?;
        Ok(reviews)
    }

    /// Active categories, each with its number of active products.
    pub async fn list_categories(&self) -> ServiceResult<Vec<CategoryView>> {
        let mut uow = self.store.begin(TxMode::Snapshot).await?;
        let categories = uow.list_categories(true).await?;
        uow.commit().await?;
        Ok(categories)
    }

    pub async fn category(&self, id: CategoryId) -> ServiceResult<CategoryView> {
        let mut uow = self.store.begin(TxMode::Snapshot).await?;
        let category = uow
            .category(id)
            .await?
            .filter(|c| c.is_active)
            .ok_or(DomainError::NotFound("category"))?;
        let product_count = uow.count_products_in_category(id, true).await?;
        uow.commit().await?;
        Ok(CategoryView {
            category,
            product_count,
        })
    }

    /// Review an active product. A user reviews each product at most once.
    #[instrument(skip(self, principal, request), fields(user_id = %principal.user_id(), product_id = %product_id), err)]
    pub async fn create_review(
        &self,
        principal: &Principal,
        product_id: ProductId,
        request: NewReview,
    ) -> ServiceResult<Review> {
        let user_id = principal.user_id();
        let mut uow = self.store.begin(TxMode::Write).await?;
        uow.product(product_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or(DomainError::NotFound("product"))?;
        if uow.review_by_author(user_id, product_id).await?.is_some() {
            return Err(DomainError::conflict("you have already reviewed this product").into());
        }

        let review = Review::create(user_id, product_id, request, Utc::now())?;
        uow.insert_review(&review).await?;
        uow.commit().await?;

        info!(review_id = %review.id, rating = review.rating, "review created");
        Ok(review)
    }

    /// Edit a review. Only its author may.
    pub async fn update_review(
        &self,
        principal: &Principal,
        id: ReviewId,
        update: ReviewUpdate,
    ) -> ServiceResult<Review> {
        let mut uow = self.store.begin(TxMode::Write).await?;
        let mut review = uow.review(id).await?.ok_or(DomainError::NotFound("review"))?;
        review.ensure_author(principal.user_id())?;
        review.apply_update(update, Utc::now())?;
        uow.update_review(&review).await?;
        uow.commit().await?;
        Ok(review)
    }

    /// Delete a review. Its author or an admin may.
    pub async fn delete_review(&self, principal: &Principal, id: ReviewId) -> ServiceResult<()> {
        let mut uow = self.store.begin(TxMode::Write).await?;
        let review = uow.review(id).await?.ok_or(DomainError::NotFound("review"))?;
        if !is_admin(principal) {
            review.ensure_author(principal.user_id())?;
        }
        uow.delete_review(id).await?;
        uow.commit().await?;
        Ok(())
    }
}
