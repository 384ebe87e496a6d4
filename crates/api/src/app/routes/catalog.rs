use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    routing::get,
    Json, Router,
};

use shopswift_catalog::{CategoryView, Page, ProductView, Review};
use shopswift_core::{CategoryId, ProductId};
use shopswift_infra::{ProductDetail, Services};

use crate::app::dto::{self, FeaturedParams, ProductListParams, ReviewListParams};
use crate::app::errors::ApiError;

pub fn router() -> Router {
    Router::new()
        .route("/products", get(list_products))
        .route("/products/featured", get(featured_products))
        .route("/products/:id", get(get_product))
        .route("/products/:id/reviews", get(list_reviews))
        .route("/categories", get(list_categories))
        .route("/categories/:id", get(get_category))
}

pub async fn list_products(
    Extension(services): Extension<Arc<Services>>,
    Query(params): Query<ProductListParams>,
) -> Result<Json<Page<ProductView>>, ApiError> {
    let query = params.into_query()?;
    Ok(Json(services.catalog.query_products(query).await?))
}

pub async fn featured_products(
    Extension(services): Extension<Arc<Services>>,
    Query(params): Query<FeaturedParams>,
) -> Result<Json<Vec<ProductView>>, ApiError> {
    Ok(Json(services.catalog.featured_products(params.limit).await?))
}

pub async fn get_product(
    Extension(services): Extension<Arc<Services>>,
    Path(id): Path<String>,
) -> Result<Json<ProductDetail>, ApiError> {
    let id: ProductId = dto::parse_id(&id)?;
    Ok(Json(services.catalog.product_detail(id).await?))
}

pub async fn list_reviews(
    Extension(services): Extension<Arc<Services>>,
    Path(id): Path<String>,
    Query(params): Query<ReviewListParams>,
) -> Result<Json<Vec<Review>>, ApiError> {
    let id: ProductId = dto::parse_id(&id)?;
    let reviews = services
        .catalog
        .product_reviews(id, params.skip, params.limit)
        .await?;
    Ok(Json(reviews))
}

pub async fn list_categories(
    Extension(services): Extension<Arc<Services>>,
) -> Result<Json<Vec<CategoryView>>, ApiError> {
    Ok(Json(services.catalog.list_categories().await?))
}

pub async fn get_category(
    Extension(services): Extension<Arc<Services>>,
    Path(id): Path<String>,
) -> Result<Json<CategoryView>, ApiError> {
    let id: CategoryId = dto::parse_id(&id)?;
    Ok(Json(services.catalog.category(id).await?))
}
