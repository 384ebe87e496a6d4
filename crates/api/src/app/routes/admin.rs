//! Moderation endpoints. Authentication happens in the middleware; the admin
//! role itself is checked by the moderation service on every call.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Extension, Path, Query},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};

use shopswift_catalog::{
    Category, CategoryUpdate, CategoryView, NewCategory, NewProduct, Page, Product, ProductUpdate,
    ProductView,
};
use shopswift_core::{CategoryId, DomainError, OrderId, ProductId};
use shopswift_infra::external::MAX_IMAGE_BYTES;
use shopswift_infra::Services;
use shopswift_orders::Order;

use crate::app::dto::{
    self, DeleteProductParams, ImageUploadResponse, ProductListParams, UpdateOrderStatusRequest,
};
use crate::app::errors::ApiError;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route("/products/:id", put(update_product).delete(delete_product))
        .route("/products/:id/restore", post(restore_product))
        .route("/products/:id/toggle-featured", put(toggle_featured))
        .route(
            "/products/:id/image",
            post(upload_image).layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + 1)),
        )
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/:id", put(update_category).delete(delete_category))
        .route("/orders", get(list_orders))
        .route("/orders/:id", put(update_order_status))
}

// -------------------------
// Products
// -------------------------

pub async fn list_products(
    Extension(services): Extension<Arc<Services>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(params): Query<ProductListParams>,
) -> Result<Json<Page<ProductView>>, ApiError> {
    let query = params.into_query()?;
    let page = services
        .moderation
        .list_products(principal.principal(), query)
        .await?;
    Ok(Json(page))
}

pub async fn create_product(
    Extension(services): Extension<Arc<Services>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewProduct>,
) -> Result<(StatusCode, Json<ProductView>), ApiError> {
    let product = services
        .moderation
        .create_product(principal.principal(), body)
        .await?;
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update_product(
    Extension(services): Extension<Arc<Services>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<ProductUpdate>,
) -> Result<Json<ProductView>, ApiError> {
    let id: ProductId = dto::parse_id(&id)?;
    let product = services
        .moderation
        .update_product(principal.principal(), id, body)
        .await?;
    Ok(Json(product))
}

/// Soft delete by default; `?permanent=true` removes the row.
pub async fn delete_product(
    Extension(services): Extension<Arc<Services>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Query(params): Query<DeleteProductParams>,
) -> Result<Response, ApiError> {
    let id: ProductId = dto::parse_id(&id)?;
    if params.permanent {
        services
            .moderation
            .delete_product_permanently(principal.principal(), id)
            .await?;
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let product = services
        .moderation
        .soft_delete_product(principal.principal(), id)
        .await?;
    Ok(Json(product).into_response())
}

pub async fn restore_product(
    Extension(services): Extension<Arc<Services>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let id: ProductId = dto::parse_id(&id)?;
    let product = services
        .moderation
        .restore_product(principal.principal(), id)
        .await?;
    Ok(Json(product))
}

pub async fn toggle_featured(
    Extension(services): Extension<Arc<Services>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let id: ProductId = dto::parse_id(&id)?;
    let product = services
        .moderation
        .toggle_featured(principal.principal(), id)
        .await?;
    Ok(Json(product))
}

/// Raw image body; the media type comes from `Content-Type`.
pub async fn upload_image(
    Extension(services): Extension<Arc<Services>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ImageUploadResponse>, ApiError> {
    let id: ProductId = dto::parse_id(&id)?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| DomainError::validation("missing Content-Type header"))?;

    let product = services
        .moderation
        .set_product_image(principal.principal(), id, content_type, &body)
        .await?;
    Ok(Json(ImageUploadResponse {
        image_url: product.image.clone(),
        product,
    }))
}

// -------------------------
// Categories
// -------------------------

pub async fn list_categories(
    Extension(services): Extension<Arc<Services>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Json<Vec<CategoryView>>, ApiError> {
    Ok(Json(services.moderation.list_categories(principal.principal()).await?))
}

pub async fn create_category(
    Extension(services): Extension<Arc<Services>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewCategory>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let category = services
        .moderation
        .create_category(principal.principal(), body)
        .await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update_category(
    Extension(services): Extension<Arc<Services>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<CategoryUpdate>,
) -> Result<Json<Category>, ApiError> {
    let id: CategoryId = dto::parse_id(&id)?;
    let category = services
        .moderation
        .update_category(principal.principal(), id, body)
        .await?;
    Ok(Json(category))
}

pub async fn delete_category(
    Extension(services): Extension<Arc<Services>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: CategoryId = dto::parse_id(&id)?;
    services
        .moderation
        .delete_category(principal.principal(), id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// -------------------------
// Orders
// -------------------------

pub async fn list_orders(
    Extension(services): Extension<Arc<Services>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(services.moderation.list_orders(principal.principal()).await?))
}

pub async fn update_order_status(
    Extension(services): Extension<Arc<Services>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<UpdateOrderStatusRequest>,
) -> Result<Json<Order>, ApiError> {
    let id: OrderId = dto::parse_id(&id)?;
    let order = services
        .moderation
        .update_order_status(principal.principal(), id, body.status)
        .await?;
    Ok(Json(order))
}
