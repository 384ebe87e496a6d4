use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    routing::{get, post, put},
    Json, Router,
};

use shopswift_core::CartItemId;
use shopswift_infra::Services;
use shopswift_orders::CartView;

use crate::app::dto::{self, AddCartItemRequest, UpdateCartItemRequest};
use crate::app::errors::ApiError;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(get_cart).delete(clear_cart))
        .route("/items", post(add_item))
        .route("/items/:id", put(update_item).delete(remove_item))
}

pub async fn get_cart(
    Extension(services): Extension<Arc<Services>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Json<CartView>, ApiError> {
    Ok(Json(services.cart.cart(principal.user_id()).await?))
}

pub async fn add_item(
    Extension(services): Extension<Arc<Services>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<AddCartItemRequest>,
) -> Result<Json<CartView>, ApiError> {
    let cart = services
        .cart
        .add_item(principal.user_id(), body.product_id, body.quantity)
        .await?;
    Ok(Json(cart))
}

pub async fn update_item(
    Extension(services): Extension<Arc<Services>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<UpdateCartItemRequest>,
) -> Result<Json<CartView>, ApiError> {
    let item_id: CartItemId = dto::parse_id(&id)?;
    let cart = services
        .cart
        .update_item(principal.user_id(), item_id, body.quantity)
        .await?;
    Ok(Json(cart))
}

pub async fn remove_item(
    Extension(services): Extension<Arc<Services>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Json<CartView>, ApiError> {
    let item_id: CartItemId = dto::parse_id(&id)?;
    Ok(Json(services.cart.remove_item(principal.user_id(), item_id).await?))
}

pub async fn clear_cart(
    Extension(services): Extension<Arc<Services>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Json<CartView>, ApiError> {
    Ok(Json(services.cart.clear(principal.user_id()).await?))
}
