use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use shopswift_core::OrderId;
use shopswift_infra::Services;
use shopswift_orders::{CheckoutRequest, Order};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_orders).post(place_order))
        .route("/:id", get(get_order))
}

/// Checkout: turns the caller's cart into a pending order.
pub async fn place_order(
    Extension(services): Extension<Arc<Services>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = services
        .checkout
        .place_order(principal.user_id(), body)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn list_orders(
    Extension(services): Extension<Arc<Services>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(services.checkout.orders_for(principal.user_id()).await?))
}

pub async fn get_order(
    Extension(services): Extension<Arc<Services>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let id: OrderId = dto::parse_id(&id)?;
    Ok(Json(services.checkout.order(principal.user_id(), id).await?))
}
