use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{post, put},
    Json, Router,
};

use shopswift_catalog::{NewReview, Review, ReviewUpdate};
use shopswift_core::{ProductId, ReviewId};
use shopswift_infra::Services;

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/products/:id/reviews", post(create_review))
        .route("/reviews/:id", put(update_review).delete(delete_review))
}

pub async fn create_review(
    Extension(services): Extension<Arc<Services>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<NewReview>,
) -> Result<(StatusCode, Json<Review>), ApiError> {
    let product_id: ProductId = dto::parse_id(&id)?;
    let review = services
        .catalog
        .create_review(principal.principal(), product_id, body)
        .await?;
    Ok((StatusCode::CREATED, Json(review)))
}

pub async fn update_review(
    Extension(services): Extension<Arc<Services>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<ReviewUpdate>,
) -> Result<Json<Review>, ApiError> {
    let id: ReviewId = dto::parse_id(&id)?;
    let review = services
        .catalog
        .update_review(principal.principal(), id, body)
        .await?;
    Ok(Json(review))
}

pub async fn delete_review(
    Extension(services): Extension<Arc<Services>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: ReviewId = dto::parse_id(&id)?;
    services.catalog.delete_review(principal.principal(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
