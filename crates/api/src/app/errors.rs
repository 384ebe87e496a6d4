use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use shopswift_core::DomainError;
use shopswift_infra::ServiceError;

/// Error returned by every handler; renders as `{"error": code, "message": ...}`.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(ServiceError::Domain(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            ServiceError::Domain(err) => domain_error_to_response(err),
            other => {
                tracing::error!(error = %other, "request failed");
                json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal server error",
                )
            }
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> Response {
    let message = err.to_string();
    match err {
        DomainError::Validation(_) => json_error(StatusCode::BAD_REQUEST, "validation_error", message),
        DomainError::InvalidId(_) => json_error(StatusCode::BAD_REQUEST, "invalid_id", message),
        DomainError::EmptyCart => json_error(StatusCode::BAD_REQUEST, "empty_cart", message),
        DomainError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", message),
        DomainError::Forbidden(_) => json_error(StatusCode::FORBIDDEN, "forbidden", message),
        DomainError::Conflict(_) => json_error(StatusCode::CONFLICT, "conflict", message),
        DomainError::AlreadyActive(_) => json_error(StatusCode::CONFLICT, "already_active", message),
        DomainError::AlreadyInactive(_) => {
            json_error(StatusCode::CONFLICT, "already_inactive", message)
        }
        DomainError::InvalidTransition { .. } => {
            json_error(StatusCode::CONFLICT, "invalid_transition", message)
        }
        DomainError::InsufficientStock {
            product_id,
            requested,
            available,
        } => (
            StatusCode::CONFLICT,
            axum::Json(json!({
                "error": "insufficient_stock",
                "message": message,
                "product_id": product_id,
                "requested": requested,
                "available": available,
            })),
        )
            .into_response(),
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopswift_core::ProductId;

    fn status_of(err: DomainError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn domain_errors_map_to_http_statuses() {
        assert_eq!(status_of(DomainError::validation("bad")), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(DomainError::EmptyCart), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(DomainError::NotFound("product")), StatusCode::NOT_FOUND);
        assert_eq!(status_of(DomainError::forbidden("admin only")), StatusCode::FORBIDDEN);
        assert_eq!(status_of(DomainError::conflict("taken")), StatusCode::CONFLICT);
        assert_eq!(status_of(DomainError::AlreadyInactive("product")), StatusCode::CONFLICT);
        assert_eq!(
            status_of(DomainError::insufficient_stock(ProductId::new(), 3, 1)),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn infrastructure_errors_are_internal() {
        let response = ApiError(ServiceError::database("insert_order", "connection reset")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
