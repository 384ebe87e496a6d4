use axum::{routing::get, Router};

pub mod admin;
pub mod cart;
pub mod catalog;
pub mod orders;
pub mod reviews;
pub mod system;

/// Router for anonymous catalog browsing.
pub fn public_router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .merge(catalog::router())
}

/// Router for all endpoints that need an authenticated principal.
pub fn protected_router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .merge(reviews::router())
        .nest("/cart", cart::router())
        .nest("/orders", orders::router())
        .nest("/admin", admin::router())
}
