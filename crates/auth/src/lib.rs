//! `shopswift-auth`: authentication/authorization boundary.
//!
//! Decoupled from HTTP and storage: the API decodes a bearer token into
//! [`JwtClaims`], turns them into a [`Principal`], and domain services ask
//! [`is_admin`] / [`require_admin`] before moderation operations.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, require_admin};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use principal::{Principal, is_admin};
pub use roles::Role;
