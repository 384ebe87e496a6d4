use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shopswift_core::UserId;

use crate::{Principal, Role};

/// JWT claims model (transport-agnostic).
///
/// The minimal set of claims the store expects once a token has been
/// decoded and its signature verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject: the authenticated user.
    pub sub: UserId,

    #[serde(default)]
    pub roles: Vec<Role>,

    pub issued_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,
}

impl JwtClaims {
    pub fn principal(&self) -> Principal {
        Principal::new(self.sub, self.roles.clone())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error("malformed or unsigned token: {0}")]
    Malformed(String),
}

/// Deterministically validate JWT claims against `now`.
///
/// Validates the claims only; signature checks live in [`crate::jwt`].
pub fn validate_claims(claims: &JwtClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn claims(issued_offset: i64, lifetime: i64) -> JwtClaims {
        let issued_at = Utc::now() + Duration::minutes(issued_offset);
        JwtClaims {
            sub: UserId::new(),
            roles: vec![Role::admin()],
            issued_at,
            expires_at: issued_at + Duration::minutes(lifetime),
        }
    }

    #[test]
    fn accepts_token_inside_window() {
        assert_eq!(validate_claims(&claims(-1, 10), Utc::now()), Ok(()));
    }

    #[test]
    fn rejects_expired_future_and_inverted_windows() {
        let now = Utc::now();
        assert_eq!(validate_claims(&claims(-20, 10), now), Err(TokenValidationError::Expired));
        assert_eq!(validate_claims(&claims(5, 10), now), Err(TokenValidationError::NotYetValid));
        assert_eq!(
            validate_claims(&claims(-1, 0), now),
            Err(TokenValidationError::InvalidTimeWindow)
        );
    }

    #[test]
    fn roles_default_to_empty() {
        let sub = UserId::new();
        let json = format!(
            r#"{{"sub":"{sub}","issued_at":"2026-01-01T00:00:00Z","expires_at":"2026-01-01T01:00:00Z"}}"#
        );
        let claims: JwtClaims = serde_json::from_str(&json).unwrap();
        assert!(claims.roles.is_empty());
        assert_eq!(claims.principal().user_id, sub);
    }
}
