use thiserror::Error;

use shopswift_core::DomainError;

use crate::principal::{Principal, is_admin};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: admin role required")]
    AdminRequired,
}

impl From<AuthzError> for DomainError {
    fn from(err: AuthzError) -> Self {
        DomainError::forbidden(err.to_string())
    }
}

/// Reject non-admin principals.
///
/// - No IO
/// - No panics
pub fn require_admin(principal: &Principal) -> Result<(), AuthzError> {
    if is_admin(principal) {
        Ok(())
    } else {
        Err(AuthzError::AdminRequired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;
    use shopswift_core::UserId;

    #[test]
    fn non_admin_is_forbidden() {
        let principal = Principal::new(UserId::new(), vec![Role::new("customer")]);
        let err = require_admin(&principal).unwrap_err();
        assert_eq!(err, AuthzError::AdminRequired);
        assert!(matches!(DomainError::from(err), DomainError::Forbidden(_)));
    }

    #[test]
    fn admin_passes() {
        let principal = Principal::new(UserId::new(), vec![Role::admin()]);
        assert!(require_admin(&principal).is_ok());
    }
}
