use shopswift_auth::{Principal, Role, is_admin};
use shopswift_core::UserId;

/// Principal context for a request (authenticated identity + roles).
///
/// Inserted by the auth middleware; present on every protected route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn user_id(&self) -> UserId {
        self.principal.user_id()
    }

    pub fn roles(&self) -> &[Role] {
        self.principal.roles()
    }

    pub fn is_admin(&self) -> bool {
        is_admin(&self.principal)
    }
}
