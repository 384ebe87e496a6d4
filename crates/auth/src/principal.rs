use serde::{Deserialize, Serialize};

use shopswift_core::UserId;

use crate::Role;

/// An authenticated caller: the user id from the token and its roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub roles: Vec<Role>,
}

impl Principal {
    pub fn new(user_id: UserId, roles: Vec<Role>) -> Self {
        Self { user_id, roles }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }
}

/// Capability check used by every moderation operation.
pub fn is_admin(principal: &Principal) -> bool {
    principal.roles.iter().any(Role::is_admin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_role_grants_admin() {
        let admin = Principal::new(UserId::new(), vec![Role::new("staff"), Role::admin()]);
        let shopper = Principal::new(UserId::new(), vec![Role::new("customer")]);
        let nobody = Principal::new(UserId::new(), Vec::new());

        assert!(is_admin(&admin));
        assert!(!is_admin(&shopper));
        assert!(!is_admin(&nobody));
    }

    #[test]
    fn role_names_are_case_sensitive() {
        let principal = Principal::new(UserId::new(), vec![Role::new("Admin")]);
        assert!(!is_admin(&principal));
    }
}
