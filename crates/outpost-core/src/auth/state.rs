use crate::models::{Role, User};

/// Point-in-time view of the authentication capability.
///
/// Hosts build a fresh snapshot whenever any of these change and push it into
/// the sync scheduler; nothing here is read from ambient globals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuthSnapshot {
    /// Whether the auth provider has finished resolving the session.
    pub is_loaded: bool,
    pub is_signed_in: bool,
    /// Role of the signed-in user, once known.
    pub role: Option<Role>,
}

impl AuthSnapshot {
    /// Auth provider still resolving.
    pub fn loading() -> Self {
        Self::default()
    }

    pub fn signed_out() -> Self {
        Self {
            is_loaded: true,
            is_signed_in: false,
            role: None,
        }
    }

    pub fn signed_in(role: Role) -> Self {
        Self {
            is_loaded: true,
            is_signed_in: true,
            role: Some(role),
        }
    }

    pub fn for_user(user: &User) -> Self {
        Self::signed_in(user.role)
    }

    pub fn is_admin(&self) -> bool {
        self.is_signed_in && self.role.is_some_and(|r| r.is_admin())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_requires_sign_in() {
        assert!(AuthSnapshot::signed_in(Role::Admin).is_admin());
        assert!(!AuthSnapshot::signed_in(Role::Member).is_admin());
        assert!(!AuthSnapshot::signed_out().is_admin());
        assert!(!AuthSnapshot::loading().is_admin());

        let stale_role = AuthSnapshot {
            is_loaded: true,
            is_signed_in: false,
            role: Some(Role::Admin),
        };
        assert!(!stale_role.is_admin());
    }
}
