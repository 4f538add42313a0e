//! Caller context passed to every ledger mutation.

use serde::Serialize;
use stackit_common::{AppError, AppResult};
use stackit_db::entities::user::{self, Role};

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// User ID.
    pub user_id: String,
    /// Display username.
    pub username: String,
    /// Role at authentication time.
    pub role: Role,
    /// Whether the account is banned.
    pub is_banned: bool,
}

impl Session {
    /// Build a session from a user row.
    #[must_use]
    pub fn from_user(user: &user::Model) -> Self {
        Self {
            user_id: user.id.clone(),
            username: user.username.clone(),
            role: user.role,
            is_banned: user.is_banned,
        }
    }

    /// Whether the caller has the admin role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Whether the caller owns `owner_id`'s content or is an admin.
    #[must_use]
    pub fn can_moderate(&self, owner_id: &str) -> bool {
        self.user_id == owner_id || self.is_admin()
    }

    /// Reject callers that may not write.
    pub fn ensure_can_write(&self) -> AppResult<()> {
        if self.is_banned {
            return Err(AppError::Forbidden("This account is banned".to_string()));
        }
        if self.role == Role::Guest {
            return Err(AppError::Forbidden(
                "Guests cannot change content".to_string(),
            ));
        }
        Ok(())
    }

    /// Reject callers that are not admins.
    pub fn ensure_admin(&self) -> AppResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden("Admin access required".to_string()))
        }
    }
}

/// Turn an optional session into an authenticated one.
pub fn require(session: Option<&Session>) -> AppResult<&Session> {
    session.ok_or(AppError::Unauthorized)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn session(role: Role, is_banned: bool) -> Session {
        Session {
            user_id: "u1".to_string(),
            username: "alice".to_string(),
            role,
            is_banned,
        }
    }

    #[test]
    fn test_banned_user_cannot_write() {
        let err = session(Role::User, true).ensure_can_write().unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(session(Role::User, false).ensure_can_write().is_ok());
    }

    #[test]
    fn test_guest_cannot_write() {
        assert!(session(Role::Guest, false).ensure_can_write().is_err());
    }

    #[test]
    fn test_moderation_rights() {
        let user = session(Role::User, false);
        assert!(user.can_moderate("u1"));
        assert!(!user.can_moderate("u2"));
        assert!(session(Role::Admin, false).can_moderate("u2"));
        assert!(user.ensure_admin().is_err());
    }

    #[test]
    fn test_require_without_session_is_unauthorized() {
        assert!(matches!(require(None), Err(AppError::Unauthorized)));
    }
}
