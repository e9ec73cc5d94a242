//! Domain records and the projections returned across the service boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account lifecycle status.
///
/// `Pending -> Verified` on email verification; `Suspended`/`Deleted` are
/// administrative transitions. Accounts are never hard-deleted by this core.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Pending,
    Verified,
    Suspended,
    Deleted,
}

impl UserStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Suspended => "suspended",
            Self::Deleted => "deleted",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "verified" => Some(Self::Verified),
            "suspended" => Some(Self::Suspended),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }

    /// Login is permitted from `Pending` and `Verified` only.
    #[must_use]
    pub fn can_login(self) -> bool {
        matches!(self, Self::Pending | Self::Verified)
    }
}

/// Full user record as held by the store. Carries the password digest and
/// must never cross the service boundary; callers get [`PublicUserView`].
#[derive(Clone, Debug)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_digest: String,
    pub display_name: String,
    pub status: UserStatus,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Projection of a user with the password digest stripped by construction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublicUserView {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub status: UserStatus,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub roles: Vec<String>,
}

impl From<User> for PublicUserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            display_name: user.display_name,
            status: user.status,
            email_verified_at: user.email_verified_at,
            roles: user.roles,
        }
    }
}

/// Optional client metadata recorded with each session.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionMeta {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub device_label: Option<String>,
}

/// Identity resolved from a valid session token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionIdentity {
    pub session_id: Uuid,
    pub user_id: Uuid,
}

/// Projection of a session for listing; excludes the token digest.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionView {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub device_label: Option<String>,
}

/// Purpose tag for one-time tokens. Closed set so issuance and redemption
/// handle both cases exhaustively.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenPurpose {
    EmailVerification,
    PasswordReset,
}

impl TokenPurpose {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmailVerification => "email_verification",
            Self::PasswordReset => "password_reset",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_status_round_trips() {
        for status in [
            UserStatus::Pending,
            UserStatus::Verified,
            UserStatus::Suspended,
            UserStatus::Deleted,
        ] {
            assert_eq!(UserStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(UserStatus::parse("active"), None);
    }

    #[test]
    fn login_allowed_from_pending_and_verified_only() {
        assert!(UserStatus::Pending.can_login());
        assert!(UserStatus::Verified.can_login());
        assert!(!UserStatus::Suspended.can_login());
        assert!(!UserStatus::Deleted.can_login());
    }

    #[test]
    fn public_view_has_no_password_field() {
        let user = User {
            id: Uuid::new_v4(),
            email: "alice@example.com".to_string(),
            password_digest: "$argon2id$secret".to_string(),
            display_name: "Alice".to_string(),
            status: UserStatus::Pending,
            email_verified_at: None,
            roles: vec!["user".to_string()],
            created_at: Utc::now(),
        };
        let view = PublicUserView::from(user);
        let value = serde_json::to_value(&view).expect("serialize view");
        assert!(value.get("password_digest").is_none());
        assert_eq!(
            value.get("email").and_then(serde_json::Value::as_str),
            Some("alice@example.com")
        );
    }

    #[test]
    fn token_purpose_tags_are_distinct() {
        assert_eq!(
            TokenPurpose::EmailVerification.as_str(),
            "email_verification"
        );
        assert_eq!(TokenPurpose::PasswordReset.as_str(), "password_reset");
    }
}
