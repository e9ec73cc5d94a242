//! Error taxonomy reported to the route layer.
//!
//! Every variant except `Internal` is an expected, recoverable outcome.
//! Two information-hiding rules are deliberate: login failures never
//! distinguish an unknown account from a wrong password, and one-time token
//! redemption failures never distinguish expired, consumed, and unknown.

use thiserror::Error;

use crate::password::{HashingError, PolicyViolation};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    WeakPassword(PolicyViolation),

    #[error("a user with this email already exists")]
    EmailAlreadyInUse,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("account is suspended or deleted")]
    AccountInactive,

    #[error("invalid or expired token")]
    InvalidOrExpiredToken,

    #[error("email is already verified")]
    AlreadyVerified,

    #[error(transparent)]
    Hashing(#[from] HashingError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_account_and_wrong_password_render_identically() {
        assert_eq!(
            AuthError::InvalidCredentials.to_string(),
            "invalid email or password"
        );
    }

    #[test]
    fn token_redemption_failure_is_undifferentiated() {
        assert_eq!(
            AuthError::InvalidOrExpiredToken.to_string(),
            "invalid or expired token"
        );
    }

    #[test]
    fn weak_password_carries_the_first_violation() {
        let err = AuthError::WeakPassword(PolicyViolation::MissingDigit);
        assert_eq!(
            err.to_string(),
            "Password must contain at least one number"
        );
    }
}
