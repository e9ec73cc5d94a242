//! Auth configuration and token lifetimes.

use crate::models::TokenPurpose;

const DEFAULT_SESSION_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_VERIFICATION_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_RESET_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_SENDER_NAME: &str = "GRIMOIRE";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    session_ttl_seconds: i64,
    verification_token_ttl_seconds: i64,
    reset_token_ttl_seconds: i64,
    sender_name: String,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            verification_token_ttl_seconds: DEFAULT_VERIFICATION_TTL_SECONDS,
            reset_token_ttl_seconds: DEFAULT_RESET_TTL_SECONDS,
            sender_name: DEFAULT_SENDER_NAME.to_string(),
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_verification_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.verification_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_reset_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_sender_name(mut self, name: String) -> Self {
        self.sender_name = name;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    /// TTL for a one-time token, by purpose.
    #[must_use]
    pub fn token_ttl_seconds(&self, purpose: TokenPurpose) -> i64 {
        match purpose {
            TokenPurpose::EmailVerification => self.verification_token_ttl_seconds,
            TokenPurpose::PasswordReset => self.reset_token_ttl_seconds,
        }
    }

    #[must_use]
    pub fn sender_name(&self) -> &str {
        &self.sender_name
    }
}
