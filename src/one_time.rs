//! Single-use, purpose-scoped, time-bounded tokens for email verification
//! and password reset.

use anyhow::Result;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::models::TokenPurpose;
use crate::store::{AuthStore, NewOneTimeToken};
use crate::token::{digest_token, generate_token};

#[derive(Clone)]
pub struct OneTimeTokens {
    store: Arc<dyn AuthStore>,
    config: AuthConfig,
}

impl OneTimeTokens {
    #[must_use]
    pub fn new(store: Arc<dyn AuthStore>, config: AuthConfig) -> Self {
        Self { store, config }
    }

    /// Issue a fresh token bound to the user and purpose. The TTL is
    /// purpose-dependent. Outstanding tokens for the same user and purpose
    /// stay independently redeemable; issuing does not invalidate siblings.
    pub async fn issue(&self, user_id: Uuid, purpose: TokenPurpose) -> Result<String> {
        let raw_token = generate_token()?;
        let token_digest = digest_token(&raw_token);
        self.store
            .insert_one_time_token(NewOneTimeToken {
                user_id,
                token_digest: &token_digest,
                purpose,
                ttl_seconds: self.config.token_ttl_seconds(purpose),
            })
            .await?;
        Ok(raw_token)
    }

    /// Consume an effective token and return the owning user.
    ///
    /// `None` covers unknown, wrong purpose, expired, and already consumed
    /// alike; the consume is a single atomic conditional update, so two
    /// concurrent redemptions of the same raw value cannot both succeed.
    pub async fn redeem(&self, raw_token: &str, purpose: TokenPurpose) -> Result<Option<Uuid>> {
        let token_digest = digest_token(raw_token);
        self.store
            .consume_one_time_token(&token_digest, purpose)
            .await
    }

    /// Physically remove expired and consumed tokens. Intended for a
    /// periodic schedule external to this core.
    pub async fn cleanup_expired(&self) -> Result<u64> {
        self.store.delete_dead_tokens().await
    }
}
