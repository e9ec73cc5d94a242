//! Login session management over the persistence collaborator.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::models::{SessionIdentity, SessionMeta, SessionView};
use crate::store::{AuthStore, NewSession, SessionInsert};
use crate::token::{digest_token, generate_token};

const INSERT_ATTEMPTS: usize = 3;

/// A freshly created session: the raw bearer token exists only here and in
/// transit to the client.
#[derive(Clone, Debug)]
pub struct IssuedSession {
    pub raw_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Sessions {
    store: Arc<dyn AuthStore>,
    config: AuthConfig,
}

impl Sessions {
    #[must_use]
    pub fn new(store: Arc<dyn AuthStore>, config: AuthConfig) -> Self {
        Self { store, config }
    }

    /// Create a session for the user and return the raw token.
    ///
    /// Retries token generation on a digest collision; only the digest is
    /// persisted.
    pub async fn create(&self, user_id: Uuid, meta: &SessionMeta) -> Result<IssuedSession> {
        for _ in 0..INSERT_ATTEMPTS {
            let raw_token = generate_token()?;
            let token_digest = digest_token(&raw_token);
            let inserted = self
                .store
                .insert_session(NewSession {
                    user_id,
                    token_digest: &token_digest,
                    ttl_seconds: self.config.session_ttl_seconds(),
                    meta,
                })
                .await?;
            match inserted {
                SessionInsert::Inserted { expires_at } => {
                    return Ok(IssuedSession {
                        raw_token,
                        expires_at,
                    });
                }
                SessionInsert::DigestConflict => {}
            }
        }
        Err(anyhow!("failed to generate unique session token"))
    }

    /// Resolve a raw token into the owning identity, touching
    /// `last_used_at` on a hit.
    ///
    /// Returns `None` for unknown, expired, and revoked tokens alike, so
    /// callers cannot distinguish the three.
    pub async fn validate(&self, raw_token: &str) -> Result<Option<SessionIdentity>> {
        let token_digest = digest_token(raw_token);
        let Some(identity) = self.store.find_usable_session(&token_digest).await? else {
            return Ok(None);
        };
        self.store.touch_session(identity.session_id).await?;
        Ok(Some(identity))
    }

    /// Revoke one session. Idempotent.
    pub async fn revoke(&self, session_id: Uuid) -> Result<()> {
        self.store.revoke_session(session_id).await
    }

    /// Revoke every unrevoked session for the user. Used for rotation on
    /// login and mandatorily after a password reset.
    pub async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64> {
        let revoked = self.store.revoke_sessions_for_user(user_id).await?;
        if revoked > 0 {
            debug!(%user_id, revoked, "revoked user sessions");
        }
        Ok(revoked)
    }

    /// Physically remove expired sessions. Intended for a periodic schedule
    /// external to this core.
    pub async fn cleanup_expired(&self) -> Result<u64> {
        self.store.delete_expired_sessions().await
    }

    /// Active sessions for a user, most-recently-used first.
    pub async fn list_active(&self, user_id: Uuid) -> Result<Vec<SessionView>> {
        self.store.list_active_sessions(user_id).await
    }
}
