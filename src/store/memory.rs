//! In-memory store for tests and local development.
//!
//! Each operation takes the single mutex for its whole duration, which gives
//! the same effective atomicity the Postgres implementation gets from its
//! unique constraints and conditional updates.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{AuthStore, NewOneTimeToken, NewSession, NewUser, SessionInsert, UserInsert};
use crate::models::{SessionIdentity, SessionMeta, SessionView, TokenPurpose, User, UserStatus};

#[derive(Clone, Debug)]
struct MemSession {
    id: Uuid,
    user_id: Uuid,
    token_digest: Vec<u8>,
    created_at: DateTime<Utc>,
    last_used_at: Option<DateTime<Utc>>,
    expires_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
    meta: SessionMeta,
}

impl MemSession {
    fn usable(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

#[derive(Clone, Debug)]
struct MemToken {
    user_id: Uuid,
    token_digest: Vec<u8>,
    purpose: TokenPurpose,
    expires_at: DateTime<Utc>,
    consumed_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    sessions: HashMap<Uuid, MemSession>,
    tokens: Vec<MemToken>,
}

#[derive(Default)]
pub struct MemoryAuthStore {
    inner: Mutex<Inner>,
}

impl MemoryAuthStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthStore for MemoryAuthStore {
    async fn create_user(&self, user: NewUser<'_>) -> Result<UserInsert> {
        let mut inner = self.inner.lock().await;
        if inner.users.values().any(|u| u.email == user.email) {
            return Ok(UserInsert::EmailConflict);
        }
        let record = User {
            id: Uuid::new_v4(),
            email: user.email.to_string(),
            password_digest: user.password_digest.to_string(),
            display_name: user.display_name.to_string(),
            status: UserStatus::Pending,
            email_verified_at: None,
            roles: vec!["user".to_string()],
            created_at: Utc::now(),
        };
        inner.users.insert(record.id, record.clone());
        Ok(UserInsert::Created(record))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let inner = self.inner.lock().await;
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let inner = self.inner.lock().await;
        Ok(inner.users.get(&id).cloned())
    }

    async fn mark_email_verified(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(user) = inner.users.get_mut(&id) {
            user.email_verified_at = Some(Utc::now());
            user.status = UserStatus::Verified;
        }
        Ok(())
    }

    async fn update_password_digest(&self, id: Uuid, digest: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(user) = inner.users.get_mut(&id) {
            user.password_digest = digest.to_string();
        }
        Ok(())
    }

    async fn set_user_status(&self, id: Uuid, status: UserStatus) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(user) = inner.users.get_mut(&id) {
            user.status = status;
        }
        Ok(())
    }

    async fn insert_session(&self, session: NewSession<'_>) -> Result<SessionInsert> {
        let mut inner = self.inner.lock().await;
        if inner
            .sessions
            .values()
            .any(|s| s.token_digest == session.token_digest)
        {
            return Ok(SessionInsert::DigestConflict);
        }
        let now = Utc::now();
        let expires_at = now + chrono::Duration::seconds(session.ttl_seconds);
        let record = MemSession {
            id: Uuid::new_v4(),
            user_id: session.user_id,
            token_digest: session.token_digest.to_vec(),
            created_at: now,
            last_used_at: None,
            expires_at,
            revoked_at: None,
            meta: session.meta.clone(),
        };
        inner.sessions.insert(record.id, record);
        Ok(SessionInsert::Inserted { expires_at })
    }

    async fn find_usable_session(&self, token_digest: &[u8]) -> Result<Option<SessionIdentity>> {
        let inner = self.inner.lock().await;
        let now = Utc::now();
        Ok(inner
            .sessions
            .values()
            .find(|s| s.token_digest == token_digest && s.usable(now))
            .map(|s| SessionIdentity {
                session_id: s.id,
                user_id: s.user_id,
            }))
    }

    async fn touch_session(&self, session_id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(session) = inner.sessions.get_mut(&session_id) {
            session.last_used_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn revoke_session(&self, session_id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(session) = inner.sessions.get_mut(&session_id) {
            if session.revoked_at.is_none() {
                session.revoked_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn revoke_sessions_for_user(&self, user_id: Uuid) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let mut revoked = 0;
        for session in inner.sessions.values_mut() {
            if session.user_id == user_id && session.revoked_at.is_none() {
                session.revoked_at = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn delete_expired_sessions(&self) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let before = inner.sessions.len();
        inner.sessions.retain(|_, s| s.expires_at > now);
        Ok((before - inner.sessions.len()) as u64)
    }

    async fn list_active_sessions(&self, user_id: Uuid) -> Result<Vec<SessionView>> {
        let inner = self.inner.lock().await;
        let now = Utc::now();
        let mut sessions: Vec<&MemSession> = inner
            .sessions
            .values()
            .filter(|s| s.user_id == user_id && s.usable(now))
            .collect();
        sessions.sort_by_key(|s| std::cmp::Reverse(s.last_used_at.unwrap_or(s.created_at)));
        Ok(sessions
            .into_iter()
            .map(|s| SessionView {
                id: s.id,
                created_at: s.created_at,
                last_used_at: s.last_used_at,
                expires_at: s.expires_at,
                user_agent: s.meta.user_agent.clone(),
                ip_address: s.meta.ip_address.clone(),
                device_label: s.meta.device_label.clone(),
            })
            .collect())
    }

    async fn insert_one_time_token(&self, token: NewOneTimeToken<'_>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let record = MemToken {
            user_id: token.user_id,
            token_digest: token.token_digest.to_vec(),
            purpose: token.purpose,
            expires_at: Utc::now() + chrono::Duration::seconds(token.ttl_seconds),
            consumed_at: None,
        };
        inner.tokens.push(record);
        Ok(())
    }

    async fn consume_one_time_token(
        &self,
        token_digest: &[u8],
        purpose: TokenPurpose,
    ) -> Result<Option<Uuid>> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        for token in &mut inner.tokens {
            if token.token_digest == token_digest
                && token.purpose == purpose
                && token.consumed_at.is_none()
                && token.expires_at > now
            {
                token.consumed_at = Some(now);
                return Ok(Some(token.user_id));
            }
        }
        Ok(None)
    }

    async fn delete_dead_tokens(&self) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let before = inner.tokens.len();
        inner
            .tokens
            .retain(|t| t.consumed_at.is_none() && t.expires_at > now);
        Ok((before - inner.tokens.len()) as u64)
    }
}
