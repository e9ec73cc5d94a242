//! Persistence collaborator for users, sessions, and one-time tokens.
//!
//! The trait captures the storage contract the auth core relies on:
//! CRUD-with-unique-constraint on users and token digests, and row-level
//! timestamp conditions (`expires_at > now`, `consumed_at IS NULL`,
//! `revoked_at IS NULL`). [`postgres::PgAuthStore`] is the production
//! implementation; [`memory::MemoryAuthStore`] backs tests and local dev.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{SessionIdentity, SessionMeta, SessionView, TokenPurpose, User, UserStatus};

pub mod memory;
pub mod postgres;

pub use memory::MemoryAuthStore;
pub use postgres::PgAuthStore;

/// Input for user creation. The email must already be normalized.
#[derive(Clone, Copy, Debug)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_digest: &'a str,
    pub display_name: &'a str,
}

/// Outcome of attempting to create a user against the unique email
/// constraint. The check and the insert are a single atomic operation so
/// concurrent registrations cannot both succeed.
#[derive(Debug)]
pub enum UserInsert {
    Created(User),
    EmailConflict,
}

/// Input for session creation. Expiry is computed by the store so a single
/// clock decides all row-level timestamp comparisons.
#[derive(Clone, Debug)]
pub struct NewSession<'a> {
    pub user_id: Uuid,
    pub token_digest: &'a [u8],
    pub ttl_seconds: i64,
    pub meta: &'a SessionMeta,
}

/// Outcome of a session insert against the unique digest constraint.
#[derive(Debug)]
pub enum SessionInsert {
    Inserted { expires_at: DateTime<Utc> },
    DigestConflict,
}

/// Input for one-time token creation.
#[derive(Clone, Debug)]
pub struct NewOneTimeToken<'a> {
    pub user_id: Uuid,
    pub token_digest: &'a [u8],
    pub purpose: TokenPurpose,
    pub ttl_seconds: i64,
}

#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn create_user(&self, user: NewUser<'_>) -> Result<UserInsert>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// Stamp `email_verified_at` and move the account to `Verified`.
    async fn mark_email_verified(&self, id: Uuid) -> Result<()>;

    async fn update_password_digest(&self, id: Uuid, digest: &str) -> Result<()>;

    async fn set_user_status(&self, id: Uuid, status: UserStatus) -> Result<()>;

    async fn insert_session(&self, session: NewSession<'_>) -> Result<SessionInsert>;

    /// Look up a session by digest with the usability conditions applied:
    /// unrevoked and unexpired. Returns `None` on any miss.
    async fn find_usable_session(&self, token_digest: &[u8]) -> Result<Option<SessionIdentity>>;

    async fn touch_session(&self, session_id: Uuid) -> Result<()>;

    /// Set `revoked_at` if unset. Idempotent.
    async fn revoke_session(&self, session_id: Uuid) -> Result<()>;

    /// Revoke every currently-unrevoked session for the user. Returns the
    /// number of sessions revoked.
    async fn revoke_sessions_for_user(&self, user_id: Uuid) -> Result<u64>;

    /// Physically remove expired sessions. Safe to run alongside live
    /// traffic: it only touches rows that can no longer validate.
    async fn delete_expired_sessions(&self) -> Result<u64>;

    /// Active sessions for a user, most-recently-used first. The projection
    /// excludes token digests.
    async fn list_active_sessions(&self, user_id: Uuid) -> Result<Vec<SessionView>>;

    async fn insert_one_time_token(&self, token: NewOneTimeToken<'_>) -> Result<()>;

    /// Atomically consume an effective (unconsumed, unexpired) token that
    /// matches the digest and purpose, returning the owning user. `None`
    /// covers unknown, wrong purpose, expired, and already consumed alike.
    async fn consume_one_time_token(
        &self,
        token_digest: &[u8],
        purpose: TokenPurpose,
    ) -> Result<Option<Uuid>>;

    /// Physically remove expired and consumed one-time tokens.
    async fn delete_dead_tokens(&self) -> Result<u64>;
}
