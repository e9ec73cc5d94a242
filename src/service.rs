//! Orchestration of registration, login, logout, verification and reset
//! flows. This is the sole entry point consumed by the route layer.

use regex::Regex;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::email::{EmailSender, reset_message, verification_message};
use crate::error::AuthError;
use crate::models::{PublicUserView, SessionMeta, TokenPurpose, User, UserStatus};
use crate::one_time::OneTimeTokens;
use crate::password::{PasswordHasher, PasswordPolicy};
use crate::sessions::{IssuedSession, Sessions};
use crate::store::{AuthStore, NewUser, UserInsert};

/// Result of a successful login: the profile with the password digest
/// stripped, plus the raw session token for the client.
#[derive(Clone, Debug)]
pub struct LoginOutcome {
    pub user: PublicUserView,
    pub session_token: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

pub struct AuthService {
    store: Arc<dyn AuthStore>,
    sessions: Sessions,
    tokens: OneTimeTokens,
    hasher: PasswordHasher,
    mailer: Arc<dyn EmailSender>,
    config: AuthConfig,
}

impl AuthService {
    #[must_use]
    pub fn new(store: Arc<dyn AuthStore>, mailer: Arc<dyn EmailSender>, config: AuthConfig) -> Self {
        let sessions = Sessions::new(store.clone(), config.clone());
        let tokens = OneTimeTokens::new(store.clone(), config.clone());
        Self {
            store,
            sessions,
            tokens,
            hasher: PasswordHasher::new(),
            mailer,
            config,
        }
    }

    /// Replace the password hasher. Tests use cheap cost parameters.
    #[must_use]
    pub fn with_hasher(mut self, hasher: PasswordHasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Session component, exposed for listing and scheduled cleanup.
    #[must_use]
    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    /// One-time token component, exposed for scheduled cleanup.
    #[must_use]
    pub fn one_time_tokens(&self) -> &OneTimeTokens {
        &self.tokens
    }

    /// Register a new account in `Pending` status. No session is created.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<PublicUserView, AuthError> {
        let email = normalize_email(email);
        PasswordPolicy::validate(password).map_err(AuthError::WeakPassword)?;
        let password_digest = self.hasher.hash(password)?;

        let inserted = self
            .store
            .create_user(NewUser {
                email: &email,
                password_digest: &password_digest,
                display_name: display_name.trim(),
            })
            .await?;
        match inserted {
            UserInsert::Created(user) => {
                info!(user_id = %user.id, "registered new account");
                Ok(PublicUserView::from(user))
            }
            UserInsert::EmailConflict => Err(AuthError::EmailAlreadyInUse),
        }
    }

    /// Authenticate and open exactly one new session, revoking every prior
    /// session for the user first.
    ///
    /// An unknown email and a wrong password fail identically so callers
    /// cannot probe for accounts.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        meta: SessionMeta,
    ) -> Result<LoginOutcome, AuthError> {
        let email = normalize_email(email);
        let Some(user) = self.store.find_user_by_email(&email).await? else {
            return Err(AuthError::InvalidCredentials);
        };
        if !user.status.can_login() {
            return Err(AuthError::AccountInactive);
        }
        if !self.hasher.verify(&user.password_digest, password)? {
            return Err(AuthError::InvalidCredentials);
        }

        // Every successful login invalidates prior bearer tokens.
        self.sessions.revoke_all_for_user(user.id).await?;
        let IssuedSession {
            raw_token,
            expires_at,
        } = self.sessions.create(user.id, &meta).await?;

        Ok(LoginOutcome {
            user: PublicUserView::from(user),
            session_token: raw_token,
            expires_at,
        })
    }

    /// Revoke the session behind the token. An invalid token is a silent
    /// no-op; logout never reports failure to the client.
    pub async fn logout(&self, raw_token: &str) -> Result<(), AuthError> {
        if let Some(identity) = self.sessions.validate(raw_token).await? {
            self.sessions.revoke(identity.session_id).await?;
        }
        Ok(())
    }

    /// Resolve the session token into the owning profile.
    pub async fn current_user(&self, raw_token: &str) -> Result<Option<PublicUserView>, AuthError> {
        let Some(identity) = self.sessions.validate(raw_token).await? else {
            return Ok(None);
        };
        let user = self.store.find_user_by_id(identity.user_id).await?;
        Ok(user.map(PublicUserView::from))
    }

    /// Issue a verification token and send the verification mail.
    ///
    /// An unknown email reports success with no observable effect, so the
    /// endpoint cannot be used to enumerate accounts. A mail transport
    /// failure does propagate.
    pub async fn request_email_verification(&self, email: &str) -> Result<(), AuthError> {
        let Some(user) = self.lookup_for_request(email).await? else {
            return Ok(());
        };
        let token = self
            .tokens
            .issue(user.id, TokenPurpose::EmailVerification)
            .await?;
        let message = verification_message(
            self.config.frontend_base_url(),
            self.config.sender_name(),
            &user.email,
            &token,
        );
        self.mailer.send(&message).await?;
        Ok(())
    }

    /// Consume a verification token and stamp the account verified.
    pub async fn verify_email(&self, raw_token: &str) -> Result<(), AuthError> {
        let user_id = self
            .tokens
            .redeem(raw_token, TokenPurpose::EmailVerification)
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;
        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;
        if user.email_verified_at.is_some() {
            return Err(AuthError::AlreadyVerified);
        }
        self.store.mark_email_verified(user.id).await?;
        info!(%user_id, "email verified");
        Ok(())
    }

    /// Issue a reset token and send the reset mail. Same anti-enumeration
    /// shape as [`Self::request_email_verification`].
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let Some(user) = self.lookup_for_request(email).await? else {
            return Ok(());
        };
        let token = self
            .tokens
            .issue(user.id, TokenPurpose::PasswordReset)
            .await?;
        let message = reset_message(
            self.config.frontend_base_url(),
            self.config.sender_name(),
            &user.email,
            &token,
        );
        self.mailer.send(&message).await?;
        Ok(())
    }

    /// Consume a reset token, store the new password, and revoke every
    /// session the user holds, forcing re-authentication everywhere.
    pub async fn reset_password(
        &self,
        raw_token: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        // Policy first: a weak password must fail before the token is burned.
        PasswordPolicy::validate(new_password).map_err(AuthError::WeakPassword)?;
        let user_id = self
            .tokens
            .redeem(raw_token, TokenPurpose::PasswordReset)
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;
        let password_digest = self.hasher.hash(new_password)?;
        self.store
            .update_password_digest(user_id, &password_digest)
            .await?;
        self.sessions.revoke_all_for_user(user_id).await?;
        info!(%user_id, "password reset");
        Ok(())
    }

    /// Suspend the account and revoke its sessions.
    pub async fn suspend_user(&self, user_id: Uuid) -> Result<(), AuthError> {
        self.store
            .set_user_status(user_id, UserStatus::Suspended)
            .await?;
        self.sessions.revoke_all_for_user(user_id).await?;
        Ok(())
    }

    /// Mark the account deleted and revoke its sessions. A status
    /// transition only; the record is retained.
    pub async fn delete_user(&self, user_id: Uuid) -> Result<(), AuthError> {
        self.store
            .set_user_status(user_id, UserStatus::Deleted)
            .await?;
        self.sessions.revoke_all_for_user(user_id).await?;
        Ok(())
    }

    async fn lookup_for_request(&self, email: &str) -> Result<Option<User>, AuthError> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Ok(None);
        }
        Ok(self.store.find_user_by_email(&email).await?)
    }
}
