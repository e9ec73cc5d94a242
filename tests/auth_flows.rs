//! End-to-end flows for registration, login, verification, and reset,
//! running against the in-memory store with cheap hashing parameters.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use grimoire_auth::email::{EmailMessage, EmailSender};
use grimoire_auth::password::{PasswordHasher, PolicyViolation};
use grimoire_auth::store::{AuthStore, MemoryAuthStore};
use grimoire_auth::{AuthConfig, AuthError, AuthService, SessionMeta, UserStatus};

/// Captures outbound messages so tests can pull raw tokens from the links.
#[derive(Default)]
struct RecordingEmailSender {
    sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingEmailSender {
    fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().expect("mailer lock").clone()
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        self.sent.lock().expect("mailer lock").push(message.clone());
        Ok(())
    }
}

struct FailingEmailSender;

#[async_trait]
impl EmailSender for FailingEmailSender {
    async fn send(&self, _message: &EmailMessage) -> Result<()> {
        Err(anyhow!("smtp unreachable"))
    }
}

struct Harness {
    service: AuthService,
    store: Arc<MemoryAuthStore>,
    mailer: Arc<RecordingEmailSender>,
}

fn harness_with_config(config: AuthConfig) -> Harness {
    let store = Arc::new(MemoryAuthStore::new());
    let mailer = Arc::new(RecordingEmailSender::default());
    let hasher = PasswordHasher::with_params(8192, 1, 1).expect("valid test params");
    let service = AuthService::new(store.clone(), mailer.clone(), config).with_hasher(hasher);
    Harness {
        service,
        store,
        mailer,
    }
}

fn harness() -> Harness {
    harness_with_config(AuthConfig::new("https://grimoire.app".to_string()))
}

fn extract_token(message: &EmailMessage) -> Result<String> {
    let start = message
        .html_body
        .find("?token=")
        .context("no token link in message")?
        + "?token=".len();
    let rest = &message.html_body[start..];
    let end = rest.find('"').context("unterminated token link")?;
    Ok(rest[..end].to_string())
}

#[tokio::test]
async fn register_normalizes_email_and_starts_pending() -> Result<()> {
    let h = harness();
    let user = h
        .service
        .register(" Alice@Example.com ", "Str0ng!Pass", "Alice")
        .await?;

    assert_eq!(user.email, "alice@example.com");
    assert_eq!(user.status, UserStatus::Pending);
    assert!(user.email_verified_at.is_none());
    assert_eq!(user.roles, vec!["user".to_string()]);
    Ok(())
}

#[tokio::test]
async fn weak_passwords_fail_with_the_first_violated_rule() -> Result<()> {
    let h = harness();
    let cases = [
        ("aB1!", PolicyViolation::TooShort),
        ("PASSWORD1!", PolicyViolation::MissingLowercase),
        ("password1!", PolicyViolation::MissingUppercase),
        ("Password!", PolicyViolation::MissingDigit),
        ("Password1", PolicyViolation::MissingSymbol),
    ];
    for (password, expected) in cases {
        let result = h.service.register("bob@example.com", password, "Bob").await;
        match result {
            Err(AuthError::WeakPassword(violation)) => assert_eq!(violation, expected),
            other => panic!("expected WeakPassword for {password:?}, got {other:?}"),
        }
    }
    Ok(())
}

#[tokio::test]
async fn duplicate_email_differing_only_in_case_conflicts() -> Result<()> {
    let h = harness();
    h.service
        .register("carol@example.com", "Str0ng!Pass", "Carol")
        .await?;
    let second = h
        .service
        .register("  CAROL@Example.COM ", "Str0ng!Pass", "Carol")
        .await;
    assert!(matches!(second, Err(AuthError::EmailAlreadyInUse)));
    Ok(())
}

#[tokio::test]
async fn login_rotates_sessions_and_keeps_exactly_one_active() -> Result<()> {
    let h = harness();
    h.service
        .register("alice@Example.com", "Str0ng!Pass", "Alice")
        .await?;

    let first = h
        .service
        .login("alice@example.com", "Str0ng!Pass", SessionMeta::default())
        .await?;
    let alice_id = first.user.id;
    assert_eq!(
        h.service
            .current_user(&first.session_token)
            .await?
            .map(|u| u.id),
        Some(alice_id)
    );

    let second = h
        .service
        .login("alice@example.com", "Str0ng!Pass", SessionMeta::default())
        .await?;
    assert_ne!(first.session_token, second.session_token);

    // The prior bearer token is dead immediately after the new login.
    assert!(h.service.current_user(&first.session_token).await?.is_none());
    assert_eq!(
        h.service
            .current_user(&second.session_token)
            .await?
            .map(|u| u.id),
        Some(alice_id)
    );
    assert_eq!(h.service.sessions().list_active(alice_id).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn wrong_password_and_unknown_email_fail_identically() -> Result<()> {
    let h = harness();
    h.service
        .register("dave@example.com", "Str0ng!Pass", "Dave")
        .await?;

    let wrong_password = h
        .service
        .login("dave@example.com", "Wr0ng!Pass", SessionMeta::default())
        .await;
    let unknown_email = h
        .service
        .login("nobody@example.com", "Str0ng!Pass", SessionMeta::default())
        .await;

    let (Err(wrong), Err(unknown)) = (wrong_password, unknown_email) else {
        panic!("both logins must fail");
    };
    assert!(matches!(wrong, AuthError::InvalidCredentials));
    assert!(matches!(unknown, AuthError::InvalidCredentials));
    assert_eq!(wrong.to_string(), unknown.to_string());
    Ok(())
}

#[tokio::test]
async fn suspended_and_deleted_accounts_cannot_login() -> Result<()> {
    let h = harness();
    let user = h
        .service
        .register("erin@example.com", "Str0ng!Pass", "Erin")
        .await?;

    h.service.suspend_user(user.id).await?;
    let login = h
        .service
        .login("erin@example.com", "Str0ng!Pass", SessionMeta::default())
        .await;
    assert!(matches!(login, Err(AuthError::AccountInactive)));

    h.service.delete_user(user.id).await?;
    let login = h
        .service
        .login("erin@example.com", "Str0ng!Pass", SessionMeta::default())
        .await;
    assert!(matches!(login, Err(AuthError::AccountInactive)));
    Ok(())
}

#[tokio::test]
async fn suspension_revokes_open_sessions() -> Result<()> {
    let h = harness();
    let user = h
        .service
        .register("frank@example.com", "Str0ng!Pass", "Frank")
        .await?;
    let login = h
        .service
        .login("frank@example.com", "Str0ng!Pass", SessionMeta::default())
        .await?;

    h.service.suspend_user(user.id).await?;
    assert!(h.service.current_user(&login.session_token).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn logout_revokes_and_stays_idempotent() -> Result<()> {
    let h = harness();
    h.service
        .register("grace@example.com", "Str0ng!Pass", "Grace")
        .await?;
    let login = h
        .service
        .login("grace@example.com", "Str0ng!Pass", SessionMeta::default())
        .await?;

    h.service.logout(&login.session_token).await?;
    assert!(h.service.current_user(&login.session_token).await?.is_none());

    // Repeated and garbage logouts are silent no-ops.
    h.service.logout(&login.session_token).await?;
    h.service.logout("not-a-token").await?;
    Ok(())
}

#[tokio::test]
async fn expired_session_fails_validation() -> Result<()> {
    let h = harness_with_config(
        AuthConfig::new("https://grimoire.app".to_string()).with_session_ttl_seconds(0),
    );
    h.service
        .register("heidi@example.com", "Str0ng!Pass", "Heidi")
        .await?;
    let login = h
        .service
        .login("heidi@example.com", "Str0ng!Pass", SessionMeta::default())
        .await?;
    assert!(h.service.current_user(&login.session_token).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn verification_flow_end_to_end() -> Result<()> {
    let h = harness();
    h.service
        .register("ivan@example.com", "Str0ng!Pass", "Ivan")
        .await?;

    h.service
        .request_email_verification("Ivan@Example.com")
        .await?;
    let sent = h.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "ivan@example.com");
    let token = extract_token(&sent[0])?;

    h.service.verify_email(&token).await?;
    let user = h
        .store
        .find_user_by_email("ivan@example.com")
        .await?
        .context("user exists")?;
    assert_eq!(user.status, UserStatus::Verified);
    assert!(user.email_verified_at.is_some());

    // The token is single-use.
    let reuse = h.service.verify_email(&token).await;
    assert!(matches!(reuse, Err(AuthError::InvalidOrExpiredToken)));

    // A fresh token for an already-verified account reports that state.
    h.service
        .request_email_verification("ivan@example.com")
        .await?;
    let token = extract_token(&h.mailer.sent()[1])?;
    let again = h.service.verify_email(&token).await;
    assert!(matches!(again, Err(AuthError::AlreadyVerified)));
    Ok(())
}

#[tokio::test]
async fn verification_request_for_unknown_email_has_no_observable_effect() -> Result<()> {
    let h = harness();
    h.service
        .request_email_verification("ghost@example.com")
        .await?;
    h.service.request_password_reset("ghost@example.com").await?;
    assert!(h.mailer.sent().is_empty());
    Ok(())
}

#[tokio::test]
async fn reset_flow_changes_password_and_revokes_every_session() -> Result<()> {
    let h = harness();
    h.service
        .register("judy@example.com", "Str0ng!Pass", "Judy")
        .await?;
    let login = h
        .service
        .login("judy@example.com", "Str0ng!Pass", SessionMeta::default())
        .await?;

    h.service.request_password_reset("judy@example.com").await?;
    let token = extract_token(&h.mailer.sent()[0])?;
    h.service.reset_password(&token, "N3w!Passw0rd").await?;

    // Old credentials and old sessions are both dead.
    assert!(h.service.current_user(&login.session_token).await?.is_none());
    let stale = h
        .service
        .login("judy@example.com", "Str0ng!Pass", SessionMeta::default())
        .await;
    assert!(matches!(stale, Err(AuthError::InvalidCredentials)));

    let fresh = h
        .service
        .login("judy@example.com", "N3w!Passw0rd", SessionMeta::default())
        .await?;
    assert_eq!(fresh.user.email, "judy@example.com");
    Ok(())
}

#[tokio::test]
async fn reset_with_weak_password_fails_before_burning_the_token() -> Result<()> {
    let h = harness();
    h.service
        .register("kim@example.com", "Str0ng!Pass", "Kim")
        .await?;
    h.service.request_password_reset("kim@example.com").await?;
    let token = extract_token(&h.mailer.sent()[0])?;

    let weak = h.service.reset_password(&token, "weak").await;
    assert!(matches!(weak, Err(AuthError::WeakPassword(_))));

    // The failed attempt must not have consumed the token.
    h.service.reset_password(&token, "N3w!Passw0rd").await?;
    Ok(())
}

#[tokio::test]
async fn reset_with_invalid_token_is_rejected() -> Result<()> {
    let h = harness();
    let result = h.service.reset_password("bogus", "N3w!Passw0rd").await;
    assert!(matches!(result, Err(AuthError::InvalidOrExpiredToken)));
    Ok(())
}

#[tokio::test]
async fn verification_token_cannot_reset_a_password() -> Result<()> {
    let h = harness();
    h.service
        .register("leo@example.com", "Str0ng!Pass", "Leo")
        .await?;
    h.service
        .request_email_verification("leo@example.com")
        .await?;
    let token = extract_token(&h.mailer.sent()[0])?;

    let crossed = h.service.reset_password(&token, "N3w!Passw0rd").await;
    assert!(matches!(crossed, Err(AuthError::InvalidOrExpiredToken)));
    Ok(())
}

#[tokio::test]
async fn mail_transport_failure_propagates_to_the_caller() -> Result<()> {
    let store = Arc::new(MemoryAuthStore::new());
    let hasher = PasswordHasher::with_params(8192, 1, 1).expect("valid test params");
    let service = AuthService::new(
        store,
        Arc::new(FailingEmailSender),
        AuthConfig::new("https://grimoire.app".to_string()),
    )
    .with_hasher(hasher);

    service
        .register("mary@example.com", "Str0ng!Pass", "Mary")
        .await?;
    let result = service.request_email_verification("mary@example.com").await;
    assert!(matches!(result, Err(AuthError::Internal(_))));
    Ok(())
}

#[tokio::test]
async fn login_from_pending_and_verified_both_succeed() -> Result<()> {
    let h = harness();
    h.service
        .register("nina@example.com", "Str0ng!Pass", "Nina")
        .await?;

    // Pending accounts may log in.
    let pending = h
        .service
        .login("nina@example.com", "Str0ng!Pass", SessionMeta::default())
        .await?;
    assert_eq!(pending.user.status, UserStatus::Pending);

    h.service
        .request_email_verification("nina@example.com")
        .await?;
    let token = extract_token(&h.mailer.sent()[0])?;
    h.service.verify_email(&token).await?;

    let verified = h
        .service
        .login("nina@example.com", "Str0ng!Pass", SessionMeta::default())
        .await?;
    assert_eq!(verified.user.status, UserStatus::Verified);
    Ok(())
}
