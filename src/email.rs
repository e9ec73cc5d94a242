//! Email delivery abstraction and message builders for auth flows.
//!
//! The core hands a fully rendered message to an [`EmailSender`] and awaits
//! the result so delivery failures propagate to the caller of the request
//! flows. The default sender for local dev is [`LogEmailSender`], which logs
//! and returns `Ok(())`.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

/// A rendered message ready for delivery.
#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// Email delivery abstraction. The sender decides how to deliver (SMTP,
/// API, etc.) and returns `Ok`/`Err`.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to = %message.to,
            subject = %message.subject,
            "email send stub"
        );
        Ok(())
    }
}

/// Build the frontend verification link included in outbound emails.
fn build_verify_url(frontend_base_url: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/verify-email?token={token}")
}

fn build_reset_url(frontend_base_url: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/reset-password?token={token}")
}

/// Verification message carrying the raw token link. The link expires after
/// the verification TTL.
#[must_use]
pub fn verification_message(
    frontend_base_url: &str,
    sender_name: &str,
    to: &str,
    token: &str,
) -> EmailMessage {
    let url = build_verify_url(frontend_base_url, token);
    EmailMessage {
        to: to.to_string(),
        subject: format!("Verify your {sender_name} account"),
        html_body: format!(
            "<p>Please verify your email address by opening the link below.</p>\
             <p><a href=\"{url}\">{url}</a></p>\
             <p>This link expires in 24 hours. If you did not create an account, \
             you can ignore this email.</p>"
        ),
    }
}

/// Password reset message carrying the raw token link.
#[must_use]
pub fn reset_message(
    frontend_base_url: &str,
    sender_name: &str,
    to: &str,
    token: &str,
) -> EmailMessage {
    let url = build_reset_url(frontend_base_url, token);
    EmailMessage {
        to: to.to_string(),
        subject: format!("Reset your {sender_name} password"),
        html_body: format!(
            "<p>We received a request to reset your password. Open the link \
             below to continue.</p>\
             <p><a href=\"{url}\">{url}</a></p>\
             <p>This link expires in 1 hour. If you did not request a reset, \
             your password remains unchanged.</p>"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_url_trims_trailing_slash() {
        let message = verification_message("https://grimoire.app/", "GRIMOIRE", "a@b.c", "token");
        assert!(
            message
                .html_body
                .contains("https://grimoire.app/verify-email?token=token")
        );
        assert_eq!(message.to, "a@b.c");
        assert_eq!(message.subject, "Verify your GRIMOIRE account");
    }

    #[test]
    fn reset_message_links_to_reset_page() {
        let message = reset_message("https://grimoire.app", "GRIMOIRE", "a@b.c", "t0k3n");
        assert!(
            message
                .html_body
                .contains("https://grimoire.app/reset-password?token=t0k3n")
        );
        assert_eq!(message.subject, "Reset your GRIMOIRE password");
    }

    #[tokio::test]
    async fn log_sender_accepts_messages() -> Result<()> {
        let sender = LogEmailSender;
        let message = verification_message("https://grimoire.app", "GRIMOIRE", "a@b.c", "token");
        sender.send(&message).await
    }
}
