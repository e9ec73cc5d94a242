//! # Grimoire Auth (Credential & Session Core)
//!
//! `grimoire-auth` is the credential and session management core of the
//! GRIMOIRE worldbuilding backend. It owns password hashing policy, secure
//! token issuance and validation, session rotation, and time-bounded
//! one-time tokens for email verification and password reset.
//!
//! ## Boundaries
//!
//! The HTTP route layer, the storage engine, and the mail transport are
//! external collaborators:
//!
//! - Routes call [`service::AuthService`] with already shape-validated
//!   strings and consume typed results and [`error::AuthError`] values.
//! - Storage is reached through the [`store::AuthStore`] trait;
//!   [`store::PgAuthStore`] is the production implementation and
//!   [`store::MemoryAuthStore`] backs tests and local development.
//! - Mail goes through [`email::EmailSender`] with a fully rendered message.
//!
//! ## Token Handling
//!
//! Raw bearer tokens (session and one-time) are only ever returned to the
//! client; the database stores SHA-256 digests. Login failures never
//! distinguish an unknown account from a wrong password, verification and
//! reset requests for unknown emails report success, and one-time token
//! redemption failures never distinguish expired, consumed, and unknown.
//!
//! ## Session Rotation
//!
//! Every successful login revokes the user's prior sessions before opening
//! exactly one new one, and a completed password reset revokes every
//! session the user holds.

pub mod config;
pub mod email;
pub mod error;
pub mod models;
pub mod one_time;
pub mod password;
pub mod service;
pub mod sessions;
pub mod store;
pub mod token;

pub use config::AuthConfig;
pub use error::AuthError;
pub use models::{PublicUserView, SessionMeta, SessionView, TokenPurpose, UserStatus};
pub use service::{AuthService, LoginOutcome};
