//! Opaque bearer token generation and digesting.
//!
//! Raw tokens are the only credential ever shown to a client; the SHA-256
//! digest is the only form ever persisted. A database compromise therefore
//! does not yield replayable tokens.

use anyhow::{Context, Result};
use base64::Engine;
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

const TOKEN_BYTES: usize = 32;

/// Generate a raw token with 256 bits of entropy, URL-safe base64 encoded.
pub fn generate_token() -> Result<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate token")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Digest a raw token for storage and lookup.
#[must_use]
pub fn digest_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}
