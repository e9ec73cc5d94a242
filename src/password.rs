//! Password hashing (Argon2id) and strength policy.

use argon2::{
    Argon2, Params,
    password_hash::{
        PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString, rand_core::OsRng,
    },
};
use thiserror::Error;

// Cost parameters bound single-attempt latency while resisting offline and
// GPU attack: 64 MiB memory, 3 passes, 1 lane.
const MEMORY_COST_KIB: u32 = 64 * 1024;
const TIME_COST: u32 = 3;
const LANES: u32 = 1;

// Fixed punctuation set accepted as password symbols.
const SYMBOL_SET: &str = r#"!@#$%^&*()_+-=[]{};':"\|,.<>/?"#;

const MIN_PASSWORD_CHARS: usize = 8;
const MAX_PASSWORD_CHARS: usize = 128;

/// Internal hashing failure. Never raised for a valid input/mismatch pair.
#[derive(Debug, Error)]
pub enum HashingError {
    #[error("failed to hash password: {0}")]
    Hash(String),

    #[error("invalid password digest format")]
    InvalidDigest,

    #[error("failed to verify password: {0}")]
    Verify(String),
}

/// First policy rule a password fails, in checking order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("Password must be at least 8 characters long")]
    TooShort,

    #[error("Password must be less than 128 characters")]
    TooLong,

    #[error("Password must contain at least one lowercase letter")]
    MissingLowercase,

    #[error("Password must contain at least one uppercase letter")]
    MissingUppercase,

    #[error("Password must contain at least one number")]
    MissingDigit,

    #[error("Password must contain at least one special character")]
    MissingSymbol,
}

/// Argon2id hasher with the salt and parameters embedded in the digest, so
/// verification is self-describing.
#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl PasswordHasher {
    #[must_use]
    pub fn new() -> Self {
        // The default parameters are always valid; fall back to the crate
        // defaults rather than panic if they were ever rejected.
        Self::with_params(MEMORY_COST_KIB, TIME_COST, LANES).unwrap_or_else(|_| Self {
            argon2: Argon2::default(),
        })
    }

    /// Build a hasher with explicit cost parameters. Tests use cheap settings
    /// to keep the suite fast.
    pub fn with_params(memory_kib: u32, time_cost: u32, lanes: u32) -> Result<Self, HashingError> {
        let params = Params::new(memory_kib, time_cost, lanes, None)
            .map_err(|err| HashingError::Hash(err.to_string()))?;
        Ok(Self {
            argon2: Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params),
        })
    }

    /// Hash a plaintext password into a PHC string safe to persist.
    pub fn hash(&self, plaintext: &str) -> Result<String, HashingError> {
        let salt = SaltString::generate(&mut OsRng);
        let digest = self
            .argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|err| HashingError::Hash(err.to_string()))?;
        Ok(digest.to_string())
    }

    /// Verify a plaintext password against a stored digest.
    ///
    /// A mismatch is `Ok(false)`; only a malformed digest is an error.
    pub fn verify(&self, digest: &str, plaintext: &str) -> Result<bool, HashingError> {
        let parsed = PasswordHash::new(digest).map_err(|_| HashingError::InvalidDigest)?;
        match self.argon2.verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(err) => Err(HashingError::Verify(err.to_string())),
        }
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Password strength rules, checked in a fixed order; the first failing
/// rule is reported and violations are never aggregated.
pub struct PasswordPolicy;

impl PasswordPolicy {
    /// Validate a plaintext password against all five rules.
    ///
    /// # Errors
    /// Returns the first [`PolicyViolation`] the password fails.
    pub fn validate(password: &str) -> Result<(), PolicyViolation> {
        let chars = password.chars().count();
        if chars < MIN_PASSWORD_CHARS {
            return Err(PolicyViolation::TooShort);
        }
        if chars > MAX_PASSWORD_CHARS {
            return Err(PolicyViolation::TooLong);
        }
        if !password.chars().any(|c| c.is_ascii_lowercase()) {
            return Err(PolicyViolation::MissingLowercase);
        }
        if !password.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(PolicyViolation::MissingUppercase);
        }
        if !password.chars().any(|c| c.is_ascii_digit()) {
            return Err(PolicyViolation::MissingDigit);
        }
        if !password.chars().any(|c| SYMBOL_SET.contains(c)) {
            return Err(PolicyViolation::MissingSymbol);
        }
        Ok(())
    }
}
