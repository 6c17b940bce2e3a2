//! Password hashing and the password policy for new accounts.

use std::fmt;

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use serde::{Deserialize, Serialize};

use crate::StoreError;

fn salt() -> Result<SaltString, StoreError> {
    use rand::Rng;
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    SaltString::encode_b64(&bytes).map_err(|e| StoreError::Hash(e.to_string()))
}

/// Hashes a password into an argon2 PHC string.
pub fn hash_password(password: &str) -> Result<String, StoreError> {
    Argon2::default()
        .hash_password(password.as_bytes(), &salt()?)
        .map(|h| h.to_string())
        .map_err(|e| StoreError::Hash(e.to_string()))
}

/// Checks `password` against a PHC string. A malformed hash never matches.
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// PasswordPolicy
// ---------------------------------------------------------------------------

/// Rules a newly chosen password must satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub min_uppercase: usize,
    pub min_digits: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 6,
            min_uppercase: 0,
            min_digits: 0,
        }
    }
}

/// Why a password was refused. `Display` is the re-prompt text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyViolation {
    TooShort { min_length: usize },
    Composition(PasswordPolicy),
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyViolation::TooShort { min_length } => write!(
                f,
                "Your password is too short, the minimum length is {min_length}. Try again."
            ),
            PolicyViolation::Composition(p) => write!(
                f,
                "The password must have at least {} capital letters, {} numbers, \
                 and be at minimum {} [printable] characters long. Try again.",
                p.min_uppercase, p.min_digits, p.min_length
            ),
        }
    }
}

impl PasswordPolicy {
    /// Checks length first, then character composition and ASCII-ness.
    pub fn check(&self, password: &str) -> Result<(), PolicyViolation> {
        if password.len() < self.min_length {
            return Err(PolicyViolation::TooShort {
                min_length: self.min_length,
            });
        }

        let uppercase = password.chars().filter(char::is_ascii_uppercase).count();
        let digits = password.chars().filter(char::is_ascii_digit).count();

        if uppercase < self.min_uppercase
            || digits < self.min_digits
            || !password.is_ascii()
        {
            return Err(PolicyViolation::Composition(self.clone()));
        }
        Ok(())
    }
}
