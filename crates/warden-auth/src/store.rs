//! The credential store seam.
//!
//! Warden does not know where accounts live. A [`CredentialStore`] answers
//! one question per handshake step and must answer it synchronously: a
//! store backed by a remote database has to apply its own timeout and
//! report failures as [`StoreError`] instead of blocking the server loop.

use std::collections::HashMap;

use crate::password::hash_password;
use crate::StoreError;

/// Result of a successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// The account exists; `hash` is the stored password hash.
    Found { hash: String },
    /// No account by that name.
    NotFound,
}

/// Account storage used by the handshake.
///
/// # Example
///
/// ```rust
/// use warden_auth::{CredentialStore, Lookup, StoreError};
///
/// /// A store that is always down.
/// struct Offline;
///
/// impl CredentialStore for Offline {
///     fn lookup(&self, _username: &str) -> Result<Lookup, StoreError> {
///         Err(StoreError::Unavailable("maintenance".into()))
///     }
///
///     fn save(&mut self, _username: &str, _password: &str) -> Result<(), StoreError> {
///         Err(StoreError::Unavailable("maintenance".into()))
///     }
/// }
/// ```
pub trait CredentialStore: Send + 'static {
    /// Looks up an account by username.
    fn lookup(&self, username: &str) -> Result<Lookup, StoreError>;

    /// Creates or replaces an account. Receives the plain password; the
    /// store decides how to hash it.
    fn save(&mut self, username: &str, password: &str) -> Result<(), StoreError>;
}

impl<S: CredentialStore + ?Sized> CredentialStore for Box<S> {
    fn lookup(&self, username: &str) -> Result<Lookup, StoreError> {
        (**self).lookup(username)
    }

    fn save(&mut self, username: &str, password: &str) -> Result<(), StoreError> {
        (**self).save(username, password)
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-process account table with argon2 hashes.
///
/// Usernames are matched without regard to ASCII case, the same way
/// duplicate logins are detected.
#[derive(Debug, Default)]
pub struct MemoryStore {
    accounts: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored accounts.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl CredentialStore for MemoryStore {
    fn lookup(&self, username: &str) -> Result<Lookup, StoreError> {
        Ok(match self.accounts.get(&username.to_ascii_lowercase()) {
            Some(hash) => Lookup::Found { hash: hash.clone() },
            None => Lookup::NotFound,
        })
    }

    fn save(&mut self, username: &str, password: &str) -> Result<(), StoreError> {
        let hash = hash_password(password)?;
        self.accounts.insert(username.to_ascii_lowercase(), hash);
        tracing::debug!(username, "account saved");
        Ok(())
    }
}
