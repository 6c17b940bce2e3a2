//! Authentication for Warden.
//!
//! Turns a raw connection's login request into a trusted username:
//!
//! 1. **Login checks** ([`check_capabilities`], [`normalize_username`]):
//!    things that can be refused before any password is involved.
//! 2. **Handshake** ([`Handshake`], [`AuthSession`]): guest fallback,
//!    new-user registration, password checks with throttled retries.
//! 3. **Storage** ([`CredentialStore`], [`MemoryStore`]): where accounts
//!    live, kept behind a trait.
//!
//! Every refusal is an [`AuthRejected`] whose text goes to the user.

mod error;
mod guest;
mod handshake;
mod login;
mod password;
mod store;

pub use error::{AuthRejected, StoreError};
pub use guest::{is_guest_name, unique_guest_name, GUEST_NAME};
pub use handshake::{AuthConfig, AuthOutcome, AuthSession, AuthStatus, Handshake};
pub use login::{check_capabilities, has_capabilities, is_valid_username, normalize_username};
pub use password::{hash_password, verify_password, PasswordPolicy, PolicyViolation};
pub use store::{CredentialStore, Lookup, MemoryStore};
