//! The per-connection authentication handshake.
//!
//! ```text
//!                    ┌──── guest name ─────────────────────────────┐
//!                    │                                             ▼
//! NotEstablished ──begin──┬── found ──▶ AwaitingOldPassword ──ok──▶ Established
//!                         │                 │  ▲                    ▲
//!                         │           wrong │  │ tick, tries < max  │
//!                         │                 ▼  │                    │
//!                         │               Failed ──tick, tries ≥ max──▶ rejected
//!                         │
//!                         └── not found ──▶ AwaitingNewPassword ──policy ok──┘
//! ```
//!
//! Nothing here sleeps. A wrong password only records a deadline; the
//! server's periodic [`Handshake::tick`] notices when it has passed. The
//! functions take `now` explicitly so tests can move time by hand.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use warden_protocol::PromptKind;

use crate::guest::{is_guest_name, unique_guest_name};
use crate::password::{verify_password, PasswordPolicy};
use crate::store::{CredentialStore, Lookup};
use crate::AuthRejected;

// ---------------------------------------------------------------------------
// AuthConfig
// ---------------------------------------------------------------------------

/// Handshake settings. Loaded from the `[auth]` table of the server config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// With authentication off, every valid login is established at once.
    pub enabled: bool,
    pub allow_guests: bool,
    /// Whether unknown usernames may register by choosing a password.
    pub allow_new_users: bool,
    /// Wrong passwords tolerated before the connection is dropped.
    pub max_tries: u32,
    /// How long a connection may sit at a password prompt.
    pub max_wait_secs: u64,
    /// Delay before re-prompting after a wrong password, indexed by the
    /// number of failures so far. The last entry repeats.
    pub fail_backoff_secs: Vec<u64>,
    pub password: PasswordPolicy,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_guests: true,
            allow_new_users: true,
            max_tries: 3,
            max_wait_secs: 300,
            fail_backoff_secs: vec![1, 1, 2, 3],
            password: PasswordPolicy::default(),
        }
    }
}

impl AuthConfig {
    fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }

    fn backoff(&self, tries: u32) -> Duration {
        let secs = self
            .fail_backoff_secs
            .get(tries as usize)
            .or(self.fail_backoff_secs.last())
            .copied()
            .unwrap_or(1);
        Duration::from_secs(secs)
    }
}

// ---------------------------------------------------------------------------
// AuthSession
// ---------------------------------------------------------------------------

/// Where a connection is in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthStatus {
    #[default]
    NotEstablished,
    AwaitingOldPassword,
    AwaitingNewPassword,
    /// A wrong password was given; waiting for the retry deadline.
    Failed,
    Established,
}

/// Handshake state embedded in every connection.
#[derive(Debug, Clone, Default)]
pub struct AuthSession {
    status: AuthStatus,
    tries: u32,
    /// Retry time while `Failed`, expiry time while awaiting a password.
    deadline: Option<Instant>,
    stored_hash: Option<String>,
}

impl AuthSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> AuthStatus {
        self.status
    }

    /// Failed attempts so far.
    pub fn tries(&self) -> u32 {
        self.tries
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// `true` while the handshake still needs the periodic tick.
    pub fn needs_tick(&self) -> bool {
        matches!(
            self.status,
            AuthStatus::AwaitingOldPassword
                | AuthStatus::AwaitingNewPassword
                | AuthStatus::Failed
        )
    }

    /// Marks the handshake complete without asking for a password.
    pub fn mark_established(&mut self) {
        self.status = AuthStatus::Established;
        self.deadline = None;
        self.stored_hash = None;
    }

    fn await_password(&mut self, status: AuthStatus, deadline: Instant) {
        self.status = status;
        self.deadline = Some(deadline);
    }
}

// ---------------------------------------------------------------------------
// AuthOutcome
// ---------------------------------------------------------------------------

/// What the caller must do after a handshake step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Nothing to send.
    Pending,
    /// Send a password prompt.
    Prompt { kind: PromptKind, message: String },
    /// Establish the connection under `username`, sending `notice` first
    /// if there is one.
    Establish {
        username: String,
        notice: Option<String>,
    },
    /// Refuse and close.
    Reject(AuthRejected),
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

/// Drives [`AuthSession`]s against a credential store.
pub struct Handshake<S> {
    config: AuthConfig,
    store: S,
}

impl<S: CredentialStore> Handshake<S> {
    pub fn new(config: AuthConfig, store: S) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Starts the handshake for a validated username.
    ///
    /// `is_taken` reports whether another live connection already uses a
    /// name; it is only consulted for guest names.
    pub fn begin(
        &mut self,
        session: &mut AuthSession,
        username: &str,
        is_taken: impl Fn(&str) -> bool,
        now: Instant,
    ) -> AuthOutcome {
        if is_guest_name(username) {
            if !self.config.allow_guests {
                return AuthOutcome::Reject(AuthRejected::GuestsNotAllowed);
            }
            let name = unique_guest_name(username, is_taken);
            let notice = (name != username).then(|| {
                format!(
                    "Warning: the guest name '{username}' has been taken, renaming to user '{name}'."
                )
            });
            session.mark_established();
            return AuthOutcome::Establish {
                username: name,
                notice,
            };
        }

        match self.store.lookup(username) {
            Err(e) => {
                if !self.config.allow_guests {
                    tracing::error!(username, error = %e, "credential store unavailable");
                    return AuthOutcome::Reject(AuthRejected::StoreUnavailable);
                }
                let name = unique_guest_name(username, is_taken);
                tracing::error!(
                    username,
                    guest = %name,
                    error = %e,
                    "credential store unavailable, falling back to guest login"
                );
                session.mark_established();
                AuthOutcome::Establish {
                    notice: Some(format!(
                        "There was an error reading the user database, logging in as guest connection '{name}'."
                    )),
                    username: name,
                }
            }
            Ok(Lookup::Found { hash }) => {
                session.stored_hash = Some(hash);
                session.await_password(
                    AuthStatus::AwaitingOldPassword,
                    now + self.config.max_wait(),
                );
                AuthOutcome::Prompt {
                    kind: PromptKind::LoginFirst,
                    message: format!("Enter password for {username}:"),
                }
            }
            Ok(Lookup::NotFound) => {
                if !self.config.allow_new_users {
                    return AuthOutcome::Reject(AuthRejected::NotRegistered);
                }
                session.await_password(
                    AuthStatus::AwaitingNewPassword,
                    now + self.config.max_wait(),
                );
                AuthOutcome::Prompt {
                    kind: PromptKind::NewUserFirst,
                    message: "Enter a new password (and remember it).".into(),
                }
            }
        }
    }

    /// Handles a password reply. Replies nobody asked for are ignored.
    pub fn receive_password(
        &mut self,
        session: &mut AuthSession,
        username: &str,
        password: &str,
        now: Instant,
    ) -> AuthOutcome {
        match session.status {
            AuthStatus::AwaitingNewPassword => {
                if let Err(violation) = self.config.password.check(password) {
                    session.tries += 1;
                    if session.tries > self.config.max_tries {
                        return AuthOutcome::Reject(AuthRejected::TooManyTries);
                    }
                    return AuthOutcome::Prompt {
                        kind: PromptKind::NewUserRetry,
                        message: violation.to_string(),
                    };
                }

                let notice = match self.store.save(username, password) {
                    Ok(()) => None,
                    Err(e) => {
                        tracing::error!(username, error = %e, "could not save new account");
                        Some(
                            "Warning: There was an error in saving to the database. \
                             Continuing, but your stats will not be saved."
                                .to_string(),
                        )
                    }
                };
                session.mark_established();
                AuthOutcome::Establish {
                    username: username.to_string(),
                    notice,
                }
            }
            AuthStatus::AwaitingOldPassword => {
                let matches = session
                    .stored_hash
                    .as_deref()
                    .is_some_and(|hash| verify_password(password, hash));
                if matches {
                    session.mark_established();
                    return AuthOutcome::Establish {
                        username: username.to_string(),
                        notice: None,
                    };
                }

                session.tries += 1;
                session.status = AuthStatus::Failed;
                session.deadline = Some(now + self.config.backoff(session.tries));
                tracing::info!(username, tries = session.tries, "wrong password");
                AuthOutcome::Pending
            }
            _ => {
                tracing::debug!(username, "ignoring unrequested password");
                AuthOutcome::Pending
            }
        }
    }

    /// Periodic check: retries after a backoff, expiry of idle prompts.
    pub fn tick(&self, session: &mut AuthSession, now: Instant) -> AuthOutcome {
        let Some(deadline) = session.deadline else {
            return AuthOutcome::Pending;
        };
        if now < deadline {
            return AuthOutcome::Pending;
        }

        match session.status {
            AuthStatus::Failed if session.tries >= self.config.max_tries => {
                AuthOutcome::Reject(AuthRejected::TooManyTries)
            }
            AuthStatus::Failed => {
                session.await_password(
                    AuthStatus::AwaitingOldPassword,
                    now + self.config.max_wait(),
                );
                AuthOutcome::Prompt {
                    kind: PromptKind::LoginRetry,
                    message: "Your password is incorrect. Try again.".into(),
                }
            }
            AuthStatus::AwaitingOldPassword | AuthStatus::AwaitingNewPassword => {
                AuthOutcome::Reject(AuthRejected::TimedOut)
            }
            AuthStatus::NotEstablished | AuthStatus::Established => {
                AuthOutcome::Pending
            }
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
