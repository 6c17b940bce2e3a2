//! Messages exchanged between clients and the Warden server.
//!
//! Both directions use internally tagged JSON (`{"type": "Login", ...}`)
//! and travel inside an [`Envelope`] that carries a sequence number and a
//! server-relative timestamp.
//!
//! ```text
//! client                                   server
//!   │── Login {username, capability} ──────▶│
//!   │◀───────── PasswordPrompt {kind, ..} ───│   (only with auth enabled)
//!   │── Password {password} ───────────────▶│
//!   │◀──── JoinReply {accepted: true, ..} ───│
//!   │── Command {line: "vote yes"} ────────▶│
//!   │◀──────── Event {notification} ─────────│
//! ```

use serde::{Deserialize, Serialize};

use crate::types::{
    AccessLevel, Ballot, ConnectionId, PlayerId, MAX_LEN_CAPSTR,
    MAX_LEN_COMMAND, MAX_LEN_NAME, MAX_LEN_PASSWORD,
};
use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Wrapper around every message on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Per-direction sequence number, starting at 0.
    pub seq: u64,
    /// Milliseconds since the sender started.
    pub timestamp: u64,
    pub payload: T,
}

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// A message sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// First message of every connection: the requested username and the
    /// client's capability string.
    Login {
        username: String,
        #[serde(default)]
        capability: String,
    },

    /// Answer to a [`ServerMessage::PasswordPrompt`].
    Password { password: String },

    /// A server command line such as `vote yes 3` or `/take P-2`.
    Command { line: String },

    /// The client is leaving.
    Disconnect,
}

impl ClientMessage {
    /// Rejects messages whose string fields exceed the wire limits.
    ///
    /// # Errors
    /// Returns [`ProtocolError::FieldTooLong`] naming the first offending
    /// field.
    pub fn check_bounds(&self) -> Result<(), ProtocolError> {
        match self {
            ClientMessage::Login {
                username,
                capability,
            } => {
                bounded("username", username, MAX_LEN_NAME - 1)?;
                bounded("capability", capability, MAX_LEN_CAPSTR)
            }
            ClientMessage::Password { password } => {
                bounded("password", password, MAX_LEN_PASSWORD)
            }
            ClientMessage::Command { line } => {
                bounded("line", line, MAX_LEN_COMMAND)
            }
            ClientMessage::Disconnect => Ok(()),
        }
    }
}

fn bounded(
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<(), ProtocolError> {
    if value.len() > max {
        return Err(ProtocolError::FieldTooLong {
            field,
            len: value.len(),
            max,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// Which password the server is asking for, and whether it is a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PromptKind {
    LoginFirst,
    LoginRetry,
    NewUserFirst,
    NewUserRetry,
}

/// A message sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Final answer to a login. A refusal is always followed by the
    /// server closing the connection; `conn_id` is only set on success.
    JoinReply {
        accepted: bool,
        message: String,
        conn_id: Option<ConnectionId>,
        capability: String,
    },

    /// Request for a password.
    PasswordPrompt { kind: PromptKind, message: String },

    /// Free-form text for the user (command replies, warnings).
    Notice { text: String },

    /// A structured state change.
    Event { notification: Notification },

    /// The receiving connection's current access level changed.
    AccessLevel { level: AccessLevel },
}

impl ServerMessage {
    /// Shorthand for a [`ServerMessage::Notice`].
    pub fn notice(text: impl Into<String>) -> Self {
        ServerMessage::Notice { text: text.into() }
    }
}

/// State changes the authority layer reports to connected users.
///
/// These are deliberately data, not prose: clients decide how to phrase
/// them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    Joined {
        conn_id: ConnectionId,
        username: String,
        addr: String,
    },
    Left {
        conn_id: ConnectionId,
        username: String,
    },
    Rejected {
        username: String,
        reason: String,
    },
    Attached {
        conn_id: ConnectionId,
        username: String,
        player: Option<PlayerId>,
        observer: bool,
    },
    Detached {
        conn_id: ConnectionId,
        username: String,
        player: Option<PlayerId>,
    },
    AccessChanged {
        conn_id: ConnectionId,
        username: String,
        level: AccessLevel,
    },
    VoteStarted {
        number: u32,
        caller: String,
        command: String,
    },
    BallotCast {
        number: u32,
        voter: String,
        ballot: Ballot,
        yes: usize,
        no: usize,
        abstain: usize,
        voters: usize,
    },
    VoteResolved {
        number: u32,
        command: String,
        passed: bool,
        yes: usize,
        no: usize,
        abstain: usize,
        not_voted: usize,
    },
    VoteCancelled {
        number: u32,
        command: String,
    },
}

// =========================================================================
// Tests
// =========================================================================
