//! Error types for the protocol layer.
//!
//! Every Warden crate owns one error enum. A `ProtocolError` always means
//! the bytes or the decoded fields were wrong; it never says anything about
//! sockets, players, or votes.

/// Errors that can occur while encoding, decoding, or validating messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, a missing field, or an
    /// unknown message `type`.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A string field exceeds its wire limit.
    ///
    /// Usernames, passwords, and command lines are bounded so that one
    /// client cannot make the server hold arbitrarily large strings.
    #[error("field `{field}` is {len} bytes, limit is {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// A textual enum value (access level, ballot) was not recognized.
    #[error("unknown {kind} `{value}`")]
    UnknownVariant { kind: &'static str, value: String },

    /// The message decoded fine but breaks a protocol rule.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
