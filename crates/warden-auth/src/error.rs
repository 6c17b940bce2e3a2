//! Error types for the authentication layer.

/// Reasons a connection is refused before it becomes a trusted participant.
///
/// The `Display` text is what the user sees in the final join refusal, so
/// it is phrased for people, not for logs. Every variant ends the
/// connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthRejected {
    #[error("The client is missing a capability that this server needs.")]
    ClientMissingCapability,

    #[error("The server is missing a capability that the client needs.")]
    ServerMissingCapability,

    #[error("Invalid username '{0}'")]
    InvalidUsername(String),

    #[error("'{0}' already connected.")]
    DuplicateLogin(String),

    #[error("Guests are not allowed on this server. Sorry.")]
    GuestsNotAllowed,

    #[error(
        "There was an error reading the user database and guest logins are not allowed. Sorry"
    )]
    StoreUnavailable,

    #[error("This server allows only preregistered users. Sorry.")]
    NotRegistered,

    #[error("Sorry, too many wrong tries...")]
    TooManyTries,

    #[error("Sorry, your connection timed out...")]
    TimedOut,
}

/// Failures of a [`CredentialStore`](crate::CredentialStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached or read.
    #[error("credential store unavailable: {0}")]
    Unavailable(String),

    /// Hashing a new password failed.
    #[error("password hashing failed: {0}")]
    Hash(String),
}
