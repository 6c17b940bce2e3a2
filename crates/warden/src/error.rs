//! Unified error type for Warden.

use warden_auth::StoreError;
use warden_protocol::ProtocolError;
use warden_session::BindingError;
use warden_transport::TransportError;
use warden_vote::VoteError;

use crate::CommandError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates the `From` impl, so
/// `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error(transparent)]
    Vote(#[from] VoteError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Command(#[from] CommandError),

    /// The config file is not valid TOML for [`ServerConfig`](crate::ServerConfig).
    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("could not write config: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The server actor is gone; nothing can be delivered to it.
    #[error("server is not running")]
    ServerStopped,
}
