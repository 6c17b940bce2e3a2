//! Error types for the session layer.

use warden_protocol::{ConnectionId, PlayerId};

/// Binding requests that cannot be carried out.
///
/// Returned to the caller with the connection left exactly as it was; no
/// variant forces a disconnect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindingError {
    /// No free player and the player ceiling has been reached.
    #[error("no free player slot available")]
    NoSlotAvailable,

    #[error("player {0} not found")]
    PlayerNotFound(PlayerId),

    /// Another connection already controls the player.
    #[error("player {player} is already controlled by {by}")]
    PlayerControlled { player: PlayerId, by: ConnectionId },

    #[error("connection {0} not found")]
    UnknownConnection(ConnectionId),

    /// The connection must be detached before it can be bound again.
    #[error("connection is already bound")]
    AlreadyBound,

    #[error("player {0} cannot be delegated to")]
    DelegationTargetUnavailable(PlayerId),
}

/// Failed lookups in a [`CommandCatalog`](crate::CommandCatalog).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("Unknown command '{0}'.")]
    Unknown(String),

    #[error("Ambiguous command '{0}'.")]
    Ambiguous(String),
}
