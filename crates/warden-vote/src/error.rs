//! Error types for the vote layer.

use warden_protocol::ConnectionId;

/// Errors returned to the connection that tried to vote.
///
/// None of these affect other votes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VoteError {
    /// The connection is not allowed to vote right now (not bound to a
    /// living player, observing, or below `info`).
    #[error("{0} is not allowed to vote")]
    Ineligible(ConnectionId),

    /// No active vote has this number.
    #[error("No such vote ({0}).")]
    NotFound(u32),
}
