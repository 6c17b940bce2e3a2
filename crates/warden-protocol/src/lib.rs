//! Wire protocol for Warden.
//!
//! - **Types** ([`ConnectionId`], [`PlayerId`], [`AccessLevel`], [`Ballot`],
//!   [`GamePhase`]) shared by every other crate.
//! - **Messages** ([`ClientMessage`], [`ServerMessage`], [`Notification`])
//!   wrapped in an [`Envelope`].
//! - **Codec** ([`Codec`], [`JsonCodec`]) for the byte representation.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope<ClientMessage>) → Authority
//! ```

mod codec;
mod error;
mod message;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use message::{
    ClientMessage, Envelope, Notification, PromptKind, ServerMessage,
};
pub use types::{
    AccessLevel, Ballot, ConnectionId, GamePhase, PlayerId, ANON_USER_NAME,
    MAX_LEN_CAPSTR, MAX_LEN_COMMAND, MAX_LEN_NAME, MAX_LEN_PASSWORD,
};
