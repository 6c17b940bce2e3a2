//! # Warden
//!
//! Session authority for turn-based multiplayer game servers.
//!
//! Warden decides who is connected, who they are, which player each
//! connection controls or observes, how much each may do, and which
//! privileged commands are put to a vote. The game itself plugs in through
//! two traits: [`GameHost`] (phase, catch-up, player hooks) and
//! [`CommandExecutor`] (every command Warden does not run itself).
//!
//! ```text
//! warden-transport ─▶ handler ─▶ ServerEvent ─▶ Authority ─┬─ warden-auth    (login, passwords)
//!                                                          ├─ warden-session (bindings, levels)
//!                                                          └─ warden-vote    (votes)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use warden::prelude::*;
//!
//! struct Lobby;
//!
//! impl GameHost for Lobby {
//!     fn phase(&self) -> GamePhase {
//!         GamePhase::PreGame
//!     }
//! }
//!
//! impl CommandExecutor for Lobby {
//!     fn execute(&mut self, _caller: Option<ConnectionId>, line: &str) -> Result<String, String> {
//!         Ok(format!("ran '{line}'"))
//!     }
//! }
//!
//! # async fn run() -> Result<(), WardenError> {
//! let server = WardenServerBuilder::new()
//!     .bind("0.0.0.0:5556")
//!     .build(Lobby)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod authority;
mod builtin;
mod command;
mod config;
mod error;
mod handler;
mod logging;
mod notify;
mod server;

pub use authority::Authority;
pub use command::{split_line, CommandError, CommandExecutor};
pub use config::{ServerConfig, DEFAULT_CAPABILITY};
pub use error::WardenError;
pub use logging::setup_logging;
pub use notify::{Broadcast, Notifier};
pub use server::{ServerHandle, WardenServer, WardenServerBuilder};

pub use warden_auth as auth;
pub use warden_protocol as protocol;
pub use warden_session as session;
pub use warden_transport as transport;
pub use warden_vote as vote;

/// Convenience re-exports for building a server.
pub mod prelude {
    pub use crate::{
        Authority, Broadcast, CommandError, CommandExecutor, Notifier, ServerConfig,
        ServerHandle, WardenError, WardenServer, WardenServerBuilder,
    };
    pub use warden_auth::{AuthConfig, CredentialStore, MemoryStore};
    pub use warden_protocol::{
        AccessLevel, Ballot, ClientMessage, ConnectionId, Envelope, GamePhase, Notification,
        PlayerId, ServerMessage,
    };
    pub use warden_session::{
        CommandSpec, Connection, GameHost, Player, SessionConfig, Sessions,
    };
}
