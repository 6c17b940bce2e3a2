//! Session authority for Warden: who is connected, who plays whom, and
//! who may do what.
//!
//! 1. **Registry** ([`ConnectionRegistry`]): every live connection with
//!    its address, capability string, and username.
//! 2. **Binding** ([`Sessions::attach`], [`Sessions::detach`]): connections
//!    controlling or observing players from the [`Roster`].
//! 3. **Delegation** ([`Sessions::delegate_take`],
//!    [`Sessions::delegate_restore`]): temporary control of another
//!    player with a guaranteed way back.
//! 4. **Access control** ([`CommandCatalog`], [`Sessions::is_allowed`]):
//!    command levels against per-connection privileges.
//!
//! # How it fits in the stack
//!
//! ```text
//! Authority (above)  ← drives these operations per packet and per tick
//!     ↕
//! Session layer (this crate)  ← connections, players, bindings, levels
//!     ↕
//! Auth + Protocol (below)  ← handshake state, ids, access levels
//! ```
//!
//! The game itself stays behind the [`GameHost`] trait.

mod access;
mod binder;
mod config;
mod connection;
mod delegation;
mod error;
mod host;
mod player;
mod registry;

pub use access::{CommandCatalog, CommandSpec};
pub use binder::{Attachment, Detachment, Sessions};
pub use config::SessionConfig;
pub use connection::{Connection, Delegation, Outbox};
pub use error::{BindingError, CatalogError};
pub use host::GameHost;
pub use player::{Player, Roster};
pub use registry::ConnectionRegistry;
