//! Transport abstraction layer for Warden.
//!
//! A [`Transport`] hands out [`Connection`]s; a connection moves opaque
//! frames in both directions. Identity, authentication, and everything
//! above bytes live in other crates, which is why connections here carry
//! only their peer address and no id.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::net::SocketAddr;

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Connection, TransportError>;

    /// The address the transport is listening on.
    fn local_addr(&self) -> std::io::Result<SocketAddr>;
}

/// A single bidirectional connection.
///
/// `send` and `recv` take `&self` and must be usable concurrently from one
/// task (for example from the two arms of a `tokio::select!`).
pub trait Connection: Send + Sync + 'static {
    /// Sends one frame to the peer.
    async fn send(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Receives the next frame.
    ///
    /// Returns `Ok(None)` once the peer has closed the connection.
    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError>;

    /// Closes the connection from our side.
    async fn close(&self) -> Result<(), TransportError>;

    /// The remote address, recorded at accept time.
    fn peer_addr(&self) -> SocketAddr;
}
