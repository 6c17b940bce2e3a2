//! The connection registry: every live connection, by id.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use warden_protocol::{ConnectionId, ServerMessage};

use crate::connection::{Connection, Outbox};

/// Owns all live connections.
///
/// Ids are handed out in increasing order and never reused, so iteration
/// order is connection order. The registry knows nothing about players or
/// privileges; it only stores what each connection told us.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: BTreeMap<ConnectionId, Connection>,
    next_id: u64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly accepted connection.
    pub fn accept(&mut self, addr: SocketAddr, outbox: Outbox) -> ConnectionId {
        self.next_id += 1;
        let id = ConnectionId(self.next_id);
        self.connections.insert(id, Connection::new(id, addr, outbox));
        tracing::debug!(conn_id = %id, %addr, "connection registered");
        id
    }

    /// Drops a connection. Its outbox goes with it, which closes the
    /// socket once the writer notices.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        self.connections.remove(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Connections that finished the handshake.
    pub fn established(&self) -> impl Iterator<Item = &Connection> {
        self.iter().filter(|c| c.established)
    }

    /// Finds a connection by username, ignoring ASCII case.
    pub fn find_by_username(&self, name: &str) -> Option<&Connection> {
        self.iter()
            .find(|c| !c.username.is_empty() && c.username.eq_ignore_ascii_case(name))
    }

    /// Finds a connection by username, or by its numeric id.
    pub fn find(&self, name_or_id: &str) -> Option<&Connection> {
        self.find_by_username(name_or_id).or_else(|| {
            let n = name_or_id.trim_start_matches("conn-").parse().ok()?;
            self.get(ConnectionId(n))
        })
    }

    /// Whether a connection other than `except` uses `name`.
    pub fn is_username_taken(&self, name: &str, except: ConnectionId) -> bool {
        self.iter()
            .any(|c| c.id() != except && c.username.eq_ignore_ascii_case(name))
    }

    /// Sends `msg` to every established connection.
    pub fn broadcast(&self, msg: &ServerMessage) {
        for conn in self.established() {
            conn.send(msg.clone());
        }
    }
}
