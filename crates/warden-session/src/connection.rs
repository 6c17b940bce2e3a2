//! One live network participant, as the authority layer sees it.

use std::net::SocketAddr;

use tokio::sync::mpsc;
use warden_auth::AuthSession;
use warden_protocol::{AccessLevel, ConnectionId, PlayerId, ServerMessage};

/// Channel to the task that writes to a connection's socket.
///
/// Dropping the last sender makes that task close the socket.
pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

/// What a connection was bound to before it started a delegation, and
/// the delegated player's username at the time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delegation {
    pub target: PlayerId,
    pub original_player: Option<PlayerId>,
    pub original_observer: bool,
    pub original_username: String,
}

/// A registered connection.
///
/// Binding fields (`player`, `observer`, access levels, delegation) are
/// only changed through [`Sessions`](crate::Sessions), which keeps them
/// consistent with the player roster.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    addr: SocketAddr,
    outbox: Outbox,

    /// The handshake finished and the connection is a trusted participant.
    pub established: bool,
    /// Requested name before the handshake, final name after it.
    pub username: String,
    pub capability: String,
    pub auth: AuthSession,

    pub(crate) observer: bool,
    pub(crate) player: Option<PlayerId>,
    pub(crate) current_level: AccessLevel,
    pub(crate) granted_level: AccessLevel,
    pub(crate) delegation: Option<Delegation>,
}

impl Connection {
    pub(crate) fn new(id: ConnectionId, addr: SocketAddr, outbox: Outbox) -> Self {
        Self {
            id,
            addr,
            outbox,
            established: false,
            username: String::new(),
            capability: String::new(),
            auth: AuthSession::new(),
            observer: false,
            player: None,
            current_level: AccessLevel::None,
            granted_level: AccessLevel::None,
            delegation: None,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The player this connection controls or observes.
    pub fn player(&self) -> Option<PlayerId> {
        self.player
    }

    pub fn is_observer(&self) -> bool {
        self.observer
    }

    /// Neither bound to a player nor observing globally.
    pub fn is_unbound(&self) -> bool {
        self.player.is_none() && !self.observer
    }

    /// Bound to a player as its controller.
    pub fn is_controller(&self) -> bool {
        self.player.is_some() && !self.observer
    }

    pub fn current_level(&self) -> AccessLevel {
        self.current_level
    }

    /// The level [`current_level`](Self::current_level) returns to on
    /// attach and detach.
    pub fn granted_level(&self) -> AccessLevel {
        self.granted_level
    }

    pub fn delegation(&self) -> Option<&Delegation> {
        self.delegation.as_ref()
    }

    /// Queues a message for the client. Returns `false` if the socket
    /// task is already gone.
    pub fn send(&self, msg: ServerMessage) -> bool {
        self.outbox.send(msg).is_ok()
    }

    /// Display name for messages: the username once known.
    pub fn describe(&self) -> String {
        if self.username.is_empty() {
            format!("{} ({})", self.id, self.addr)
        } else {
            self.username.clone()
        }
    }
}
