//! `WardenServer` builder, accept loop and the authority actor.
//!
//! All session state lives in one [`Authority`] owned by one actor task.
//! Connection handlers and the [`ServerHandle`] talk to it through a
//! channel of [`ServerEvent`]s, so every operation runs to completion
//! before the next one starts and nothing needs a lock.
//!
//! ```text
//! accept loop ──spawn──▶ handler ──┐
//!                        handler ──┼──▶ events ──▶ actor (Authority)
//!            ServerHandle ─────────┘                  ▲
//!                                   housekeeping tick ─┘
//! ```

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use warden_auth::{CredentialStore, MemoryStore};
use warden_protocol::{ClientMessage, ConnectionId, JsonCodec};
use warden_session::{GameHost, Outbox};
use warden_transport::{Transport, WebSocketTransport};

use crate::command::CommandExecutor;
use crate::handler::handle_connection;
use crate::notify::Notifier;
use crate::{Authority, CommandError, ServerConfig, WardenError};

/// Capacity of the actor's event channel.
const EVENT_CAPACITY: usize = 256;

/// Everything the actor reacts to.
pub(crate) enum ServerEvent {
    /// A socket was accepted; reply with its id.
    Connected {
        addr: SocketAddr,
        outbox: Outbox,
        reply: oneshot::Sender<ConnectionId>,
    },
    /// A decoded client message.
    Packet {
        conn_id: ConnectionId,
        message: ClientMessage,
    },
    /// The socket is gone.
    Closed { conn_id: ConnectionId },
    /// A line from the server operator, run with full authority.
    Command {
        line: String,
        reply: oneshot::Sender<Result<String, CommandError>>,
    },
    /// The game finished a turn.
    TurnBoundary,
    Shutdown,
}

// ---------------------------------------------------------------------------
// ServerHandle
// ---------------------------------------------------------------------------

/// Handle for the game and the operator to reach a running server.
///
/// Cheap to clone; it is just a channel sender.
#[derive(Clone)]
pub struct ServerHandle {
    events: mpsc::Sender<ServerEvent>,
}

impl ServerHandle {
    /// Re-evaluates open votes against the current electorate.
    pub async fn turn_boundary(&self) -> Result<(), WardenError> {
        self.send(ServerEvent::TurnBoundary).await
    }

    /// Runs a command line as the server itself.
    pub async fn run_command(&self, line: impl Into<String>) -> Result<String, WardenError> {
        let (reply, result) = oneshot::channel();
        self.send(ServerEvent::Command {
            line: line.into(),
            reply,
        })
        .await?;
        let outcome = result.await.map_err(|_| WardenError::ServerStopped)?;
        Ok(outcome?)
    }

    /// Disconnects everyone and stops the server.
    pub async fn shutdown(&self) -> Result<(), WardenError> {
        self.send(ServerEvent::Shutdown).await
    }

    async fn send(&self, event: ServerEvent) -> Result<(), WardenError> {
        self.events
            .send(event)
            .await
            .map_err(|_| WardenError::ServerStopped)
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring and starting a Warden server.
///
/// # Example
///
/// ```rust,ignore
/// use warden::prelude::*;
///
/// let server = WardenServerBuilder::new()
///     .config(ServerConfig::load(path).await?)
///     .store(MemoryStore::new())
///     .build(my_game)
///     .await?;
/// server.run().await
/// ```
pub struct WardenServerBuilder {
    config: ServerConfig,
    store: Option<Box<dyn CredentialStore>>,
    notifier: Option<Box<dyn Notifier>>,
}

impl WardenServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            store: None,
            notifier: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind = addr.to_string();
        self
    }

    /// Sets the account store. Defaults to an empty [`MemoryStore`].
    pub fn store(mut self, store: impl CredentialStore) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Sets where notifications go. Defaults to broadcasting them.
    pub fn notifier(mut self, notifier: impl Notifier) -> Self {
        self.notifier = Some(Box::new(notifier));
        self
    }

    /// Binds the listener and assembles the server around `game`.
    pub async fn build<G>(self, game: G) -> Result<WardenServer<G>, WardenError>
    where
        G: GameHost + CommandExecutor + Send + 'static,
    {
        let transport = WebSocketTransport::bind(&self.config.bind).await?;
        let store = self
            .store
            .unwrap_or_else(|| Box::new(MemoryStore::new()));

        let mut authority = Authority::new(&self.config, store, game);
        if let Some(notifier) = self.notifier {
            authority.notifier = notifier;
        }

        let (events, receiver) = mpsc::channel(EVENT_CAPACITY);
        let actor = ServerActor {
            authority,
            receiver,
            housekeeping: self.config.housekeeping_interval(),
        };
        Ok(WardenServer {
            transport,
            events,
            actor,
        })
    }
}

impl Default for WardenServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// A bound Warden server. Call [`run()`](Self::run) to start it.
pub struct WardenServer<G> {
    transport: WebSocketTransport,
    events: mpsc::Sender<ServerEvent>,
    actor: ServerActor<G>,
}

impl<G> WardenServer<G>
where
    G: GameHost + CommandExecutor + Send + 'static,
{
    /// Creates a new builder.
    pub fn builder() -> WardenServerBuilder {
        WardenServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// A handle that stays valid while the server runs.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            events: self.events.clone(),
        }
    }

    /// Runs the accept loop until the server is shut down through a
    /// [`ServerHandle`].
    pub async fn run(mut self) -> Result<(), WardenError> {
        tracing::info!(addr = ?self.transport.local_addr().ok(), "warden server running");
        let mut actor = tokio::spawn(self.actor.run());

        loop {
            tokio::select! {
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let events = self.events.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, events, JsonCodec).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
                _ = &mut actor => {
                    tracing::info!("warden server stopped");
                    return Ok(());
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct ServerActor<G> {
    authority: Authority<G>,
    receiver: mpsc::Receiver<ServerEvent>,
    housekeeping: Duration,
}

impl<G: GameHost + CommandExecutor> ServerActor<G> {
    async fn run(mut self) {
        tracing::info!("authority actor started");
        let mut housekeeping = tokio::time::interval(self.housekeeping);
        housekeeping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = self.receiver.recv() => {
                    let Some(event) = event else { break };
                    if !self.handle(event) {
                        break;
                    }
                }
                _ = housekeeping.tick() => {
                    self.authority.tick(Instant::now());
                }
            }
        }

        self.authority.lose_all();
        tracing::info!("authority actor stopped");
    }

    /// Applies one event. Returns `false` to stop.
    fn handle(&mut self, event: ServerEvent) -> bool {
        match event {
            ServerEvent::Connected {
                addr,
                outbox,
                reply,
            } => {
                let conn_id = self.authority.accept(addr, outbox);
                if reply.send(conn_id).is_err() {
                    self.authority.lose_connection(conn_id);
                }
            }
            ServerEvent::Packet { conn_id, message } => {
                self.authority
                    .handle_message(conn_id, message, Instant::now());
            }
            ServerEvent::Closed { conn_id } => {
                self.authority.lose_connection(conn_id);
            }
            ServerEvent::Command { line, reply } => {
                let _ = reply.send(self.authority.run_line(&line));
            }
            ServerEvent::TurnBoundary => self.authority.turn_boundary(),
            ServerEvent::Shutdown => {
                tracing::info!("shutdown requested");
                return false;
            }
        }
        true
    }
}
