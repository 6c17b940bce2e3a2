//! Per-connection task: bytes in, events out; messages in, bytes out.
//!
//! Each accepted socket gets one of these. It never touches session state
//! itself. Decoded client messages go to the server actor as events, and
//! whatever the authority puts in the connection's outbox is framed and
//! written back:
//!
//! ```text
//! socket ──recv──▶ decode ──▶ ServerEvent::Packet ──▶ actor
//! socket ◀──send── encode ◀── outbox ◀─────────────── actor
//! ```
//!
//! When the actor drops the outbox (reject, disconnect, shutdown), the
//! remaining messages are flushed and the socket is closed.

use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use warden_protocol::{ClientMessage, Codec, ConnectionId, Envelope, ProtocolError};
use warden_transport::{Connection, WebSocketConnection};

use crate::server::ServerEvent;
use crate::WardenError;

/// Tells the actor the socket is gone when the handler exits, however it
/// exits.
struct ConnectionGuard {
    conn_id: ConnectionId,
    events: mpsc::Sender<ServerEvent>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let conn_id = self.conn_id;
        let events = self.events.clone();
        tokio::spawn(async move {
            let _ = events.send(ServerEvent::Closed { conn_id }).await;
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<K: Codec>(
    conn: WebSocketConnection,
    events: mpsc::Sender<ServerEvent>,
    codec: K,
) -> Result<(), WardenError> {
    let addr = conn.peer_addr();
    let (outbox, mut outbound) = mpsc::unbounded_channel();
    let (reply, registered) = oneshot::channel();
    events
        .send(ServerEvent::Connected {
            addr,
            outbox,
            reply,
        })
        .await
        .map_err(|_| WardenError::ServerStopped)?;
    let conn_id = registered.await.map_err(|_| WardenError::ServerStopped)?;

    let _guard = ConnectionGuard {
        conn_id,
        events: events.clone(),
    };
    tracing::debug!(%conn_id, %addr, "handling connection");

    let start = Instant::now();
    let mut seq: u64 = 0;

    loop {
        tokio::select! {
            incoming = conn.recv() => {
                let data = match incoming {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        tracing::info!(%conn_id, "connection closed by peer");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(%conn_id, error = %e, "recv error");
                        break;
                    }
                };
                let message = match decode_message(&codec, &data) {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::debug!(%conn_id, error = %e, "dropping malformed message");
                        continue;
                    }
                };
                if events.send(ServerEvent::Packet { conn_id, message }).await.is_err() {
                    break;
                }
            }
            outgoing = outbound.recv() => {
                let Some(payload) = outgoing else {
                    tracing::debug!(%conn_id, "outbox dropped, closing socket");
                    let _ = conn.close().await;
                    break;
                };
                let envelope = Envelope {
                    seq: next_seq(&mut seq),
                    timestamp: start.elapsed().as_millis() as u64,
                    payload,
                };
                let bytes = codec.encode(&envelope)?;
                conn.send(&bytes).await?;
            }
        }
    }

    // _guard drops here → the actor hears the connection is gone.
    Ok(())
}

/// Decodes one frame and enforces the field limits.
fn decode_message(codec: &impl Codec, data: &[u8]) -> Result<ClientMessage, ProtocolError> {
    let envelope: Envelope<ClientMessage> = codec.decode(data)?;
    envelope.payload.check_bounds()?;
    Ok(envelope.payload)
}

fn next_seq(seq: &mut u64) -> u64 {
    let current = *seq;
    *seq += 1;
    current
}
