//! Integration tests for the Warden server over real WebSocket connections.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use warden::prelude::*;
use warden::DEFAULT_CAPABILITY;

// =========================================================================
// Mock game
// =========================================================================

struct Lobby;

impl GameHost for Lobby {
    fn phase(&self) -> GamePhase {
        GamePhase::PreGame
    }
}

impl CommandExecutor for Lobby {
    fn execute(&mut self, _caller: Option<ConnectionId>, line: &str) -> Result<String, String> {
        Ok(format!("ran {line}"))
    }
}

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Starts a server on a random port with authentication off.
async fn start_server() -> (String, ServerHandle) {
    let mut config = ServerConfig::default();
    config.bind = "127.0.0.1:0".into();
    config.auth.enabled = false;
    config.housekeeping_interval_ms = 50;

    let server = WardenServerBuilder::new()
        .config(config)
        .build(Lobby)
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();
    let handle = server.handle();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    (addr, handle)
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send(ws: &mut ClientWs, payload: ClientMessage) {
    let envelope = Envelope {
        seq: 0,
        timestamp: 0,
        payload,
    };
    let bytes = serde_json::to_vec(&envelope).expect("encode");
    ws.send(Message::Binary(bytes.into())).await.expect("send");
}

async fn login(ws: &mut ClientWs, username: &str) {
    send(
        ws,
        ClientMessage::Login {
            username: username.into(),
            capability: DEFAULT_CAPABILITY.into(),
        },
    )
    .await;
}

async fn command(ws: &mut ClientWs, line: &str) {
    send(ws, ClientMessage::Command { line: line.into() }).await;
}

/// Next server message, failing the test after two seconds.
async fn next_message(ws: &mut ClientWs) -> ServerMessage {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Binary(data) = msg {
            let envelope: Envelope<ServerMessage> =
                serde_json::from_slice(&data).expect("decode");
            return envelope.payload;
        }
    }
}

/// Skips messages until one matches.
async fn wait_for(ws: &mut ClientWs, pred: impl Fn(&ServerMessage) -> bool) -> ServerMessage {
    loop {
        let msg = next_message(ws).await;
        if pred(&msg) {
            return msg;
        }
    }
}

async fn join_reply(ws: &mut ClientWs) -> (bool, String, Option<ConnectionId>) {
    match wait_for(ws, |m| matches!(m, ServerMessage::JoinReply { .. })).await {
        ServerMessage::JoinReply {
            accepted,
            message,
            conn_id,
            ..
        } => (accepted, message, conn_id),
        other => panic!("expected JoinReply, got {other:?}"),
    }
}

async fn notice_containing(ws: &mut ClientWs, needle: &str) -> String {
    match wait_for(
        ws,
        |m| matches!(m, ServerMessage::Notice { text } if text.contains(needle)),
    )
    .await
    {
        ServerMessage::Notice { text } => text,
        other => panic!("expected Notice, got {other:?}"),
    }
}

/// Reads until the server closes the socket.
async fn expect_closed(ws: &mut ClientWs) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let result = tokio::time::timeout_at(deadline, ws.next())
            .await
            .expect("expected close");
        match result {
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
            Some(Ok(_)) => {}
        }
    }
}

// =========================================================================
// Login
// =========================================================================

#[tokio::test]
async fn test_login_accepted() {
    let (addr, _handle) = start_server().await;
    let mut ws = connect(&addr).await;

    login(&mut ws, "alice").await;

    let (accepted, message, conn_id) = join_reply(&mut ws).await;
    assert!(accepted);
    assert!(message.starts_with("alice has connected from 127.0.0.1"));
    assert!(conn_id.is_some());

    let level = wait_for(&mut ws, |m| matches!(m, ServerMessage::AccessLevel { .. })).await;
    assert_eq!(
        level,
        ServerMessage::AccessLevel {
            level: AccessLevel::Ctrl
        }
    );
    notice_containing(&mut ws, "alice controls alice.").await;
}

#[tokio::test]
async fn test_login_duplicate_refused_and_closed() {
    let (addr, _handle) = start_server().await;
    let mut first = connect(&addr).await;
    login(&mut first, "alice").await;
    join_reply(&mut first).await;

    let mut second = connect(&addr).await;
    login(&mut second, "Alice").await;

    let (accepted, message, conn_id) = join_reply(&mut second).await;
    assert!(!accepted);
    assert_eq!(message, "'Alice' already connected.");
    assert!(conn_id.is_none());
    expect_closed(&mut second).await;
}

#[tokio::test]
async fn test_login_wrong_capability_refused() {
    let (addr, _handle) = start_server().await;
    let mut ws = connect(&addr).await;

    send(
        &mut ws,
        ClientMessage::Login {
            username: "alice".into(),
            capability: "+other-game".into(),
        },
    )
    .await;

    let (accepted, _, _) = join_reply(&mut ws).await;
    assert!(!accepted);
    expect_closed(&mut ws).await;
}

#[tokio::test]
async fn test_malformed_frame_ignored() {
    let (addr, _handle) = start_server().await;
    let mut ws = connect(&addr).await;

    ws.send(Message::Binary(b"not json".to_vec().into()))
        .await
        .expect("send");
    login(&mut ws, "alice").await;

    let (accepted, _, _) = join_reply(&mut ws).await;
    assert!(accepted);
}

#[tokio::test]
async fn test_disconnect_closes_connection() {
    let (addr, _handle) = start_server().await;
    let mut ws = connect(&addr).await;
    login(&mut ws, "alice").await;
    join_reply(&mut ws).await;

    send(&mut ws, ClientMessage::Disconnect).await;

    expect_closed(&mut ws).await;
}

// =========================================================================
// Commands and votes
// =========================================================================

#[tokio::test]
async fn test_vote_passes_across_connections() {
    let (addr, _handle) = start_server().await;
    let mut alice = connect(&addr).await;
    login(&mut alice, "alice").await;
    join_reply(&mut alice).await;
    let mut bob = connect(&addr).await;
    login(&mut bob, "bob").await;
    join_reply(&mut bob).await;

    command(&mut bob, "start").await;
    notice_containing(&mut bob, "New vote (number 1) by bob: start.").await;
    let started = wait_for(&mut alice, |m| {
        matches!(
            m,
            ServerMessage::Event {
                notification: Notification::VoteStarted { .. }
            }
        )
    })
    .await;
    assert_eq!(
        started,
        ServerMessage::Event {
            notification: Notification::VoteStarted {
                number: 1,
                caller: "bob".into(),
                command: "start".into(),
            }
        }
    );

    command(&mut alice, "vote yes").await;

    notice_containing(&mut alice, "ran start").await;
    notice_containing(&mut bob, "ran start").await;
}

#[tokio::test]
async fn test_handle_run_command_lists_connections() {
    let (addr, handle) = start_server().await;
    let mut ws = connect(&addr).await;
    login(&mut ws, "alice").await;
    join_reply(&mut ws).await;

    let text = handle.run_command("list").await.unwrap();

    assert!(text.contains("Connections:"));
    assert!(text.contains("alice"));
}

#[tokio::test]
async fn test_handle_run_command_error_is_returned() {
    let (_addr, handle) = start_server().await;

    let result = handle.run_command("frobnicate").await;

    assert!(matches!(
        result,
        Err(WardenError::Command(CommandError::Catalog(_)))
    ));
}

#[tokio::test]
async fn test_shutdown_notifies_and_closes() {
    let (addr, handle) = start_server().await;
    let mut ws = connect(&addr).await;
    login(&mut ws, "alice").await;
    join_reply(&mut ws).await;

    handle.shutdown().await.unwrap();

    notice_containing(&mut ws, "Server is shutting down.").await;
    expect_closed(&mut ws).await;
    assert!(matches!(
        handle.run_command("list").await,
        Err(WardenError::ServerStopped)
    ));
}
