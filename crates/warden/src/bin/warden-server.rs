//! Standalone Warden server.
//!
//! Runs the session authority around a minimal lobby game that only knows
//! `start`, `endgame` and `set`. Lines typed on stdin run as server
//! commands; `endturn` closes the current turn.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use warden::prelude::*;
use warden::{setup_logging, split_line};

/// Command line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "warden-server", version, about = "Session authority for turn-based games")]
pub struct Args {
    /// Path to the TOML config. Created with defaults if missing.
    #[arg(short, long, default_value = "warden.toml")]
    pub config: PathBuf,

    /// Override the listen address from the config ("IP:PORT").
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Enable debug logging.
    #[arg(short, long)]
    pub debug: bool,

    /// Override the player ceiling from the config.
    #[arg(short, long)]
    pub max_players: Option<usize>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config: PathBuf::from("warden.toml"),
            listen: None,
            debug: false,
            max_players: None,
        }
    }
}

/// A lobby with a phase and a settings table, nothing else.
#[derive(Debug, Default)]
struct StandaloneHost {
    phase: GamePhase,
    settings: BTreeMap<String, String>,
}

impl GameHost for StandaloneHost {
    fn phase(&self) -> GamePhase {
        self.phase
    }
}

impl CommandExecutor for StandaloneHost {
    fn validate(&self, line: &str) -> Result<(), String> {
        let Some((word, args)) = split_line(line) else {
            return Err("Empty command.".into());
        };
        match (word, self.phase) {
            ("start", GamePhase::PreGame) => Ok(()),
            ("start", _) => Err("The game is already running.".into()),
            ("endgame", GamePhase::Running) => Ok(()),
            ("endgame", _) => Err("No game is running.".into()),
            ("set", _) if args.split_whitespace().count() == 2 => Ok(()),
            ("set", _) => Err("Usage: set <name> <value>".into()),
            _ => Err(format!("Unknown command '{word}'.")),
        }
    }

    fn execute(&mut self, caller: Option<ConnectionId>, line: &str) -> Result<String, String> {
        self.validate(line)?;
        let Some((word, args)) = split_line(line) else {
            return Ok(String::new());
        };
        tracing::info!(caller = ?caller, line, "game command");
        match word {
            "start" => {
                self.phase = GamePhase::Running;
                Ok("The game has started.".into())
            }
            "endgame" => {
                self.phase = GamePhase::Ended;
                Ok("The game has ended.".into())
            }
            _ => {
                let mut parts = args.split_whitespace();
                let (Some(name), Some(value)) = (parts.next(), parts.next()) else {
                    return Err("Usage: set <name> <value>".into());
                };
                self.settings.insert(name.to_string(), value.to_string());
                Ok(format!("Option '{name}' set to '{value}'."))
            }
        }
    }
}

/// Reads operator lines from stdin until it closes.
async fn console(handle: ServerHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let result = if line.eq_ignore_ascii_case("endturn") {
            handle.turn_boundary().await.map(|()| "Turn ended.".to_string())
        } else {
            handle.run_command(line).await
        };
        match result {
            Ok(text) if !text.is_empty() => println!("{text}"),
            Ok(_) => {}
            Err(WardenError::ServerStopped) => break,
            Err(e) => println!("{e}"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), WardenError> {
    let args = Args::parse();
    setup_logging(args.debug);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting warden-server");

    let mut config = ServerConfig::load(&args.config).await?;
    if let Some(listen) = args.listen {
        config.bind = listen;
    }
    if let Some(max_players) = args.max_players {
        config.session.max_players = max_players;
    }
    tracing::info!(config = %args.config.display(), bind = %config.bind, "configuration loaded");

    let server = WardenServerBuilder::new()
        .config(config)
        .store(MemoryStore::new())
        .build(StandaloneHost::default())
        .await?;

    let handle = server.handle();
    tokio::spawn(console(handle.clone()));
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            let _ = handle.shutdown().await;
        }
    });

    server.run().await
}
