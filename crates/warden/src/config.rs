//! Server configuration, loaded from TOML.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use warden_auth::AuthConfig;
use warden_session::{CommandCatalog, CommandSpec, SessionConfig};

use crate::WardenError;

/// Capability string advertised when the config does not set one.
pub const DEFAULT_CAPABILITY: &str = "+warden-1 vote delegation";

/// Root of the config file.
///
/// ```toml
/// bind = "127.0.0.1:5556"
/// capability = "+warden-1 vote delegation"
/// housekeeping_interval_ms = 1000
///
/// [auth]
/// allow_guests = true
///
/// [session]
/// default_access = "info"
///
/// [[commands]]
/// name = "start"
/// level = "ctrl"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind: String,

    /// Space separated; a leading `+` marks a capability clients must have.
    pub capability: String,

    /// Period of the housekeeping tick that expires handshakes.
    pub housekeeping_interval_ms: u64,

    pub auth: AuthConfig,
    pub session: SessionConfig,

    /// The command catalog: names and the level each one needs.
    pub commands: Vec<CommandSpec>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5556".to_string(),
            capability: DEFAULT_CAPABILITY.to_string(),
            housekeeping_interval_ms: 1000,
            auth: AuthConfig::default(),
            session: SessionConfig::default(),
            commands: CommandCatalog::standard_specs(),
        }
    }
}

impl ServerConfig {
    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_millis(self.housekeeping_interval_ms.max(1))
    }

    pub fn catalog(&self) -> CommandCatalog {
        CommandCatalog::new(self.commands.clone())
    }

    /// Reads the config at `path`. A missing file is created with the
    /// defaults, which are then returned.
    ///
    /// # Errors
    /// [`WardenError::Io`] on file errors, [`WardenError::Config`] when the
    /// file does not parse.
    pub async fn load(path: &Path) -> Result<Self, WardenError> {
        if tokio::fs::try_exists(path).await? {
            let text = tokio::fs::read_to_string(path).await?;
            let config = toml::from_str(&text).inspect_err(|e| {
                tracing::warn!(path = %path.display(), error = %e, "config does not parse");
            })?;
            return Ok(config);
        }

        tracing::warn!(path = %path.display(), "config not found, writing defaults");
        let config = Self::default();
        tokio::fs::write(path, toml::to_string_pretty(&config)?).await?;
        tracing::info!(path = %path.display(), "default config created");
        Ok(config)
    }
}
