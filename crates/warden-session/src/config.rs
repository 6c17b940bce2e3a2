//! Session settings.

use serde::{Deserialize, Serialize};
use warden_protocol::AccessLevel;

/// The `[session]` table of the server config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Player ceiling used when the game host does not report one.
    pub max_players: usize,

    /// Level given to connections that are not the first.
    pub default_access: AccessLevel,

    /// Level given to the first connection (the game organizer) while
    /// nobody else holds it.
    pub first_access: AccessLevel,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_players: 30,
            default_access: AccessLevel::Info,
            first_access: AccessLevel::Ctrl,
        }
    }
}
