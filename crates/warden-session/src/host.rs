//! The seam between the session layer and the game.

use warden_protocol::GamePhase;

use crate::{Connection, Player};

/// What the session layer needs from the game.
///
/// Only [`phase`](Self::phase) is required. The hooks default to doing
/// nothing, which is what a bare lobby wants.
pub trait GameHost {
    fn phase(&self) -> GamePhase;

    /// Maximum number of players. `None` falls back to
    /// [`SessionConfig::max_players`](crate::SessionConfig::max_players).
    fn player_ceiling(&self) -> Option<usize> {
        None
    }

    /// Sends a freshly attached connection whatever it needs to follow
    /// the game. Called exactly once per successful attach.
    fn catch_up(&mut self, _conn: &Connection, _player: Option<&Player>, _phase: GamePhase) {}

    fn player_created(&mut self, _player: &Player) {}

    fn player_removed(&mut self, _player: &Player) {}
}

/// A phase on its own is a host with no catch-up and no ceiling.
impl GameHost for GamePhase {
    fn phase(&self) -> GamePhase {
        *self
    }
}
