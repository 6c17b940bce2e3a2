//! The player roster.
//!
//! Players belong to the game, but the session layer needs a handful of
//! their fields to decide who may act as whom. [`Roster`] keeps those
//! fields; the game host hears about creations and removals through
//! [`GameHost`](crate::GameHost).

use std::collections::BTreeMap;

use warden_protocol::{ConnectionId, PlayerId, ANON_USER_NAME};

/// A game-side identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    id: PlayerId,
    pub name: String,
    /// The user controlling this player, or [`ANON_USER_NAME`].
    pub username: String,
    /// At least one non-observer connection is attached.
    pub is_connected: bool,
    pub ai_controlled: bool,
    pub is_alive: bool,
    /// The game gave this player something worth keeping (a nation,
    /// loaded state, setup). Such players survive their last detach.
    pub has_content: bool,
    pub(crate) connections: Vec<ConnectionId>,
    pub(crate) being_removed: bool,
    /// The controller that left to delegate and will come back. Nobody
    /// else may take the player meanwhile.
    pub(crate) reserved_by: Option<ConnectionId>,
}

impl Player {
    pub(crate) fn new(id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            username: ANON_USER_NAME.to_string(),
            is_connected: false,
            ai_controlled: false,
            is_alive: true,
            has_content: false,
            connections: Vec::new(),
            being_removed: false,
            reserved_by: None,
        }
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    /// Connections attached to this player, observers included.
    pub fn connections(&self) -> &[ConnectionId] {
        &self.connections
    }

    /// No user name is bound to this player.
    pub fn is_unassigned(&self) -> bool {
        self.username == ANON_USER_NAME
    }
}

/// All players, by id.
#[derive(Debug, Default)]
pub struct Roster {
    players: BTreeMap<PlayerId, Player>,
    next_id: u64,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a player with an anonymous username.
    pub fn create(&mut self, name: impl Into<String>) -> PlayerId {
        self.next_id += 1;
        let id = PlayerId(self.next_id);
        self.players.insert(id, Player::new(id, name));
        tracing::debug!(player = %id, "player created");
        id
    }

    pub fn remove(&mut self, id: PlayerId) -> Option<Player> {
        self.players.remove(&id)
    }

    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    /// Finds the player bound to `username`, ignoring ASCII case.
    pub fn find_by_username(&self, username: &str) -> Option<&Player> {
        self.iter().find(|p| {
            !p.being_removed && !p.is_unassigned() && p.username.eq_ignore_ascii_case(username)
        })
    }

    /// Finds a player by id (`P-3` or `3`) or by name.
    pub fn find(&self, name_or_id: &str) -> Option<&Player> {
        let by_name = self
            .iter()
            .find(|p| !p.being_removed && p.name.eq_ignore_ascii_case(name_or_id));
        by_name.or_else(|| {
            let n = name_or_id.trim_start_matches("P-").parse().ok()?;
            self.get(PlayerId(n)).filter(|p| !p.being_removed)
        })
    }

    /// The first player an unbound connection may take without naming
    /// one: nobody controls it, nobody holds it for a delegation, and the
    /// game has not given it content.
    pub fn find_uncontrolled(&self) -> Option<PlayerId> {
        self.iter()
            .find(|p| {
                !p.is_connected && !p.has_content && !p.being_removed && p.reserved_by.is_none()
            })
            .map(Player::id)
    }

    /// Gives `username` up on every player except `keep`.
    pub(crate) fn release_username(&mut self, username: &str, keep: PlayerId) {
        for player in self.players.values_mut() {
            if player.id != keep && player.username.eq_ignore_ascii_case(username) {
                tracing::debug!(player = %player.id, username, "username released");
                player.username = ANON_USER_NAME.to_string();
            }
        }
    }
}
