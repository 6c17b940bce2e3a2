//! Access control: command levels and per-connection privileges.
//!
//! Each connection carries two levels. `current_level` is what commands
//! are checked against; `granted_level` is what attach and detach restore
//! it to. Neither survives a disconnect: a reconnecting user starts again
//! at [`Sessions::access_for_next_connection`].

use serde::{Deserialize, Serialize};
use warden_protocol::{AccessLevel, ConnectionId};

use crate::{BindingError, CatalogError, Sessions};

// ---------------------------------------------------------------------------
// CommandCatalog
// ---------------------------------------------------------------------------

/// A command name and the level needed to run it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub name: String,
    pub level: AccessLevel,
}

impl CommandSpec {
    pub fn new(name: impl Into<String>, level: AccessLevel) -> Self {
        Self {
            name: name.into(),
            level,
        }
    }
}

/// The table of known commands.
///
/// Loaded from configuration; this crate only knows the names and levels,
/// not what the commands do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandCatalog {
    specs: Vec<CommandSpec>,
}

impl CommandCatalog {
    pub fn new(specs: Vec<CommandSpec>) -> Self {
        Self { specs }
    }

    /// The commands a stock server offers.
    pub fn standard_specs() -> Vec<CommandSpec> {
        [
            ("list", AccessLevel::Info),
            ("vote", AccessLevel::Info),
            ("cancelvote", AccessLevel::Info),
            ("take", AccessLevel::Info),
            ("observe", AccessLevel::Info),
            ("detach", AccessLevel::Info),
            ("delegate", AccessLevel::Info),
            ("firstlevel", AccessLevel::Info),
            ("cmdlevel", AccessLevel::Hack),
            ("start", AccessLevel::Ctrl),
            ("endgame", AccessLevel::Ctrl),
            ("set", AccessLevel::Ctrl),
        ]
        .into_iter()
        .map(|(name, level)| CommandSpec::new(name, level))
        .collect()
    }

    /// Looks a command up by exact name or by unambiguous prefix,
    /// ignoring ASCII case.
    ///
    /// # Errors
    /// [`CatalogError::Unknown`] or [`CatalogError::Ambiguous`].
    pub fn lookup(&self, word: &str) -> Result<&CommandSpec, CatalogError> {
        if word.is_empty() {
            return Err(CatalogError::Unknown(String::new()));
        }
        if let Some(spec) = self.specs.iter().find(|s| s.name.eq_ignore_ascii_case(word)) {
            return Ok(spec);
        }
        let mut matches = self.specs.iter().filter(|s| {
            s.name
                .get(..word.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(word))
        });
        match (matches.next(), matches.next()) {
            (Some(spec), None) => Ok(spec),
            (Some(_), Some(_)) => Err(CatalogError::Ambiguous(word.to_string())),
            (None, _) => Err(CatalogError::Unknown(word.to_string())),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl Default for CommandCatalog {
    fn default() -> Self {
        Self::new(Self::standard_specs())
    }
}

// ---------------------------------------------------------------------------
// Per-connection levels
// ---------------------------------------------------------------------------

impl Sessions {
    /// Whether the connection's current level meets the command's.
    pub fn is_allowed(&self, conn: ConnectionId, command: &CommandSpec) -> bool {
        self.registry
            .get(conn)
            .is_some_and(|c| c.current_level >= command.level)
    }

    /// Sets the current level, and the granted one too with `persist`.
    pub fn set_access(
        &mut self,
        conn: ConnectionId,
        level: AccessLevel,
        persist: bool,
    ) -> Result<(), BindingError> {
        let c = self
            .registry
            .get_mut(conn)
            .ok_or(BindingError::UnknownConnection(conn))?;
        c.current_level = level;
        if persist {
            c.granted_level = level;
        }
        tracing::info!(conn_id = %conn, %level, persist, "access level set");
        Ok(())
    }

    pub fn default_access(&self) -> AccessLevel {
        self.config.default_access
    }

    pub fn set_default_access(&mut self, level: AccessLevel) {
        self.config.default_access = level;
    }

    pub fn first_access(&self) -> AccessLevel {
        self.config.first_access
    }

    pub fn set_first_access(&mut self, level: AccessLevel) {
        self.config.first_access = level;
    }

    /// Someone already holds the first-connection level or better.
    pub fn first_access_taken(&self) -> bool {
        self.registry
            .established()
            .any(|c| c.current_level >= self.config.first_access)
    }

    /// The first-connection level is above the default and unclaimed.
    pub fn first_access_available(&self) -> bool {
        self.config.first_access > self.config.default_access && !self.first_access_taken()
    }

    /// Level for a connection about to be established: the
    /// first-connection level when nobody else is established yet, the
    /// default level otherwise.
    pub fn access_for_next_connection(&self) -> AccessLevel {
        let alone = self.registry.established().next().is_none();
        if self.config.first_access > self.config.default_access && alone {
            self.config.first_access
        } else {
            self.config.default_access
        }
    }

    // -----------------------------------------------------------------------
    // Voting eligibility
    // -----------------------------------------------------------------------

    /// Established, bound to a living player, not observing, and at least
    /// `info`.
    pub fn connection_can_vote(&self, conn: ConnectionId) -> bool {
        let Some(c) = self.registry.get(conn) else {
            return false;
        };
        c.established
            && !c.observer
            && c.current_level >= AccessLevel::Info
            && c.player
                .and_then(|p| self.roster.get(p))
                .is_some_and(|p| p.is_alive)
    }

    /// Number of connections that may vote right now.
    pub fn voter_count(&self) -> usize {
        self.registry
            .iter()
            .filter(|c| self.connection_can_vote(c.id()))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use tokio::sync::mpsc;
    use warden_protocol::{GamePhase, ServerMessage};

    use super::*;

    fn connect(
        sessions: &mut Sessions,
        username: &str,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<ServerMessage>) {
        let addr: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let id = sessions.registry_mut().accept(addr, tx);
        let conn = sessions.connection_mut(id).unwrap();
        conn.username = username.into();
        conn.established = true;
        (id, rx)
    }

    // =====================================================================
    // CommandCatalog::lookup()
    // =====================================================================

    #[test]
    fn test_lookup_exact_name() {
        let catalog = CommandCatalog::default();
        assert_eq!(catalog.lookup("vote").unwrap().level, AccessLevel::Info);
        assert_eq!(catalog.lookup("CMDLEVEL").unwrap().level, AccessLevel::Hack);
    }

    #[test]
    fn test_lookup_unique_prefix() {
        let catalog = CommandCatalog::default();
        assert_eq!(catalog.lookup("cm").unwrap().name, "cmdlevel");
        assert_eq!(catalog.lookup("ob").unwrap().name, "observe");
    }

    #[test]
    fn test_lookup_ambiguous_prefix() {
        let catalog = CommandCatalog::default();
        // "detach" and "delegate"
        assert!(matches!(
            catalog.lookup("de"),
            Err(CatalogError::Ambiguous(w)) if w == "de"
        ));
    }

    #[test]
    fn test_lookup_exact_beats_prefix() {
        let catalog = CommandCatalog::new(vec![
            CommandSpec::new("set", AccessLevel::Ctrl),
            CommandSpec::new("settings", AccessLevel::Info),
        ]);
        assert_eq!(catalog.lookup("set").unwrap().name, "set");
    }

    #[test]
    fn test_lookup_unknown() {
        let catalog = CommandCatalog::default();
        assert!(matches!(catalog.lookup("xyzzy"), Err(CatalogError::Unknown(_))));
        assert!(matches!(catalog.lookup(""), Err(CatalogError::Unknown(_))));
    }

    // =====================================================================
    // is_allowed() / set_access()
    // =====================================================================

    #[test]
    fn test_is_allowed_compares_current_level() {
        let mut sessions = Sessions::default();
        let (a, _ra) = connect(&mut sessions, "alice");
        let start = CommandSpec::new("start", AccessLevel::Ctrl);

        sessions.set_access(a, AccessLevel::Info, true).unwrap();
        assert!(!sessions.is_allowed(a, &start));

        sessions.set_access(a, AccessLevel::Ctrl, false).unwrap();
        assert!(sessions.is_allowed(a, &start));
    }

    #[test]
    fn test_set_access_persist_controls_granted_level() {
        let mut sessions = Sessions::default();
        let (a, _ra) = connect(&mut sessions, "alice");

        sessions.set_access(a, AccessLevel::Hack, false).unwrap();
        let conn = sessions.connection(a).unwrap();
        assert_eq!(conn.current_level(), AccessLevel::Hack);
        assert_eq!(conn.granted_level(), AccessLevel::None);
    }

    #[test]
    fn test_set_access_unknown_connection() {
        let mut sessions = Sessions::default();
        assert!(matches!(
            sessions.set_access(ConnectionId(4), AccessLevel::Ctrl, true),
            Err(BindingError::UnknownConnection(_))
        ));
    }

    #[test]
    fn test_is_allowed_unknown_connection_false() {
        let sessions = Sessions::default();
        assert!(!sessions.is_allowed(ConnectionId(1), &CommandSpec::new("list", AccessLevel::None)));
    }

    // =====================================================================
    // access_for_next_connection()
    // =====================================================================

    #[test]
    fn test_access_for_next_connection_first_gets_first_level() {
        let sessions = Sessions::default();
        assert_eq!(sessions.access_for_next_connection(), AccessLevel::Ctrl);
    }

    #[test]
    fn test_access_for_next_connection_later_gets_default() {
        let mut sessions = Sessions::default();
        connect(&mut sessions, "alice");
        assert_eq!(sessions.access_for_next_connection(), AccessLevel::Info);
    }

    #[test]
    fn test_access_for_next_connection_first_not_above_default() {
        let mut sessions = Sessions::default();
        sessions.set_first_access(AccessLevel::Info);
        assert_eq!(sessions.access_for_next_connection(), AccessLevel::Info);
    }

    #[test]
    fn test_first_access_taken_tracks_current_levels() {
        let mut sessions = Sessions::default();
        let (a, _ra) = connect(&mut sessions, "alice");
        sessions.set_access(a, AccessLevel::Info, true).unwrap();
        assert!(sessions.first_access_available());

        sessions.set_access(a, AccessLevel::Ctrl, true).unwrap();
        assert!(sessions.first_access_taken());
        assert!(!sessions.first_access_available());
    }

    // =====================================================================
    // connection_can_vote()
    // =====================================================================

    #[test]
    fn test_connection_can_vote_requires_bound_controller() {
        let mut sessions = Sessions::default();
        let mut phase = GamePhase::PreGame;
        let (a, _ra) = connect(&mut sessions, "alice");
        sessions.set_access(a, AccessLevel::Info, true).unwrap();
        assert!(!sessions.connection_can_vote(a));

        sessions.attach(a, None, false, &mut phase).unwrap();
        assert!(sessions.connection_can_vote(a));
        assert_eq!(sessions.voter_count(), 1);
    }

    #[test]
    fn test_connection_can_vote_false_for_observer() {
        let mut sessions = Sessions::default();
        let mut phase = GamePhase::PreGame;
        let (a, _ra) = connect(&mut sessions, "alice");
        let (b, _rb) = connect(&mut sessions, "bob");
        sessions.set_access(a, AccessLevel::Info, true).unwrap();
        sessions.set_access(b, AccessLevel::Info, true).unwrap();
        let p = sessions.attach(a, None, false, &mut phase).unwrap().player.unwrap();
        sessions.attach(b, Some(p), true, &mut phase).unwrap();

        assert!(!sessions.connection_can_vote(b));
        assert_eq!(sessions.voter_count(), 1);
    }

    #[test]
    fn test_connection_can_vote_false_for_dead_player_or_none_level() {
        let mut sessions = Sessions::default();
        let mut phase = GamePhase::Running;
        let (a, _ra) = connect(&mut sessions, "alice");
        sessions.set_access(a, AccessLevel::None, true).unwrap();
        let p = sessions.attach(a, None, false, &mut phase).unwrap().player.unwrap();
        assert!(!sessions.connection_can_vote(a));

        sessions.set_access(a, AccessLevel::Info, true).unwrap();
        sessions.roster_mut().get_mut(p).unwrap().is_alive = false;
        assert!(!sessions.connection_can_vote(a));
    }
}
