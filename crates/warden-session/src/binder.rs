//! Attaching connections to players and detaching them again.
//!
//! # Concurrency note
//!
//! [`Sessions`] has no locks and no globals. The server actor owns the
//! one instance and passes `&mut` to every operation, so a binding change
//! is never observed half done. Tests build their own `Sessions` and
//! drive it directly.

use warden_protocol::{ConnectionId, GamePhase, PlayerId, ANON_USER_NAME};

use crate::{BindingError, Connection, ConnectionRegistry, GameHost, Roster, SessionConfig};

/// Result of a successful [`Sessions::attach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attachment {
    /// The player bound to, `None` for a global observer.
    pub player: Option<PlayerId>,
    pub observer: bool,
    /// The player was created for this attach.
    pub created: bool,
}

/// Result of [`Sessions::detach`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detachment {
    /// The player the connection was bound to, if any.
    pub player: Option<PlayerId>,
    pub observer: bool,
    /// Set when the player was thrown away because nobody controls it.
    pub removed: Option<PlayerId>,
    /// Observers detached because their player was removed.
    pub evicted: Vec<ConnectionId>,
}

/// Connections, players, and the bindings between them.
///
/// A binding has two sides: the connection's `player` and the player's
/// `connections`. Keeping both in one context lets every operation update
/// them together, and each operation runs to completion before the next
/// one starts, so the two sides always agree between calls. The game is
/// reached only through the [`GameHost`] passed in, never stored here.
///
/// ```text
///            attach(None, false)                 detach
/// unbound ───────────────────────▶ controller ──────────▶ unbound
///    │       attach(Some(p), true)                ▲
///    └───────────────────────────▶ observer ──────┘
/// ```
#[derive(Debug, Default)]
pub struct Sessions {
    pub(crate) registry: ConnectionRegistry,
    pub(crate) roster: Roster,
    pub(crate) config: SessionConfig,
}

impl Sessions {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            roster: Roster::new(),
            config,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ConnectionRegistry {
        &mut self.registry
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn roster_mut(&mut self) -> &mut Roster {
        &mut self.roster
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.registry.get(id)
    }

    pub fn connection_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.registry.get_mut(id)
    }

    /// The non-observer connection attached to `player`.
    pub fn controller_of(&self, player: PlayerId) -> Option<ConnectionId> {
        self.roster.get(player)?.connections.iter().copied().find(|c| {
            self.registry
                .get(*c)
                .is_some_and(Connection::is_controller)
        })
    }

    // -----------------------------------------------------------------------
    // attach
    // -----------------------------------------------------------------------

    /// Binds an unbound connection.
    ///
    /// - `target` set: control (or observe, with `observing`) that player.
    /// - no target, not observing: take a free player, creating one if the
    ///   ceiling allows.
    /// - no target, observing: observe the whole game.
    ///
    /// Nothing is changed unless the attach succeeds.
    ///
    /// # Panics
    /// If the connection is already bound. Callers detach first.
    ///
    /// # Errors
    /// - [`BindingError::UnknownConnection`]
    /// - [`BindingError::PlayerNotFound`] for a missing target
    /// - [`BindingError::PlayerControlled`] when another connection already
    ///   controls the target, or holds it while delegating
    /// - [`BindingError::NoSlotAvailable`] when no player is free and the
    ///   ceiling is reached
    pub fn attach(
        &mut self,
        conn_id: ConnectionId,
        target: Option<PlayerId>,
        observing: bool,
        host: &mut dyn GameHost,
    ) -> Result<Attachment, BindingError> {
        let conn = self
            .registry
            .get(conn_id)
            .ok_or(BindingError::UnknownConnection(conn_id))?;
        assert!(
            conn.is_unbound(),
            "{conn_id} attached while still bound; detach it first"
        );
        let username = conn.username.clone();
        let phase = host.phase();

        let (player_id, created) = match (target, observing) {
            (Some(id), _) => {
                self.roster
                    .get(id)
                    .filter(|p| !p.being_removed)
                    .ok_or(BindingError::PlayerNotFound(id))?;
                if !observing {
                    let reserved = self.roster.get(id).and_then(|p| p.reserved_by);
                    if let Some(by) = self
                        .controller_of(id)
                        .or(reserved.filter(|r| *r != conn_id))
                    {
                        return Err(BindingError::PlayerControlled { player: id, by });
                    }
                }
                (Some(id), false)
            }
            (None, true) => (None, false),
            (None, false) => match self.roster.find_uncontrolled() {
                Some(id) => (Some(id), false),
                None => {
                    let ceiling = host.player_ceiling().unwrap_or(self.config.max_players);
                    if self.roster.len() >= ceiling {
                        return Err(BindingError::NoSlotAvailable);
                    }
                    (Some(self.roster.create(username.clone())), true)
                }
            },
        };

        if let Some(id) = player_id {
            if !observing {
                self.roster.release_username(&username, id);
            }
            let player = self.roster.get_mut(id).expect("resolved above");
            if !observing {
                player.username = username.clone();
                player.is_connected = true;
                if phase == GamePhase::PreGame {
                    player.ai_controlled = false;
                }
            }
            player.connections.push(conn_id);
            if created {
                host.player_created(player);
            }
        }

        let conn = self.registry.get_mut(conn_id).expect("checked above");
        conn.player = player_id;
        conn.observer = observing;
        conn.current_level = conn.granted_level;

        let conn = self.registry.get(conn_id).expect("checked above");
        host.catch_up(conn, player_id.and_then(|id| self.roster.get(id)), phase);

        tracing::info!(
            %conn_id,
            username,
            player = ?player_id,
            observing,
            created,
            "connection attached"
        );
        Ok(Attachment {
            player: player_id,
            observer: observing,
            created,
        })
    }

    // -----------------------------------------------------------------------
    // detach
    // -----------------------------------------------------------------------

    /// Unbinds a connection. Detaching an unbound connection is a no-op.
    ///
    /// In pre-game, a player left without a controller loses its username,
    /// and is removed altogether unless the game gave it content or an AI
    /// runs it. Its observers are detached first. A player whose controller
    /// is away delegating is left as it is.
    pub fn detach(
        &mut self,
        conn_id: ConnectionId,
        host: &mut dyn GameHost,
    ) -> Result<Detachment, BindingError> {
        self.detach_with(conn_id, true, host)
    }

    /// Unbinds a connection like [`detach`](Self::detach) but leaves the
    /// player alone: no username change, no removal. For moves where the
    /// player must survive, such as handing it to another connection.
    pub fn release(
        &mut self,
        conn_id: ConnectionId,
        host: &mut dyn GameHost,
    ) -> Result<Detachment, BindingError> {
        self.detach_with(conn_id, false, host)
    }

    fn detach_with(
        &mut self,
        conn_id: ConnectionId,
        allow_removal: bool,
        host: &mut dyn GameHost,
    ) -> Result<Detachment, BindingError> {
        let conn = self
            .registry
            .get_mut(conn_id)
            .ok_or(BindingError::UnknownConnection(conn_id))?;
        let player_id = conn.player.take();
        let observer = std::mem::take(&mut conn.observer);
        conn.current_level = conn.granted_level;

        let mut detachment = Detachment {
            player: player_id,
            observer,
            removed: None,
            evicted: Vec::new(),
        };
        let Some(id) = player_id else {
            return Ok(detachment);
        };

        let registry = &self.registry;
        let Some(player) = self.roster.get_mut(id) else {
            return Ok(detachment);
        };
        player.connections.retain(|c| *c != conn_id);
        player.is_connected = player
            .connections
            .iter()
            .any(|c| registry.get(*c).is_some_and(Connection::is_controller));
        tracing::info!(%conn_id, player = %id, observer, "connection detached");

        if !allow_removal
            || player.being_removed
            || player.is_connected
            || player.reserved_by.is_some()
            || host.phase() != GamePhase::PreGame
        {
            return Ok(detachment);
        }

        player.username = ANON_USER_NAME.to_string();
        if player.has_content || player.ai_controlled {
            return Ok(detachment);
        }

        player.being_removed = true;
        let remaining = player.connections.clone();
        for other in remaining {
            if self.detach_with(other, false, host).is_ok() {
                detachment.evicted.push(other);
            }
        }
        if let Some(player) = self.roster.remove(id) {
            host.player_removed(&player);
            tracing::info!(player = %id, name = %player.name, "unused player removed");
            detachment.removed = Some(id);
        }
        Ok(detachment)
    }

    /// Attaches to a saved binding. An unbound binding needs no attach.
    pub(crate) fn rebind(
        &mut self,
        conn_id: ConnectionId,
        player: Option<PlayerId>,
        observer: bool,
        host: &mut dyn GameHost,
    ) -> Result<Option<Attachment>, BindingError> {
        if player.is_none() && !observer {
            return Ok(None);
        }
        self.attach(conn_id, player, observer, host).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use tokio::sync::mpsc;
    use warden_protocol::{AccessLevel, ServerMessage};

    use super::*;
    use crate::Player;

    #[derive(Default)]
    struct Host {
        phase: GamePhase,
        ceiling: Option<usize>,
        catch_ups: Vec<ConnectionId>,
        removed: Vec<PlayerId>,
    }

    impl GameHost for Host {
        fn phase(&self) -> GamePhase {
            self.phase
        }

        fn player_ceiling(&self) -> Option<usize> {
            self.ceiling
        }

        fn catch_up(&mut self, conn: &Connection, _: Option<&Player>, _: GamePhase) {
            self.catch_ups.push(conn.id());
        }

        fn player_removed(&mut self, player: &Player) {
            self.removed.push(player.id());
        }
    }

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
    // attach()
    // =====================================================================

    #[test]
    fn test_attach_creates_player_when_none_free() {
        let mut sessions = Sessions::default();
        let mut host = Host::default();
        let (a, _ra) = connect(&mut sessions, "alice");

        let att = sessions.attach(a, None, false, &mut host).unwrap();

        assert!(att.created);
        let player = sessions.roster().get(att.player.unwrap()).unwrap();
        assert_eq!(player.username, "alice");
        assert!(player.is_connected);
        assert_eq!(player.connections(), &[a]);
        assert_eq!(host.catch_ups, vec![a]);
    }

    #[test]
    fn test_attach_prefers_free_player() {
        let mut sessions = Sessions::default();
        let mut host = Host::default();
        let free = sessions.roster_mut().create("free");
        let (a, _ra) = connect(&mut sessions, "alice");

        let att = sessions.attach(a, None, false, &mut host).unwrap();

        assert_eq!(att.player, Some(free));
        assert!(!att.created);
    }

    #[test]
    fn test_attach_no_slot_changes_nothing() {
        let mut sessions = Sessions::default();
        let mut host = Host {
            ceiling: Some(1),
            ..Host::default()
        };
        let (a, _ra) = connect(&mut sessions, "alice");
        let (b, _rb) = connect(&mut sessions, "bob");
        sessions.attach(a, None, false, &mut host).unwrap();

        let result = sessions.attach(b, None, false, &mut host);

        assert!(matches!(result, Err(BindingError::NoSlotAvailable)));
        assert!(sessions.connection(b).unwrap().is_unbound());
        assert_eq!(sessions.roster().len(), 1);
        assert_eq!(host.catch_ups, vec![a]);
    }

    #[test]
    fn test_attach_controlled_player_rejected() {
        let mut sessions = Sessions::default();
        let mut host = Host::default();
        let (a, _ra) = connect(&mut sessions, "alice");
        let (b, _rb) = connect(&mut sessions, "bob");
        let p = sessions.attach(a, None, false, &mut host).unwrap().player.unwrap();

        let result = sessions.attach(b, Some(p), false, &mut host);

        assert!(matches!(
            result,
            Err(BindingError::PlayerControlled { player, by }) if player == p && by == a
        ));
        assert!(sessions.connection(b).unwrap().is_unbound());
    }

    #[test]
    fn test_attach_observer_allowed_on_controlled_player() {
        let mut sessions = Sessions::default();
        let mut host = Host::default();
        let (a, _ra) = connect(&mut sessions, "alice");
        let (b, _rb) = connect(&mut sessions, "bob");
        let p = sessions.attach(a, None, false, &mut host).unwrap().player.unwrap();

        sessions.attach(b, Some(p), true, &mut host).unwrap();

        let player = sessions.roster().get(p).unwrap();
        assert_eq!(player.username, "alice");
        assert_eq!(player.connections(), &[a, b]);
        assert!(sessions.connection(b).unwrap().is_observer());
    }

    #[test]
    fn test_attach_global_observer_has_no_player() {
        let mut sessions = Sessions::default();
        let mut host = Host::default();
        let (a, _ra) = connect(&mut sessions, "alice");

        let att = sessions.attach(a, None, true, &mut host).unwrap();

        assert_eq!(att.player, None);
        let conn = sessions.connection(a).unwrap();
        assert!(conn.is_observer());
        assert!(!conn.is_unbound());
        assert!(sessions.roster().is_empty());
    }

    #[test]
    fn test_attach_frees_username_on_other_player() {
        let mut sessions = Sessions::default();
        let mut host = Host {
            phase: GamePhase::Running,
            ..Host::default()
        };
        let old = sessions.roster_mut().create("old");
        sessions.roster_mut().get_mut(old).unwrap().username = "alice".into();
        sessions.roster_mut().get_mut(old).unwrap().has_content = true;
        let new = sessions.roster_mut().create("new");
        let (a, _ra) = connect(&mut sessions, "alice");

        sessions.attach(a, Some(new), false, &mut host).unwrap();

        assert!(sessions.roster().get(old).unwrap().is_unassigned());
        assert_eq!(sessions.roster().get(new).unwrap().username, "alice");
    }

    #[test]
    fn test_attach_pregame_turns_ai_off() {
        let mut sessions = Sessions::default();
        let mut host = Host::default();
        let p = sessions.roster_mut().create("ai");
        sessions.roster_mut().get_mut(p).unwrap().ai_controlled = true;
        let (a, _ra) = connect(&mut sessions, "alice");

        sessions.attach(a, Some(p), false, &mut host).unwrap();

        assert!(!sessions.roster().get(p).unwrap().ai_controlled);
    }

    #[test]
    fn test_attach_restores_granted_level() {
        let mut sessions = Sessions::default();
        let mut host = Host::default();
        let (a, _ra) = connect(&mut sessions, "alice");
        sessions.set_access(a, AccessLevel::Ctrl, true).unwrap();
        sessions.set_access(a, AccessLevel::Info, false).unwrap();

        sessions.attach(a, None, false, &mut host).unwrap();

        assert_eq!(sessions.connection(a).unwrap().current_level(), AccessLevel::Ctrl);
    }

    #[test]
    #[should_panic(expected = "still bound")]
    fn test_attach_twice_panics() {
        let mut sessions = Sessions::default();
        let mut host = Host::default();
        let (a, _ra) = connect(&mut sessions, "alice");
        sessions.attach(a, None, false, &mut host).unwrap();
        let _ = sessions.attach(a, None, false, &mut host);
    }

    #[test]
    fn test_attach_unknown_connection() {
        let mut sessions = Sessions::default();
        let result = sessions.attach(ConnectionId(9), None, false, &mut Host::default());
        assert!(matches!(
            result,
            Err(BindingError::UnknownConnection(c)) if c == ConnectionId(9)
        ));
    }

    // =====================================================================
    // detach()
    // =====================================================================

    #[test]
    fn test_detach_unbound_is_noop() {
        let mut sessions = Sessions::default();
        let (a, _ra) = connect(&mut sessions, "alice");
        let d = sessions.detach(a, &mut Host::default()).unwrap();
        assert_eq!(d.player, None);
        assert_eq!(d.removed, None);
    }

    #[test]
    fn test_detach_pregame_removes_fresh_player_and_evicts_observers() {
        let mut sessions = Sessions::default();
        let mut host = Host::default();
        let (a, _ra) = connect(&mut sessions, "alice");
        let (b, _rb) = connect(&mut sessions, "bob");
        let p = sessions.attach(a, None, false, &mut host).unwrap().player.unwrap();
        sessions.attach(b, Some(p), true, &mut host).unwrap();

        let d = sessions.detach(a, &mut host).unwrap();

        assert_eq!(d.removed, Some(p));
        assert_eq!(d.evicted, vec![b]);
        assert!(sessions.roster().get(p).is_none());
        assert!(sessions.connection(b).unwrap().is_unbound());
        assert_eq!(host.removed, vec![p]);
    }

    #[test]
    fn test_detach_running_keeps_player_and_username() {
        let mut sessions = Sessions::default();
        let mut host = Host::default();
        let (a, _ra) = connect(&mut sessions, "alice");
        let p = sessions.attach(a, None, false, &mut host).unwrap().player.unwrap();
        host.phase = GamePhase::Running;

        let d = sessions.detach(a, &mut host).unwrap();

        assert_eq!(d.removed, None);
        let player = sessions.roster().get(p).unwrap();
        assert_eq!(player.username, "alice");
        assert!(!player.is_connected);
        assert!(player.connections().is_empty());
    }

    #[test]
    fn test_detach_pregame_keeps_player_with_content() {
        let mut sessions = Sessions::default();
        let mut host = Host::default();
        let (a, _ra) = connect(&mut sessions, "alice");
        let p = sessions.attach(a, None, false, &mut host).unwrap().player.unwrap();
        sessions.roster_mut().get_mut(p).unwrap().has_content = true;

        sessions.detach(a, &mut host).unwrap();

        let player = sessions.roster().get(p).unwrap();
        assert!(player.is_unassigned());
        assert!(host.removed.is_empty());
    }

    #[test]
    fn test_detach_observer_leaves_controller_connected() {
        let mut sessions = Sessions::default();
        let mut host = Host::default();
        let (a, _ra) = connect(&mut sessions, "alice");
        let (b, _rb) = connect(&mut sessions, "bob");
        let p = sessions.attach(a, None, false, &mut host).unwrap().player.unwrap();
        sessions.attach(b, Some(p), true, &mut host).unwrap();

        let d = sessions.detach(b, &mut host).unwrap();

        assert!(d.observer);
        let player = sessions.roster().get(p).unwrap();
        assert!(player.is_connected);
        assert_eq!(player.connections(), &[a]);
    }
}
