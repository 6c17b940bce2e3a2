//! The single owner of session state.
//!
//! [`Authority`] holds the registry, the roster, the vote manager and the
//! authentication handshake, and applies every client message to them one
//! at a time. The server actor owns exactly one; tests drive one directly
//! with plain channels, no sockets involved.
//!
//! ```text
//! accept ──▶ Login ──▶ (password prompts) ──▶ establish ──▶ attach
//!                 │                                │
//!                 └── reject ──▶ lose_connection ◀─┴── Disconnect / socket closed
//! ```

use std::net::SocketAddr;
use std::time::Instant;

use warden_auth::{
    check_capabilities, normalize_username, AuthOutcome, AuthRejected, AuthSession,
    CredentialStore, Handshake,
};
use warden_protocol::{
    AccessLevel, Ballot, ClientMessage, ConnectionId, GamePhase, Notification, ServerMessage,
};
use warden_session::{
    Attachment, CommandCatalog, CommandSpec, Connection, Detachment, GameHost, Outbox, Player,
    Sessions,
};
use warden_vote::{CastOutcome, Electorate, Resolution, VoteManager};

use crate::command::{split_line, CommandError, CommandExecutor};
use crate::notify::{Broadcast, Notifier};
use crate::ServerConfig;

pub(crate) type Gate = Handshake<Box<dyn CredentialStore>>;

/// Voting eligibility as the session layer sees it.
pub(crate) struct Voters<'a>(pub(crate) &'a Sessions);

impl Electorate for Voters<'_> {
    fn can_vote(&self, conn: ConnectionId) -> bool {
        self.0.connection_can_vote(conn)
    }

    fn voter_count(&self) -> usize {
        self.0.voter_count()
    }
}

/// Connection lifecycle, command dispatch and votes for one server.
///
/// `G` is the game: it reports the phase, gets catch-up and player hooks,
/// and runs every command that is not a session command.
pub struct Authority<G> {
    pub(crate) sessions: Sessions,
    pub(crate) votes: VoteManager,
    pub(crate) handshake: Gate,
    pub(crate) catalog: CommandCatalog,
    pub(crate) capability: String,
    pub(crate) notifier: Box<dyn Notifier>,
    pub(crate) game: G,
}

impl<G: GameHost + CommandExecutor> Authority<G> {
    pub fn new(config: &ServerConfig, store: Box<dyn CredentialStore>, game: G) -> Self {
        Self {
            sessions: Sessions::new(config.session.clone()),
            votes: VoteManager::new(),
            handshake: Handshake::new(config.auth.clone(), store),
            catalog: config.catalog(),
            capability: config.capability.clone(),
            notifier: Box::new(Broadcast),
            game,
        }
    }

    /// Replaces the default [`Broadcast`] notifier.
    pub fn with_notifier(mut self, notifier: impl Notifier) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    pub fn votes(&self) -> &VoteManager {
        &self.votes
    }

    pub fn catalog(&self) -> &CommandCatalog {
        &self.catalog
    }

    pub fn game(&self) -> &G {
        &self.game
    }

    pub fn game_mut(&mut self) -> &mut G {
        &mut self.game
    }

    /// Registers a freshly accepted socket. It stays unestablished until
    /// its login goes through.
    pub fn accept(&mut self, addr: SocketAddr, outbox: Outbox) -> ConnectionId {
        let conn_id = self.sessions.registry_mut().accept(addr, outbox);
        tracing::info!(%conn_id, %addr, "connection accepted");
        conn_id
    }

    /// Applies one client message.
    pub fn handle_message(&mut self, conn_id: ConnectionId, message: ClientMessage, now: Instant) {
        match message {
            ClientMessage::Login {
                username,
                capability,
            } => self.handle_login(conn_id, &username, &capability, now),
            ClientMessage::Password { password } => self.handle_password(conn_id, &password, now),
            ClientMessage::Command { line } => self.handle_command(conn_id, &line),
            ClientMessage::Disconnect => self.lose_connection(conn_id),
        }
    }

    // -----------------------------------------------------------------------
    // Login
    // -----------------------------------------------------------------------

    /// First message of every connection.
    ///
    /// Checks run in order: capabilities both ways, username syntax, no
    /// other connection with the same name (guests included). Then either
    /// the handshake starts or, with authentication off, the connection is
    /// established at once.
    pub fn handle_login(
        &mut self,
        conn_id: ConnectionId,
        username: &str,
        capability: &str,
        now: Instant,
    ) {
        let Some(conn) = self.sessions.connection_mut(conn_id) else {
            return;
        };
        if conn.established || !conn.username.is_empty() {
            tracing::debug!(%conn_id, "ignoring repeated login");
            return;
        }
        conn.capability = capability.to_string();
        tracing::info!(%conn_id, username, addr = %conn.addr(), "login request");

        if let Err(reason) = check_capabilities(&self.capability, capability) {
            self.reject(conn_id, username, reason);
            return;
        }
        let name = match normalize_username(username) {
            Ok(name) => name,
            Err(reason) => {
                self.reject(conn_id, username, reason);
                return;
            }
        };
        if self.sessions.registry().is_username_taken(&name, conn_id) {
            self.reject(conn_id, &name, AuthRejected::DuplicateLogin(name.clone()));
            return;
        }
        let Some(conn) = self.sessions.connection_mut(conn_id) else {
            return;
        };
        conn.username = name;

        if !self.handshake.config().enabled {
            conn.auth.mark_established();
            self.establish(conn_id);
            return;
        }
        self.drive(conn_id, |handshake, auth, sessions, name| {
            handshake.begin(
                auth,
                name,
                |other| sessions.registry().is_username_taken(other, conn_id),
                now,
            )
        });
    }

    /// A password reply. Ignored unless the handshake is waiting for one.
    pub fn handle_password(&mut self, conn_id: ConnectionId, password: &str, now: Instant) {
        match self.sessions.connection(conn_id) {
            Some(conn) if !conn.established && !conn.username.is_empty() => {}
            _ => {
                tracing::debug!(%conn_id, "ignoring password outside a handshake");
                return;
            }
        }
        self.drive(conn_id, |handshake, auth, _, name| {
            handshake.receive_password(auth, name, password, now)
        });
    }

    /// Periodic housekeeping: retry deadlines and prompt expiry.
    pub fn tick(&mut self, now: Instant) {
        let waiting: Vec<ConnectionId> = self
            .sessions
            .registry()
            .iter()
            .filter(|c| !c.established && c.auth.needs_tick())
            .map(Connection::id)
            .collect();
        for conn_id in waiting {
            self.drive(conn_id, |handshake, auth, _, _| handshake.tick(auth, now));
        }
    }

    /// Runs one handshake step on a connection's [`AuthSession`] and
    /// applies the outcome.
    fn drive(
        &mut self,
        conn_id: ConnectionId,
        step: impl FnOnce(&mut Gate, &mut AuthSession, &Sessions, &str) -> AuthOutcome,
    ) {
        let Some(conn) = self.sessions.connection_mut(conn_id) else {
            return;
        };
        let mut auth = std::mem::take(&mut conn.auth);
        let username = conn.username.clone();

        let outcome = step(&mut self.handshake, &mut auth, &self.sessions, &username);

        if let Some(conn) = self.sessions.connection_mut(conn_id) {
            conn.auth = auth;
        }
        self.apply_outcome(conn_id, &username, outcome);
    }

    fn apply_outcome(&mut self, conn_id: ConnectionId, username: &str, outcome: AuthOutcome) {
        match outcome {
            AuthOutcome::Pending => {}
            AuthOutcome::Prompt { kind, message } => {
                self.send(conn_id, ServerMessage::PasswordPrompt { kind, message });
            }
            AuthOutcome::Establish { username, notice } => {
                if let Some(conn) = self.sessions.connection_mut(conn_id) {
                    conn.username = username;
                }
                if let Some(text) = notice {
                    self.send(conn_id, ServerMessage::notice(text));
                }
                self.establish(conn_id);
            }
            AuthOutcome::Reject(reason) => self.reject(conn_id, username, reason),
        }
    }

    /// Refuses a login: final join reply, a notification, then the
    /// connection is dropped.
    pub fn reject(&mut self, conn_id: ConnectionId, username: &str, reason: AuthRejected) {
        tracing::info!(%conn_id, username, %reason, "login rejected");
        self.send(
            conn_id,
            ServerMessage::JoinReply {
                accepted: false,
                message: reason.to_string(),
                conn_id: None,
                capability: self.capability.clone(),
            },
        );
        self.notify(Notification::Rejected {
            username: username.to_string(),
            reason: reason.to_string(),
        });
        self.lose_connection(conn_id);
    }

    /// Makes a connection a trusted participant and binds it.
    ///
    /// The connection reattaches to the player carrying its username if
    /// there is one. Otherwise, before the game starts, it takes a free
    /// player or gets a new one; once the game runs it stays unbound.
    pub fn establish(&mut self, conn_id: ConnectionId) {
        let level = self.sessions.access_for_next_connection();
        let Some(conn) = self.sessions.connection_mut(conn_id) else {
            return;
        };
        conn.established = true;
        conn.auth.mark_established();
        let username = conn.username.clone();
        let addr = conn.addr();
        if let Err(e) = self.sessions.set_access(conn_id, level, true) {
            tracing::warn!(%conn_id, error = %e, "could not set access level");
        }
        tracing::info!(%conn_id, username, %addr, %level, "connection established");

        self.send(
            conn_id,
            ServerMessage::JoinReply {
                accepted: true,
                message: format!("{username} has connected from {}.", addr.ip()),
                conn_id: Some(conn_id),
                capability: self.capability.clone(),
            },
        );
        self.send(conn_id, ServerMessage::AccessLevel { level });
        self.notify(Notification::Joined {
            conn_id,
            username: username.clone(),
            addr: addr.to_string(),
        });
        self.announce_first_access();

        let existing = self
            .sessions
            .roster()
            .find_by_username(&username)
            .map(Player::id);
        let result = match existing {
            Some(player) => Some(self.sessions.attach(conn_id, Some(player), false, &mut self.game)),
            None if self.game.phase() == GamePhase::PreGame => {
                Some(self.sessions.attach(conn_id, None, false, &mut self.game))
            }
            None => None,
        };
        let text = match result {
            Some(Ok(attachment)) => self.report_attach(conn_id, attachment),
            Some(Err(e)) => {
                tracing::warn!(%conn_id, error = %e, "no player for new connection");
                format!("Could not attach you to a player: {e}.")
            }
            None => self.describe_binding(conn_id),
        };
        self.send(conn_id, ServerMessage::notice(text));
    }

    // -----------------------------------------------------------------------
    // Disconnect
    // -----------------------------------------------------------------------

    /// Tears a connection down. Safe to call for an id that is already
    /// gone.
    ///
    /// An active delegation is restored first so the original player gets
    /// its binding back. Then the connection is detached, its votes and
    /// ballots are withdrawn, and it leaves the registry. Dropping the
    /// registry entry drops the outbox, which closes the socket.
    pub fn lose_connection(&mut self, conn_id: ConnectionId) {
        let Some(conn) = self.sessions.connection(conn_id) else {
            return;
        };
        let established = conn.established;
        let username = conn.username.clone();
        let delegating = conn.delegation().is_some();
        tracing::info!(%conn_id, username, established, "lost connection");

        if delegating {
            if let Err(e) = self.sessions.delegate_restore(conn_id, &mut self.game) {
                tracing::warn!(%conn_id, error = %e, "delegation not restored on disconnect");
                self.sessions.abandon_delegation(conn_id);
            }
        }
        match self.sessions.detach(conn_id, &mut self.game) {
            Ok(detachment) => self.report_detach(conn_id, &detachment),
            Err(e) => tracing::debug!(%conn_id, error = %e, "detach on disconnect failed"),
        }

        let cancelled = self.votes.cancel(conn_id, &Voters(&self.sessions));
        if let Some(vote) = cancelled.authored {
            self.notify(Notification::VoteCancelled {
                number: vote.number(),
                command: vote.command().to_string(),
            });
        }
        for resolution in cancelled.resolutions {
            self.resolve(resolution);
        }

        if established {
            self.notify(Notification::Left {
                conn_id,
                username,
            });
        }
        self.sessions.registry_mut().remove(conn_id);
        if established {
            self.announce_first_access();
        }
    }

    /// Drops every connection. Used on shutdown.
    pub fn lose_all(&mut self) {
        self.broadcast_notice("Server is shutting down.");
        let ids: Vec<ConnectionId> = self.sessions.registry().iter().map(Connection::id).collect();
        for conn_id in ids {
            self.lose_connection(conn_id);
        }
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Runs a command line from an established connection and sends the
    /// reply back to it.
    pub fn handle_command(&mut self, conn_id: ConnectionId, line: &str) {
        if !self
            .sessions
            .connection(conn_id)
            .is_some_and(|c| c.established)
        {
            tracing::debug!(%conn_id, "ignoring command before login");
            return;
        }
        let reply = match self.dispatch(conn_id, line) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(%conn_id, line, error = %e, "command refused");
                e.to_string()
            }
        };
        if !reply.is_empty() {
            self.send(conn_id, ServerMessage::notice(reply));
        }
    }

    /// Level check for a connection's command.
    ///
    /// Below the required level, an `info` caller who may vote turns a
    /// `ctrl` command into a vote instead of being refused.
    fn dispatch(&mut self, conn_id: ConnectionId, line: &str) -> Result<String, CommandError> {
        let Some((word, args)) = split_line(line) else {
            return Ok(String::new());
        };
        let spec = self.catalog.lookup(word)?.clone();
        let level = self.caller_level(Some(conn_id));

        if level == AccessLevel::None {
            return Err(CommandError::NoServerCommands);
        }
        if self.sessions.is_allowed(conn_id, &spec) {
            return self.run_command(Some(conn_id), &spec, args);
        }
        if level == AccessLevel::Info
            && spec.level == AccessLevel::Ctrl
            && self.sessions.connection_can_vote(conn_id)
        {
            return self.call_vote(conn_id, canonical_line(&spec, args));
        }
        Err(CommandError::NotAllowed)
    }

    /// Runs a full line with the server's own authority.
    pub fn run_line(&mut self, line: &str) -> Result<String, CommandError> {
        let Some((word, args)) = split_line(line) else {
            return Ok(String::new());
        };
        let spec = self.catalog.lookup(word)?.clone();
        self.run_command(None, &spec, args)
    }

    /// The caller's current level. The server itself (`None`) has every
    /// level.
    pub(crate) fn caller_level(&self, caller: Option<ConnectionId>) -> AccessLevel {
        match caller {
            None => AccessLevel::Hack,
            Some(id) => self
                .sessions
                .connection(id)
                .map_or(AccessLevel::None, Connection::current_level),
        }
    }

    // -----------------------------------------------------------------------
    // Votes
    // -----------------------------------------------------------------------

    fn call_vote(&mut self, conn_id: ConnectionId, line: String) -> Result<String, CommandError> {
        self.game.validate(&line).map_err(CommandError::Failed)?;
        let caller = self.username_of(conn_id);

        let new = self
            .votes
            .new_vote(conn_id, line.clone(), &Voters(&self.sessions))?;
        if let Some(old) = new.replaced {
            self.send(
                conn_id,
                ServerMessage::notice("Your new vote cancelled your previous vote."),
            );
            self.notify(Notification::VoteCancelled {
                number: old.number(),
                command: old.command().to_string(),
            });
        }
        self.notify(Notification::VoteStarted {
            number: new.number,
            caller: caller.clone(),
            command: line.clone(),
        });

        self.cast_ballot(conn_id, new.number, Ballot::Yes)?;
        Ok(format!("New vote (number {}) by {caller}: {line}.", new.number))
    }

    /// Records a ballot, announces it, and resolves the vote if the ballot
    /// decided it.
    pub(crate) fn cast_ballot(
        &mut self,
        voter: ConnectionId,
        number: u32,
        ballot: Ballot,
    ) -> Result<String, CommandError> {
        let outcome = self
            .votes
            .cast(voter, number, ballot, &Voters(&self.sessions))?;
        let tally = match &outcome {
            CastOutcome::Counted(tally) => *tally,
            CastOutcome::Resolved(resolution) => resolution.tally,
        };
        self.notify(Notification::BallotCast {
            number,
            voter: self.username_of(voter),
            ballot,
            yes: tally.yes,
            no: tally.no,
            abstain: tally.abstain,
            voters: tally.voters,
        });
        if let CastOutcome::Resolved(resolution) = outcome {
            self.resolve(resolution);
        }
        Ok(format!("You voted {ballot} on vote {number}."))
    }

    /// Announces a decided vote and, if it passed, runs its command with
    /// the server's authority.
    fn resolve(&mut self, resolution: Resolution) {
        let Resolution {
            number,
            ref command,
            passed,
            tally,
            ..
        } = resolution;
        tracing::info!(number, %command, passed, "vote resolved");
        self.notify(Notification::VoteResolved {
            number,
            command: command.clone(),
            passed,
            yes: tally.yes,
            no: tally.no,
            abstain: tally.abstain,
            not_voted: tally.not_voted(),
        });
        self.broadcast_notice(resolution.summary());

        if !passed {
            return;
        }
        match self.run_line(&resolution.command) {
            Ok(text) if !text.is_empty() => self.broadcast_notice(text),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(number, error = %e, "passed vote failed to run");
                self.broadcast_notice(format!("Vote {number} passed but its command failed: {e}"));
            }
        }
    }

    /// End-of-turn pass: every open vote is recounted against who may vote
    /// now, and any that became decided are resolved.
    pub fn turn_boundary(&mut self) {
        let resolutions = self.votes.turn_boundary(&Voters(&self.sessions));
        tracing::debug!(resolved = resolutions.len(), "turn boundary");
        for resolution in resolutions {
            self.resolve(resolution);
        }
    }

    // -----------------------------------------------------------------------
    // Reporting
    // -----------------------------------------------------------------------

    /// Notifies an attach and returns the text describing the new binding.
    pub(crate) fn report_attach(&mut self, conn_id: ConnectionId, attachment: Attachment) -> String {
        self.notify(Notification::Attached {
            conn_id,
            username: self.username_of(conn_id),
            player: attachment.player,
            observer: attachment.observer,
        });
        self.describe_binding(conn_id)
    }

    pub(crate) fn report_detach(&mut self, conn_id: ConnectionId, detachment: &Detachment) {
        if detachment.player.is_none() && !detachment.observer {
            return;
        }
        self.notify(Notification::Detached {
            conn_id,
            username: self.username_of(conn_id),
            player: detachment.player,
        });
        for &evicted in &detachment.evicted {
            self.notify(Notification::Detached {
                conn_id: evicted,
                username: self.username_of(evicted),
                player: detachment.player,
            });
            if let Some(player) = detachment.removed {
                self.send(
                    evicted,
                    ServerMessage::notice(format!(
                        "Player {player} was removed; you are no longer observing it."
                    )),
                );
            }
        }
    }

    /// One line about what a connection is bound to.
    pub(crate) fn describe_binding(&self, conn_id: ConnectionId) -> String {
        let Some(conn) = self.sessions.connection(conn_id) else {
            return String::new();
        };
        let name = conn.describe();
        match conn.player().and_then(|p| self.sessions.roster().get(p)) {
            Some(player) if conn.is_observer() => format!("{name} observes {}.", player.name),
            Some(player) => format!("{name} controls {}.", player.name),
            None if conn.is_observer() => format!("{name} observes the whole game."),
            None => format!("{name} is not attached to any player."),
        }
    }

    pub(crate) fn username_of(&self, conn_id: ConnectionId) -> String {
        self.sessions
            .connection(conn_id)
            .map(Connection::describe)
            .unwrap_or_else(|| conn_id.to_string())
    }

    fn announce_first_access(&mut self) {
        if self.sessions.registry().established().next().is_some()
            && self.sessions.first_access_available()
        {
            let level = self.sessions.first_access();
            self.broadcast_notice(format!(
                "Anyone can now become game organizer '{level}' by issuing the 'firstlevel' command."
            ));
        }
    }

    pub(crate) fn send(&self, conn_id: ConnectionId, msg: ServerMessage) {
        if let Some(conn) = self.sessions.connection(conn_id) {
            if !conn.send(msg) {
                tracing::debug!(%conn_id, "outbox closed, message dropped");
            }
        }
    }

    pub(crate) fn broadcast_notice(&self, text: impl Into<String>) {
        self.sessions
            .registry()
            .broadcast(&ServerMessage::notice(text));
    }

    pub(crate) fn notify(&mut self, notification: Notification) {
        tracing::debug!(?notification, "notify");
        self.notifier.notify(self.sessions.registry(), &notification);
    }
}

/// The line a command runs as: catalog name plus arguments.
pub(crate) fn canonical_line(spec: &CommandSpec, args: &str) -> String {
    if args.is_empty() {
        spec.name.clone()
    } else {
        format!("{} {args}", spec.name)
    }
}
