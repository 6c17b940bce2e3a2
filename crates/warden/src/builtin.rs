//! Session commands the authority runs itself.
//!
//! `caller` is `None` when the server runs the line, as it does for a
//! passed vote. Commands acting on "my connection" refuse that case with
//! [`CommandError::NeedsCaller`]; the others treat the server as `hack`.

use std::fmt::Write as _;

use warden_protocol::{AccessLevel, Ballot, ConnectionId, Notification, PlayerId, ServerMessage};
use warden_session::{BindingError, CommandSpec, Connection, GameHost, Player};
use warden_vote::{Vote, VoteError};

use crate::authority::canonical_line;
use crate::command::{tokens, CommandError, CommandExecutor};
use crate::Authority;

impl<G: GameHost + CommandExecutor> Authority<G> {
    /// Runs a catalog command whose level check has already passed.
    pub(crate) fn run_command(
        &mut self,
        caller: Option<ConnectionId>,
        spec: &CommandSpec,
        args: &str,
    ) -> Result<String, CommandError> {
        tracing::debug!(caller = ?caller, command = %spec.name, args, "running command");
        match spec.name.as_str() {
            "list" => Ok(self.cmd_list()),
            "vote" => self.cmd_vote(caller, args),
            "cancelvote" => self.cmd_cancelvote(caller, args),
            "take" => self.cmd_take(caller, args),
            "observe" => self.cmd_observe(caller, args),
            "detach" => self.cmd_detach(caller, args),
            "delegate" => self.cmd_delegate(caller, args),
            "cmdlevel" => self.cmd_cmdlevel(caller, args),
            "firstlevel" => self.cmd_firstlevel(caller),
            _ => self
                .game
                .execute(caller, &canonical_line(spec, args))
                .map_err(CommandError::Failed),
        }
    }

    // -----------------------------------------------------------------------
    // list
    // -----------------------------------------------------------------------

    fn cmd_list(&self) -> String {
        let mut out = String::from("Connections:");
        for conn in self.sessions.registry().established() {
            let _ = write!(
                out,
                "\n  {} ({}) {}: {}",
                conn.describe(),
                conn.id(),
                conn.current_level(),
                self.describe_binding(conn.id())
            );
        }
        out.push_str("\nPlayers:");
        for player in self.sessions.roster().iter() {
            let _ = write!(
                out,
                "\n  {} [{}] user {}{}{}",
                player.name,
                player.id(),
                player.username,
                if player.is_connected { ", connected" } else { "" },
                if player.ai_controlled { ", AI" } else { "" },
            );
        }
        if !self.votes.is_empty() {
            out.push_str("\nVotes:");
            for vote in self.votes.iter() {
                let t = vote.tally();
                let _ = write!(
                    out,
                    "\n  {} \"{}\" by {}: {} yes, {} no, {} abstain of {}",
                    vote.number(),
                    vote.command(),
                    self.username_of(vote.caller()),
                    t.yes,
                    t.no,
                    t.abstain,
                    t.voters
                );
            }
        }
        out
    }

    // -----------------------------------------------------------------------
    // vote / cancelvote
    // -----------------------------------------------------------------------

    fn cmd_vote(&mut self, caller: Option<ConnectionId>, args: &str) -> Result<String, CommandError> {
        let voter = caller.ok_or(CommandError::NeedsCaller("vote"))?;
        let usage = || CommandError::Usage("vote yes|no|abstain [vote number]");
        let args = tokens(args);
        let (ballot, number) = match args.as_slice() {
            [ballot] => (*ballot, None),
            [ballot, number] => (*ballot, Some(*number)),
            _ => return Err(usage()),
        };
        let ballot: Ballot = ballot.parse().map_err(|_| usage())?;
        let number = match number {
            Some(n) => n.parse::<u32>().map_err(|_| usage())?,
            None => self
                .votes
                .last_vote()
                .map(Vote::number)
                .ok_or_else(|| CommandError::Failed("There are no votes going on.".into()))?,
        };
        if self.votes.get(number).is_none() {
            return Err(VoteError::NotFound(number).into());
        }
        if !self.sessions.connection_can_vote(voter) {
            return Err(CommandError::Failed(
                "You must control a living player to vote.".into(),
            ));
        }
        self.cast_ballot(voter, number, ballot)
    }

    /// Without a number, cancels the caller's own vote. With one, any vote
    /// the caller started, or any vote at all from `ctrl` up.
    fn cmd_cancelvote(
        &mut self,
        caller: Option<ConnectionId>,
        args: &str,
    ) -> Result<String, CommandError> {
        let usage = || CommandError::Usage("cancelvote [vote number]");
        let number = match tokens(args).as_slice() {
            [] => {
                let conn_id = caller.ok_or(CommandError::NeedsCaller("cancelvote"))?;
                self.votes
                    .vote_by_caller(conn_id)
                    .map(Vote::number)
                    .ok_or_else(|| CommandError::Failed("You don't have any vote going on.".into()))?
            }
            [n] => {
                let number = n.parse::<u32>().map_err(|_| usage())?;
                let vote = self.votes.get(number).ok_or(VoteError::NotFound(number))?;
                let own = caller.is_some_and(|c| c == vote.caller());
                if !own && self.caller_level(caller) < AccessLevel::Ctrl {
                    return Err(CommandError::Failed(
                        "You are not allowed to cancel this vote.".into(),
                    ));
                }
                number
            }
            _ => return Err(usage()),
        };

        let vote = self
            .votes
            .cancel_vote(number)
            .ok_or(VoteError::NotFound(number))?;
        self.notify(Notification::VoteCancelled {
            number,
            command: vote.command().to_string(),
        });
        self.broadcast_notice(format!("Vote {number} \"{}\" has been cancelled.", vote.command()));
        Ok(String::new())
    }

    // -----------------------------------------------------------------------
    // take / observe / detach
    // -----------------------------------------------------------------------

    /// `take [connection] <player>`; `-` as the player means "any free
    /// player, or a new one".
    fn cmd_take(&mut self, caller: Option<ConnectionId>, args: &str) -> Result<String, CommandError> {
        const USAGE: &str = "take [connection-name] <player-name>";
        let args = tokens(args);
        let (conn_arg, player_arg) = match args.as_slice() {
            [player] => (None, *player),
            [conn, player] => (Some(*conn), *player),
            _ => return Err(CommandError::Usage(USAGE)),
        };
        let conn_id = self.target_connection(caller, conn_arg, USAGE)?;
        self.ensure_not_delegating(conn_id)?;
        let target = match player_arg {
            "-" => None,
            name => Some(self.find_player(name)?),
        };
        let (old_player, old_observer) = self.binding_of(conn_id)?;

        if let Some(player) = target {
            if old_player == Some(player) && !old_observer {
                return Err(BindingError::AlreadyBound.into());
            }
            if let Some(by) = self.sessions.reserved_for(player) {
                return Err(BindingError::PlayerControlled { player, by }.into());
            }
            if let Some(other) = self.sessions.controller_of(player) {
                if self.caller_level(caller) < AccessLevel::Hack {
                    return Err(BindingError::PlayerControlled { player, by: other }.into());
                }
                let detachment = self.sessions.release(other, &mut self.game)?;
                self.report_detach(other, &detachment);
                self.send(
                    other,
                    ServerMessage::notice("Your player was taken over; you are now detached."),
                );
            }
        }

        self.unbind_for_move(conn_id, target, old_player)?;
        self.bind_or_restore(conn_id, target, false, old_player, old_observer)
    }

    /// `observe [connection] [player]`; no player observes the whole game.
    fn cmd_observe(
        &mut self,
        caller: Option<ConnectionId>,
        args: &str,
    ) -> Result<String, CommandError> {
        const USAGE: &str = "observe [connection-name] [player-name]";
        let args = tokens(args);
        let (conn_arg, player_arg) = match args.as_slice() {
            [] => (None, None),
            [player] => (None, Some(*player)),
            [conn, player] => (Some(*conn), Some(*player)),
            _ => return Err(CommandError::Usage(USAGE)),
        };
        let conn_id = self.target_connection(caller, conn_arg, USAGE)?;
        self.ensure_not_delegating(conn_id)?;
        let target = player_arg.map(|name| self.find_player(name)).transpose()?;
        let (old_player, old_observer) = self.binding_of(conn_id)?;
        if old_observer && old_player == target {
            return Err(BindingError::AlreadyBound.into());
        }

        self.unbind_for_move(conn_id, target, old_player)?;
        self.bind_or_restore(conn_id, target, true, old_player, old_observer)
    }

    fn cmd_detach(&mut self, caller: Option<ConnectionId>, args: &str) -> Result<String, CommandError> {
        const USAGE: &str = "detach [connection-name]";
        let conn_arg = match tokens(args).as_slice() {
            [] => None,
            [conn] => Some(*conn),
            _ => return Err(CommandError::Usage(USAGE)),
        };
        let conn_id = self.target_connection(caller, conn_arg, USAGE)?;
        self.ensure_not_delegating(conn_id)?;
        let name = self.username_of(conn_id);
        if self.binding_of(conn_id)? == (None, false) {
            return Err(CommandError::Failed(format!(
                "{name} is not attached to any player."
            )));
        }

        let detachment = self.sessions.detach(conn_id, &mut self.game)?;
        self.report_detach(conn_id, &detachment);
        Ok(format!("{name} detached."))
    }

    // -----------------------------------------------------------------------
    // delegate
    // -----------------------------------------------------------------------

    fn cmd_delegate(
        &mut self,
        caller: Option<ConnectionId>,
        args: &str,
    ) -> Result<String, CommandError> {
        let conn_id = caller.ok_or(CommandError::NeedsCaller("delegate"))?;
        let delegating = self
            .sessions
            .connection(conn_id)
            .is_some_and(|c| c.delegation().is_some());

        match tokens(args).as_slice() {
            [verb, player] if verb.eq_ignore_ascii_case("take") => {
                if delegating {
                    return Err(CommandError::Failed(
                        "You are already delegating; use 'delegate restore' first.".into(),
                    ));
                }
                let target = self.find_player(player)?;
                let attachment = self.sessions.delegate_take(conn_id, target, &mut self.game)?;
                Ok(self.report_attach(conn_id, attachment))
            }
            [verb] if verb.eq_ignore_ascii_case("restore") => {
                if !delegating {
                    return Err(CommandError::Failed("You are not delegating.".into()));
                }
                match self.sessions.delegate_restore(conn_id, &mut self.game)? {
                    Some(attachment) => Ok(self.report_attach(conn_id, attachment)),
                    None => Ok(self.describe_binding(conn_id)),
                }
            }
            _ => Err(CommandError::Usage(
                "delegate take <player-name> | delegate restore",
            )),
        }
    }

    // -----------------------------------------------------------------------
    // cmdlevel / firstlevel
    // -----------------------------------------------------------------------

    /// `cmdlevel` shows levels. `cmdlevel <level>` sets every connection
    /// and the default for new ones; a second argument narrows it to one
    /// connection, or to `new` / `first` for the configured levels.
    ///
    /// Nobody can hand out more than they have, or lower someone above
    /// them.
    fn cmd_cmdlevel(
        &mut self,
        caller: Option<ConnectionId>,
        args: &str,
    ) -> Result<String, CommandError> {
        let own = self.caller_level(caller);
        let args = tokens(args);
        let (level, target) = match args.as_slice() {
            [] => return Ok(self.describe_levels()),
            [level] => (parse_level(level)?, None),
            [level, target] => (parse_level(level)?, Some(*target)),
            _ => {
                return Err(CommandError::Usage(
                    "cmdlevel [level [connection-name|new|first]]",
                ));
            }
        };
        if level > own {
            return Err(CommandError::Failed(format!(
                "You cannot raise command access level above your own ('{own}')."
            )));
        }

        match target {
            None => {
                let ids: Vec<ConnectionId> = self
                    .sessions
                    .registry()
                    .established()
                    .filter(|c| c.current_level() <= own)
                    .map(Connection::id)
                    .collect();
                for id in ids {
                    self.grant(id, level)?;
                }
                self.set_new_connection_level(level);
                Ok(format!(
                    "Command access level set to '{level}' for new players and all connections."
                ))
            }
            Some(t) if t.eq_ignore_ascii_case("new") => {
                self.set_new_connection_level(level);
                Ok(format!("Command access level set to '{level}' for new players."))
            }
            Some(t) if t.eq_ignore_ascii_case("first") => {
                self.sessions.set_first_access(level);
                if level < self.sessions.default_access() {
                    self.sessions.set_default_access(level);
                }
                Ok(format!(
                    "Command access level set to '{level}' for the first player to connect."
                ))
            }
            Some(name) => {
                let conn = self
                    .sessions
                    .registry()
                    .find(name)
                    .filter(|c| c.established)
                    .ok_or_else(|| CommandError::Failed(format!("No such connection '{name}'.")))?;
                let (id, current, who) = (conn.id(), conn.current_level(), conn.describe());
                if current > own {
                    return Err(CommandError::Failed(format!(
                        "Cannot decrease command access level '{current}' for connection \
                         '{who}'; you only have '{own}'."
                    )));
                }
                self.grant(id, level)?;
                Ok(format!(
                    "Command access level set to '{level}' for connection {who}."
                ))
            }
        }
    }

    /// Lets the caller claim the first-connection level if nobody holds it.
    fn cmd_firstlevel(&mut self, caller: Option<ConnectionId>) -> Result<String, CommandError> {
        let conn_id = caller.ok_or(CommandError::NeedsCaller("firstlevel"))?;
        let first = self.sessions.first_access();
        if self.caller_level(caller) >= first {
            return Err(CommandError::Failed(format!(
                "You already have command access level '{first}' or better."
            )));
        }
        if self.sessions.first_access_taken() {
            return Err(CommandError::Failed(
                "Someone else already is game organizer.".into(),
            ));
        }

        self.grant(conn_id, first)?;
        self.broadcast_notice(format!(
            "Connection {} has opted to become the game organizer.",
            self.username_of(conn_id)
        ));
        Ok(String::new())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Sets a connection's level for good and tells everyone.
    fn grant(&mut self, conn_id: ConnectionId, level: AccessLevel) -> Result<(), CommandError> {
        self.sessions.set_access(conn_id, level, true)?;
        self.send(conn_id, ServerMessage::AccessLevel { level });
        self.notify(Notification::AccessChanged {
            conn_id,
            username: self.username_of(conn_id),
            level,
        });
        Ok(())
    }

    fn set_new_connection_level(&mut self, level: AccessLevel) {
        self.sessions.set_default_access(level);
        if level > self.sessions.first_access() {
            self.sessions.set_first_access(level);
        }
    }

    fn describe_levels(&self) -> String {
        let mut out = format!(
            "Default level for new connections: '{}'. First connection: '{}'.",
            self.sessions.default_access(),
            self.sessions.first_access()
        );
        for conn in self.sessions.registry().established() {
            let _ = write!(out, "\n  {}: '{}'", conn.describe(), conn.current_level());
        }
        out
    }

    /// The connection a command acts on: the caller, or a named one, which
    /// takes `hack`.
    fn target_connection(
        &self,
        caller: Option<ConnectionId>,
        named: Option<&str>,
        usage: &'static str,
    ) -> Result<ConnectionId, CommandError> {
        match named {
            Some(name) => {
                if self.caller_level(caller) < AccessLevel::Hack {
                    return Err(CommandError::NotAllowed);
                }
                self.sessions
                    .registry()
                    .find(name)
                    .filter(|c| c.established)
                    .map(Connection::id)
                    .ok_or_else(|| CommandError::Failed(format!("No such connection '{name}'.")))
            }
            None => caller.ok_or(CommandError::Usage(usage)),
        }
    }

    fn find_player(&self, name: &str) -> Result<PlayerId, CommandError> {
        self.sessions
            .roster()
            .find(name)
            .map(Player::id)
            .ok_or_else(|| CommandError::Failed(format!("No such player '{name}'.")))
    }

    fn binding_of(&self, conn_id: ConnectionId) -> Result<(Option<PlayerId>, bool), CommandError> {
        let conn = self
            .sessions
            .connection(conn_id)
            .ok_or(BindingError::UnknownConnection(conn_id))?;
        Ok((conn.player(), conn.is_observer()))
    }

    fn ensure_not_delegating(&self, conn_id: ConnectionId) -> Result<(), CommandError> {
        if self
            .sessions
            .connection(conn_id)
            .is_some_and(|c| c.delegation().is_some())
        {
            return Err(CommandError::Failed(
                "You are delegating; use 'delegate restore' first.".into(),
            ));
        }
        Ok(())
    }

    /// Frees a connection before rebinding it. Moving within the same
    /// player must not throw that player away.
    fn unbind_for_move(
        &mut self,
        conn_id: ConnectionId,
        target: Option<PlayerId>,
        old_player: Option<PlayerId>,
    ) -> Result<(), CommandError> {
        let detachment = if old_player.is_some() && old_player == target {
            self.sessions.release(conn_id, &mut self.game)?
        } else {
            self.sessions.detach(conn_id, &mut self.game)?
        };
        self.report_detach(conn_id, &detachment);
        Ok(())
    }

    /// Attaches, or on failure puts the connection back where it was if
    /// that binding still exists.
    fn bind_or_restore(
        &mut self,
        conn_id: ConnectionId,
        target: Option<PlayerId>,
        observing: bool,
        old_player: Option<PlayerId>,
        old_observer: bool,
    ) -> Result<String, CommandError> {
        match self.sessions.attach(conn_id, target, observing, &mut self.game) {
            Ok(attachment) => Ok(self.report_attach(conn_id, attachment)),
            Err(e) => {
                if old_player.is_some() || old_observer {
                    match self
                        .sessions
                        .attach(conn_id, old_player, old_observer, &mut self.game)
                    {
                        Ok(attachment) => {
                            self.report_attach(conn_id, attachment);
                        }
                        Err(again) => {
                            tracing::warn!(%conn_id, error = %again, "old binding is gone");
                        }
                    }
                }
                Err(e.into())
            }
        }
    }
}

fn parse_level(word: &str) -> Result<AccessLevel, CommandError> {
    word.parse().map_err(|_| {
        CommandError::Failed(
            "Command access level must be one of 'none', 'info', 'ctrl', or 'hack'.".into(),
        )
    })
}
