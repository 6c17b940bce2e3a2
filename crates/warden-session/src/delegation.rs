//! Temporary control of another player.
//!
//! `delegate_take` remembers where a connection was, moves it onto the
//! target as controller, and `delegate_restore` puts everything back:
//! the connection's old binding and the target's old username. Both are
//! all-or-nothing.
//!
//! While the delegation lasts, the player the connection used to control
//! has no controller at all. Left like that it would look free: a
//! newcomer could be handed it, and in pre-game the last observer
//! leaving would delete it. So the player is reserved for the delegating
//! connection from the take until the restore. A reserved player is
//! never offered as a free slot, never removed on detach, and refuses
//! every controller except the one holding the reservation. Observers
//! are unaffected.

use warden_protocol::{ConnectionId, PlayerId};

use crate::{Attachment, BindingError, Delegation, GameHost, Sessions};

impl Sessions {
    /// Makes `conn_id` the controller of `target` until
    /// [`delegate_restore`](Self::delegate_restore).
    ///
    /// On failure the connection is back on its original binding.
    ///
    /// # Panics
    /// If the connection already has an active delegation.
    ///
    /// # Errors
    /// [`BindingError::DelegationTargetUnavailable`] when the target does
    /// not exist, or whatever the attach to the target returned.
    pub fn delegate_take(
        &mut self,
        conn_id: ConnectionId,
        target: PlayerId,
        host: &mut dyn GameHost,
    ) -> Result<Attachment, BindingError> {
        let conn = self
            .registry
            .get(conn_id)
            .ok_or(BindingError::UnknownConnection(conn_id))?;
        assert!(
            conn.delegation.is_none(),
            "{conn_id} started a second delegation"
        );
        let original_player = conn.player;
        let original_observer = conn.observer;
        let was_bound = !conn.is_unbound();

        let original_username = match self.roster.get(target) {
            Some(p) if !p.being_removed => p.username.clone(),
            _ => return Err(BindingError::DelegationTargetUnavailable(target)),
        };

        let reserved = original_player.filter(|_| !original_observer);
        self.reserve(reserved, Some(conn_id));
        if was_bound {
            if let Err(e) = self.release(conn_id, host) {
                self.reserve(reserved, None);
                return Err(e);
            }
        }
        match self.attach(conn_id, Some(target), false, host) {
            Ok(attachment) => {
                let conn = self.registry.get_mut(conn_id).expect("attached above");
                conn.delegation = Some(Delegation {
                    target,
                    original_player,
                    original_observer,
                    original_username,
                });
                tracing::info!(%conn_id, player = %target, "delegation started");
                Ok(attachment)
            }
            Err(e) => {
                if let Err(restore) =
                    self.rebind(conn_id, original_player, original_observer, host)
                {
                    tracing::error!(%conn_id, error = %restore, "could not return to original binding");
                }
                self.reserve(reserved, None);
                Err(e)
            }
        }
    }

    /// Ends the delegation of `conn_id`.
    ///
    /// Returns the restored attachment, `None` if the connection was
    /// unbound before the delegation.
    ///
    /// # Panics
    /// If the connection has no active delegation.
    ///
    /// # Errors
    /// Whatever re-attaching to the original binding returned. The
    /// connection then stays where it was, delegation included.
    pub fn delegate_restore(
        &mut self,
        conn_id: ConnectionId,
        host: &mut dyn GameHost,
    ) -> Result<Option<Attachment>, BindingError> {
        let conn = self
            .registry
            .get(conn_id)
            .ok_or(BindingError::UnknownConnection(conn_id))?;
        let Some(delegation) = conn.delegation.clone() else {
            panic!("{conn_id} restored without an active delegation");
        };
        let current_player = conn.player;
        let current_observer = conn.observer;

        self.release(conn_id, host)?;
        match self.rebind(
            conn_id,
            delegation.original_player,
            delegation.original_observer,
            host,
        ) {
            Ok(attachment) => {
                if !delegation.original_observer {
                    self.reserve(delegation.original_player, None);
                }
                if self.controller_of(delegation.target).is_none() {
                    if let Some(player) = self.roster.get_mut(delegation.target) {
                        player.username = delegation.original_username;
                    }
                }
                if let Some(conn) = self.registry.get_mut(conn_id) {
                    conn.delegation = None;
                }
                tracing::info!(%conn_id, player = %delegation.target, "delegation ended");
                Ok(attachment)
            }
            Err(e) => {
                if let Err(again) = self.rebind(conn_id, current_player, current_observer, host) {
                    tracing::error!(%conn_id, error = %again, "could not return to delegated binding");
                }
                Err(e)
            }
        }
    }

    /// Forgets the delegation of `conn_id` without moving the connection,
    /// and frees the player it was holding. For a connection that is going
    /// away after [`delegate_restore`](Self::delegate_restore) failed.
    pub fn abandon_delegation(&mut self, conn_id: ConnectionId) -> Option<Delegation> {
        let delegation = self.registry.get_mut(conn_id)?.delegation.take()?;
        if !delegation.original_observer {
            self.reserve(delegation.original_player, None);
        }
        tracing::info!(%conn_id, player = %delegation.target, "delegation abandoned");
        Some(delegation)
    }

    /// The delegating connection holding `player`, if any.
    pub fn reserved_for(&self, player: PlayerId) -> Option<ConnectionId> {
        self.roster.get(player)?.reserved_by
    }

    fn reserve(&mut self, player: Option<PlayerId>, by: Option<ConnectionId>) {
        if let Some(player) = player.and_then(|id| self.roster.get_mut(id)) {
            player.reserved_by = by;
        }
    }
}
