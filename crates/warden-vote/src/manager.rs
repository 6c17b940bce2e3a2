//! The vote manager: every active vote on the server.
//!
//! The manager never decides who may vote. It asks an [`Electorate`],
//! which the authority layer implements over its connection registry, so
//! eligibility is always evaluated against the current state.
//!
//! # Concurrency note
//!
//! `VoteManager` is a plain `Vec` behind `&mut self`. It lives next to the
//! session state inside the server actor and is only touched from there,
//! so every change is applied in arrival order.

use warden_protocol::{Ballot, ConnectionId};

use crate::vote::{Resolution, Tally, Vote};
use crate::VoteError;

/// Who may vote right now.
pub trait Electorate {
    /// Established, bound to a living player, not observing, and at
    /// least `info`.
    fn can_vote(&self, conn: ConnectionId) -> bool;

    /// Number of connections for which [`can_vote`](Self::can_vote) holds.
    fn voter_count(&self) -> usize;
}

/// Result of [`VoteManager::new_vote`].
#[derive(Debug)]
pub struct NewVote {
    pub number: u32,
    /// The caller's previous vote, dropped to make room for this one.
    pub replaced: Option<Vote>,
}

/// Result of [`VoteManager::cast`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CastOutcome {
    /// The ballot was recorded; the vote stays open with this tally.
    Counted(Tally),
    /// The ballot decided the vote, which is no longer active.
    Resolved(Resolution),
}

/// Result of [`VoteManager::cancel`].
#[derive(Debug, Default)]
pub struct Cancelled {
    /// The vote the connection had called, if any.
    pub authored: Option<Vote>,
    /// Votes decided because the connection's ballots were withdrawn.
    pub resolutions: Vec<Resolution>,
}

/// All active votes, oldest first.
///
/// Votes are numbered from one counter that never goes back, so a number
/// seen in a notice always names the same vote even after it resolved.
/// Tallies are re-evaluated on every change against the electorate of
/// that moment: a voter who leaves shrinks the base and can decide a vote
/// without anyone casting a ballot.
#[derive(Debug, Default)]
pub struct VoteManager {
    votes: Vec<Vote>,
    last_number: u32,
}

impl VoteManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a vote on `command` called by `caller`.
    ///
    /// A caller has at most one active vote; an older one is dropped and
    /// returned in [`NewVote::replaced`].
    ///
    /// # Errors
    /// [`VoteError::Ineligible`] if `caller` may not vote.
    pub fn new_vote(
        &mut self,
        caller: ConnectionId,
        command: impl Into<String>,
        electorate: &impl Electorate,
    ) -> Result<NewVote, VoteError> {
        if !electorate.can_vote(caller) {
            return Err(VoteError::Ineligible(caller));
        }

        let replaced = self.remove_by_caller(caller);
        self.last_number += 1;
        let number = self.last_number;

        let mut vote = Vote::new(number, caller, command.into());
        vote.recount(electorate);
        tracing::info!(number, %caller, command = vote.command(), "vote opened");
        self.votes.push(vote);

        Ok(NewVote { number, replaced })
    }

    /// Records `voter`'s ballot on vote `number` and re-evaluates it.
    ///
    /// # Errors
    /// - [`VoteError::Ineligible`] if `voter` may not vote.
    /// - [`VoteError::NotFound`] if there is no such active vote.
    pub fn cast(
        &mut self,
        voter: ConnectionId,
        number: u32,
        ballot: Ballot,
        electorate: &impl Electorate,
    ) -> Result<CastOutcome, VoteError> {
        if !electorate.can_vote(voter) {
            return Err(VoteError::Ineligible(voter));
        }
        let index = self.index_of(number).ok_or(VoteError::NotFound(number))?;

        self.votes[index].record(voter, ballot);
        tracing::debug!(number, %voter, %ballot, "ballot cast");

        Ok(match self.evaluate(index, electorate) {
            Some(resolution) => CastOutcome::Resolved(resolution),
            None => CastOutcome::Counted(self.votes[index].tally()),
        })
    }

    /// Removes everything `conn` contributed: the vote it called and its
    /// ballots on other votes. Votes whose ballots changed are
    /// re-evaluated and may resolve.
    ///
    /// Safe to call any number of times.
    pub fn cancel(
        &mut self,
        conn: ConnectionId,
        electorate: &impl Electorate,
    ) -> Cancelled {
        let authored = self.remove_by_caller(conn);
        if let Some(vote) = &authored {
            tracing::info!(number = vote.number(), %conn, "vote cancelled");
        }

        let touched: Vec<u32> = self
            .votes
            .iter_mut()
            .filter_map(|vote| vote.withdraw(conn).then(|| vote.number()))
            .collect();

        let resolutions = touched
            .into_iter()
            .filter_map(|number| {
                let index = self.index_of(number)?;
                self.evaluate(index, electorate)
            })
            .collect();

        Cancelled {
            authored,
            resolutions,
        }
    }

    /// Drops vote `number` without deciding it.
    pub fn cancel_vote(&mut self, number: u32) -> Option<Vote> {
        let index = self.index_of(number)?;
        Some(self.votes.remove(index))
    }

    /// Re-evaluates every vote. Called once per turn, after the
    /// electorate may have changed.
    pub fn turn_boundary(&mut self, electorate: &impl Electorate) -> Vec<Resolution> {
        let numbers: Vec<u32> = self.votes.iter().map(Vote::number).collect();
        numbers
            .into_iter()
            .filter_map(|number| {
                let index = self.index_of(number)?;
                self.evaluate(index, electorate)
            })
            .collect()
    }

    pub fn get(&self, number: u32) -> Option<&Vote> {
        self.votes.iter().find(|v| v.number() == number)
    }

    /// The most recently opened active vote.
    pub fn last_vote(&self) -> Option<&Vote> {
        self.votes.iter().max_by_key(|v| v.number())
    }

    pub fn vote_by_caller(&self, caller: ConnectionId) -> Option<&Vote> {
        self.votes.iter().find(|v| v.caller() == caller)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vote> {
        self.votes.iter()
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    /// Drops every vote. Numbering continues where it was.
    pub fn clear(&mut self) {
        self.votes.clear();
    }

    fn index_of(&self, number: u32) -> Option<usize> {
        self.votes.iter().position(|v| v.number() == number)
    }

    fn remove_by_caller(&mut self, caller: ConnectionId) -> Option<Vote> {
        let index = self.votes.iter().position(|v| v.caller() == caller)?;
        Some(self.votes.remove(index))
    }

    /// Recounts the vote at `index`; removes and returns it if decided.
    fn evaluate(&mut self, index: usize, electorate: &impl Electorate) -> Option<Resolution> {
        let vote = &mut self.votes[index];
        vote.recount(electorate);
        let passed = vote.tally().verdict()?;

        let vote = self.votes.remove(index);
        let resolution = Resolution {
            number: vote.number(),
            caller: vote.caller(),
            command: vote.command().to_string(),
            passed,
            tally: vote.tally(),
        };
        tracing::info!(
            number = resolution.number,
            passed,
            yes = resolution.tally.yes,
            no = resolution.tally.no,
            abstain = resolution.tally.abstain,
            "vote resolved"
        );
        Some(resolution)
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    /// A fixed set of eligible connections.
    #[derive(Default)]
    struct Roll(BTreeSet<ConnectionId>);

    impl Roll {
        fn of(ids: &[u64]) -> Self {
            Self(ids.iter().map(|&n| cid(n)).collect())
        }

        fn leave(&mut self, id: u64) {
            self.0.remove(&cid(id));
        }
    }

    impl Electorate for Roll {
        fn can_vote(&self, conn: ConnectionId) -> bool {
            self.0.contains(&conn)
        }

        fn voter_count(&self) -> usize {
            self.0.len()
        }
    }

    fn cid(id: u64) -> ConnectionId {
        ConnectionId(id)
    }

    // =====================================================================
    // new_vote()
    // =====================================================================

    #[test]
    fn test_new_vote_numbers_increase() {
        let roll = Roll::of(&[1, 2]);
        let mut mgr = VoteManager::new();

        let a = mgr.new_vote(cid(1), "set a 1", &roll).unwrap();
        let b = mgr.new_vote(cid(2), "set b 2", &roll).unwrap();

        assert_eq!((a.number, b.number), (1, 2));
        assert_eq!(mgr.last_vote().unwrap().number(), 2);
    }

    #[test]
    fn test_new_vote_replaces_callers_previous_vote() {
        let roll = Roll::of(&[1]);
        let mut mgr = VoteManager::new();
        mgr.new_vote(cid(1), "set a 1", &roll).unwrap();

        let second = mgr.new_vote(cid(1), "set a 2", &roll).unwrap();

        assert_eq!(second.replaced.map(|v| v.number()), Some(1));
        assert_eq!(mgr.len(), 1);
        assert_eq!(mgr.vote_by_caller(cid(1)).unwrap().command(), "set a 2");
    }

    #[test]
    fn test_new_vote_ineligible_caller_returns_error() {
        let roll = Roll::of(&[1]);
        let mut mgr = VoteManager::new();

        let result = mgr.new_vote(cid(9), "set a 1", &roll);

        assert!(matches!(result, Err(VoteError::Ineligible(c)) if c == cid(9)));
        assert!(mgr.is_empty());
    }

    // =====================================================================
    // cast()
    // =====================================================================

    #[test]
    fn test_cast_five_voters_passes_on_third_yes() {
        let roll = Roll::of(&[1, 2, 3, 4, 5]);
        let mut mgr = VoteManager::new();
        let n = mgr.new_vote(cid(1), "set timeout 60", &roll).unwrap().number;

        mgr.cast(cid(5), n, Ballot::Abstain, &roll).unwrap();
        mgr.cast(cid(1), n, Ballot::Yes, &roll).unwrap();
        mgr.cast(cid(2), n, Ballot::Yes, &roll).unwrap();
        let outcome = mgr.cast(cid(3), n, Ballot::Yes, &roll).unwrap();

        let CastOutcome::Resolved(resolution) = outcome else {
            panic!("third yes should resolve, got {outcome:?}");
        };
        assert!(resolution.passed);
        assert_eq!(resolution.command, "set timeout 60");
        assert_eq!(resolution.tally.not_voted(), 1);
        assert!(mgr.get(n).is_none(), "resolved votes leave the active set");
    }

    #[test]
    fn test_cast_four_voters_fails_on_second_no() {
        let roll = Roll::of(&[1, 2, 3, 4]);
        let mut mgr = VoteManager::new();
        let n = mgr.new_vote(cid(1), "endgame", &roll).unwrap().number;

        let first = mgr.cast(cid(2), n, Ballot::No, &roll).unwrap();
        assert!(matches!(first, CastOutcome::Counted(t) if t.no == 1));

        let outcome = mgr.cast(cid(3), n, Ballot::No, &roll).unwrap();
        assert!(matches!(outcome, CastOutcome::Resolved(r) if !r.passed));
    }

    #[test]
    fn test_cast_overwrites_previous_ballot() {
        let roll = Roll::of(&[1, 2, 3, 4]);
        let mut mgr = VoteManager::new();
        let n = mgr.new_vote(cid(1), "set a 1", &roll).unwrap().number;

        mgr.cast(cid(2), n, Ballot::Yes, &roll).unwrap();
        let outcome = mgr.cast(cid(2), n, Ballot::No, &roll).unwrap();

        let CastOutcome::Counted(tally) = outcome else {
            panic!("vote should still be open");
        };
        assert_eq!((tally.yes, tally.no), (0, 1), "one ballot per voter");
        assert_eq!(mgr.get(n).unwrap().ballot_of(cid(2)), Some(Ballot::No));
    }

    #[test]
    fn test_cast_unknown_vote_returns_not_found() {
        let roll = Roll::of(&[1]);
        let mut mgr = VoteManager::new();

        let result = mgr.cast(cid(1), 42, Ballot::Yes, &roll);

        assert_eq!(result, Err(VoteError::NotFound(42)));
    }

    #[test]
    fn test_cast_ineligible_voter_returns_error() {
        let roll = Roll::of(&[1, 2]);
        let mut mgr = VoteManager::new();
        let n = mgr.new_vote(cid(1), "set a 1", &roll).unwrap().number;

        let result = mgr.cast(cid(7), n, Ballot::Yes, &roll);

        assert_eq!(result, Err(VoteError::Ineligible(cid(7))));
    }

    // =====================================================================
    // cancel()
    // =====================================================================

    #[test]
    fn test_cancel_removes_authored_vote_and_ballots() {
        let roll = Roll::of(&[1, 2, 3, 4, 5]);
        let mut mgr = VoteManager::new();
        let own = mgr.new_vote(cid(1), "set a 1", &roll).unwrap().number;
        let other = mgr.new_vote(cid(2), "set b 2", &roll).unwrap().number;
        mgr.cast(cid(1), other, Ballot::Yes, &roll).unwrap();

        let cancelled = mgr.cancel(cid(1), &roll);

        assert_eq!(cancelled.authored.map(|v| v.number()), Some(own));
        assert!(cancelled.resolutions.is_empty());
        assert_eq!(mgr.get(other).unwrap().ballot_of(cid(1)), None);
    }

    #[test]
    fn test_cancel_twice_is_harmless() {
        let roll = Roll::of(&[1, 2, 3]);
        let mut mgr = VoteManager::new();
        mgr.new_vote(cid(1), "set a 1", &roll).unwrap();
        let unrelated = mgr.new_vote(cid(2), "set b 2", &roll).unwrap().number;
        mgr.cast(cid(3), unrelated, Ballot::Yes, &roll).unwrap();

        mgr.cancel(cid(1), &roll);
        let second = mgr.cancel(cid(1), &roll);

        assert!(second.authored.is_none());
        assert!(second.resolutions.is_empty());
        let vote = mgr.get(unrelated).expect("unrelated vote survives");
        assert_eq!(vote.ballot_of(cid(3)), Some(Ballot::Yes));
    }

    #[test]
    fn test_cancel_withdrawn_ballot_can_resolve_vote() {
        let mut roll = Roll::of(&[1, 2, 3, 4, 5]);
        let mut mgr = VoteManager::new();
        let n = mgr.new_vote(cid(5), "set a 1", &roll).unwrap().number;
        mgr.cast(cid(1), n, Ballot::Yes, &roll).unwrap();
        mgr.cast(cid(2), n, Ballot::No, &roll).unwrap();
        mgr.cast(cid(3), n, Ballot::No, &roll).unwrap();
        assert!(mgr.get(n).is_some(), "2 of 5 against is not yet decisive");

        // The only yes voter disconnects: 2 no out of 4 voters fails it.
        roll.leave(1);
        let cancelled = mgr.cancel(cid(1), &roll);

        assert!(cancelled.authored.is_none());
        assert_eq!(cancelled.resolutions.len(), 1);
        assert!(!cancelled.resolutions[0].passed);
    }

    // =====================================================================
    // turn_boundary()
    // =====================================================================

    #[test]
    fn test_turn_boundary_resolves_after_electorate_shrinks() {
        let mut roll = Roll::of(&[1, 2, 3, 4]);
        let mut mgr = VoteManager::new();
        let n = mgr.new_vote(cid(1), "set a 1", &roll).unwrap().number;
        mgr.cast(cid(1), n, Ballot::Yes, &roll).unwrap();
        mgr.cast(cid(2), n, Ballot::Yes, &roll).unwrap();
        assert!(mgr.turn_boundary(&roll).is_empty());

        // Voter 3's player died; they lose eligibility without leaving.
        roll.leave(3);
        let resolutions = mgr.turn_boundary(&roll);

        assert_eq!(resolutions.len(), 1);
        assert!(resolutions[0].passed);
        assert!(mgr.is_empty());
    }

    #[test]
    fn test_clear_keeps_numbering() {
        let roll = Roll::of(&[1]);
        let mut mgr = VoteManager::new();
        mgr.new_vote(cid(1), "set a 1", &roll).unwrap();
        mgr.clear();

        let next = mgr.new_vote(cid(1), "set a 2", &roll).unwrap();

        assert_eq!(next.number, 2);
    }
}
