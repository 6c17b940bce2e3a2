//! A single vote, its ballots, and the rule that decides it.

use std::collections::BTreeMap;

use warden_protocol::{Ballot, ConnectionId};

use crate::Electorate;

/// Counts derived from a vote's ballots.
///
/// Only ballots of connections that may vote *right now* are counted, so a
/// voter who lost eligibility after casting no longer weighs in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub yes: usize,
    pub no: usize,
    pub abstain: usize,
    /// Connections currently eligible to vote.
    pub voters: usize,
}

impl Tally {
    /// Eligible voters minus abstentions.
    pub fn voting_base(&self) -> usize {
        self.voters.saturating_sub(self.abstain)
    }

    pub fn cast(&self) -> usize {
        self.yes + self.no + self.abstain
    }

    pub fn not_voted(&self) -> usize {
        self.voters.saturating_sub(self.cast())
    }

    /// `Some(passed)` once the vote is decided, `None` while it is open.
    ///
    /// A majority of the voting base decides early either way; otherwise
    /// the vote stays open until every eligible voter has cast a ballot.
    pub fn verdict(&self) -> Option<bool> {
        let base = self.voting_base();
        let passes = self.yes > base / 2;
        let fails = self.no >= base.div_ceil(2);
        let decided = (base > 0 && (passes || fails)) || self.cast() >= self.voters;
        decided.then_some(passes)
    }
}

/// An active vote on one command line.
#[derive(Debug, Clone)]
pub struct Vote {
    number: u32,
    caller: ConnectionId,
    command: String,
    ballots: BTreeMap<ConnectionId, Ballot>,
    tally: Tally,
}

impl Vote {
    pub(crate) fn new(number: u32, caller: ConnectionId, command: String) -> Self {
        Self {
            number,
            caller,
            command,
            ballots: BTreeMap::new(),
            tally: Tally::default(),
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    /// The connection that called the vote.
    pub fn caller(&self) -> ConnectionId {
        self.caller
    }

    /// The command line executed if the vote passes.
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn tally(&self) -> Tally {
        self.tally
    }

    /// The ballot `voter` has on record, if any.
    pub fn ballot_of(&self, voter: ConnectionId) -> Option<Ballot> {
        self.ballots.get(&voter).copied()
    }

    /// Records `ballot`, replacing any earlier ballot by the same voter.
    pub(crate) fn record(&mut self, voter: ConnectionId, ballot: Ballot) {
        self.ballots.insert(voter, ballot);
    }

    /// Drops `voter`'s ballot. Returns `true` if there was one.
    pub(crate) fn withdraw(&mut self, voter: ConnectionId) -> bool {
        self.ballots.remove(&voter).is_some()
    }

    pub(crate) fn recount(&mut self, electorate: &impl Electorate) {
        let mut tally = Tally {
            voters: electorate.voter_count(),
            ..Tally::default()
        };
        for (&voter, ballot) in &self.ballots {
            if !electorate.can_vote(voter) {
                continue;
            }
            match ballot {
                Ballot::Yes => tally.yes += 1,
                Ballot::No => tally.no += 1,
                Ballot::Abstain => tally.abstain += 1,
            }
        }
        self.tally = tally;
    }
}

/// The final state of a decided vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub number: u32,
    pub caller: ConnectionId,
    pub command: String,
    pub passed: bool,
    pub tally: Tally,
}

impl Resolution {
    /// One-line summary for announcements and logs.
    pub fn summary(&self) -> String {
        let t = &self.tally;
        if self.passed {
            format!(
                "Vote \"{}\" is passed {} to {} with {} abstentions and {} that did not vote.",
                self.command,
                t.yes,
                t.no,
                t.abstain,
                t.not_voted()
            )
        } else {
            format!(
                "Vote \"{}\" failed with {} against, {} for, {} abstentions, and {} that did not vote.",
                self.command,
                t.no,
                t.yes,
                t.abstain,
                t.not_voted()
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tally(yes: usize, no: usize, abstain: usize, voters: usize) -> Tally {
        Tally {
            yes,
            no,
            abstain,
            voters,
        }
    }

    // =====================================================================
    // Tally::verdict()
    // =====================================================================

    #[test]
    fn test_verdict_five_voters_one_abstain_three_yes_passes() {
        // base 4, 3 > 2; the fifth voter never votes.
        assert_eq!(tally(3, 0, 1, 5).verdict(), Some(true));
    }

    #[test]
    fn test_verdict_four_voters_two_no_fails() {
        // base 4, 2 >= (4 + 1) / 2.
        assert_eq!(tally(0, 2, 0, 4).verdict(), Some(false));
    }

    #[test]
    fn test_verdict_tie_stays_open_until_all_cast() {
        assert_eq!(tally(1, 0, 0, 4).verdict(), None);
        assert_eq!(tally(2, 1, 0, 4).verdict(), None);
    }

    #[test]
    fn test_verdict_yes_majority_passes_regardless_of_uncast() {
        for voters in 1..=12usize {
            for abstain in 0..voters {
                let base = voters - abstain;
                let yes = base / 2 + 1;
                if yes + abstain > voters {
                    continue;
                }
                assert_eq!(
                    tally(yes, 0, abstain, voters).verdict(),
                    Some(true),
                    "voters={voters} abstain={abstain} yes={yes}"
                );
            }
        }
    }

    #[test]
    fn test_verdict_everyone_abstains_fails_once_all_cast() {
        assert_eq!(tally(0, 0, 3, 3).verdict(), Some(false));
    }

    #[test]
    fn test_verdict_no_voters_left_fails() {
        assert_eq!(tally(0, 0, 0, 0).verdict(), Some(false));
    }

    #[test]
    fn test_resolution_summary_wording() {
        let passed = Resolution {
            number: 1,
            caller: ConnectionId(1),
            command: "set timeout 60".into(),
            passed: true,
            tally: tally(3, 0, 1, 5),
        };
        assert_eq!(
            passed.summary(),
            "Vote \"set timeout 60\" is passed 3 to 0 with 1 abstentions and 1 that did not vote."
        );

        let failed = Resolution {
            passed: false,
            tally: tally(0, 2, 0, 4),
            ..passed
        };
        assert!(failed.summary().starts_with("Vote \"set timeout 60\" failed with 2 against"));
    }
}
