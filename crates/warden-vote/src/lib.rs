//! Votes on privileged commands for Warden.
//!
//! A connection with `info` access that issues a `ctrl` command does not
//! get refused outright: the command becomes a [`Vote`]. Eligible voters
//! cast [`Ballot`](warden_protocol::Ballot)s, and the [`VoteManager`]
//! decides each vote by majority of the voting base (eligible voters minus
//! abstentions). A passed vote hands its command line back to the caller
//! of the manager for execution.

mod error;
mod manager;
mod vote;

pub use error::VoteError;
pub use manager::{Cancelled, CastOutcome, Electorate, NewVote, VoteManager};
pub use vote::{Resolution, Tally, Vote};
