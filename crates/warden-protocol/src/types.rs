//! Identifiers and small vocabulary types shared by every Warden crate.
//!
//! These are the nouns of the session-authority layer: who is connected
//! ([`ConnectionId`]), which game identity they act as ([`PlayerId`]),
//! how much they may do ([`AccessLevel`]), how they vote ([`Ballot`]),
//! and where the game currently is ([`GamePhase`]).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Wire limits
// ---------------------------------------------------------------------------

/// Size of a username buffer, terminator included. Usernames may use at
/// most `MAX_LEN_NAME - 1` bytes.
pub const MAX_LEN_NAME: usize = 48;

/// Longest accepted password, in bytes.
pub const MAX_LEN_PASSWORD: usize = 64;

/// Longest accepted command line, in bytes.
pub const MAX_LEN_COMMAND: usize = 511;

/// Longest accepted capability string, in bytes.
pub const MAX_LEN_CAPSTR: usize = 512;

/// Username given to players nobody controls.
///
/// Also reserved: no connection may log in under this name.
pub const ANON_USER_NAME: &str = "Unassigned";

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Stable identifier of one network connection.
///
/// Assigned by the connection registry on accept and never reused while
/// the server runs. Serialized as a plain number.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Identifier of a game-side player.
///
/// A player outlives the connections that control it: a user who drops
/// and logs back in under the same name is re-bound to the same `PlayerId`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// AccessLevel
// ---------------------------------------------------------------------------

/// Ordered privilege tier of a connection.
///
/// The derive order is the privilege order, so `AccessLevel::Info <
/// AccessLevel::Ctrl` holds and levels can be compared directly against a
/// command's requirement. The textual names are part of the interface with
/// command catalogs and clients and must stay exactly `none`, `info`,
/// `ctrl`, `hack`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Default,
)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    /// May not issue any server command.
    None,
    /// May query state and take part in votes.
    #[default]
    Info,
    /// May change game settings and control the game flow.
    Ctrl,
    /// Full server control.
    Hack,
}

impl AccessLevel {
    /// All levels, lowest first.
    pub const ALL: [AccessLevel; 4] = [
        AccessLevel::None,
        AccessLevel::Info,
        AccessLevel::Ctrl,
        AccessLevel::Hack,
    ];

    /// The wire name of this level.
    pub fn as_str(self) -> &'static str {
        match self {
            AccessLevel::None => "none",
            AccessLevel::Info => "info",
            AccessLevel::Ctrl => "ctrl",
            AccessLevel::Hack => "hack",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = ProtocolError;

    /// Parses a level name, ignoring ASCII case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AccessLevel::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ProtocolError::UnknownVariant {
                kind: "access level",
                value: s.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Ballot
// ---------------------------------------------------------------------------

/// One voter's choice on a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ballot {
    Yes,
    No,
    Abstain,
}

impl fmt::Display for Ballot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Ballot::Yes => "yes",
            Ballot::No => "no",
            Ballot::Abstain => "abstain",
        })
    }
}

impl FromStr for Ballot {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yes" => Ok(Ballot::Yes),
            "no" => Ok(Ballot::No),
            "abstain" => Ok(Ballot::Abstain),
            _ => Err(ProtocolError::UnknownVariant {
                kind: "ballot",
                value: s.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// GamePhase
// ---------------------------------------------------------------------------

/// Coarse phase of the game, as reported by the game collaborator.
///
/// The session layer only cares about three situations: players can still
/// be created and thrown away (`PreGame`), the game is live (`Running`),
/// or it is over (`Ended`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    #[default]
    PreGame,
    Running,
    Ended,
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // Identity types
    // =====================================================================

    #[test]
    fn test_connection_id_serializes_as_plain_number() {
        let json = serde_json::to_string(&ConnectionId(7)).unwrap();
        assert_eq!(json, "7");
    }

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId(7).to_string(), "conn-7");
    }

    #[test]
    fn test_player_id_display() {
        assert_eq!(PlayerId(3).to_string(), "P-3");
    }

    // =====================================================================
    // AccessLevel
    // =====================================================================

    #[test]
    fn test_access_level_ordering_matches_privilege() {
        assert!(AccessLevel::None < AccessLevel::Info);
        assert!(AccessLevel::Info < AccessLevel::Ctrl);
        assert!(AccessLevel::Ctrl < AccessLevel::Hack);
    }

    #[test]
    fn test_access_level_serializes_with_exact_vocabulary() {
        let names: Vec<String> = AccessLevel::ALL
            .iter()
            .map(|l| serde_json::to_string(l).unwrap())
            .collect();
        assert_eq!(names, ["\"none\"", "\"info\"", "\"ctrl\"", "\"hack\""]);
    }

    #[test]
    fn test_access_level_from_str_ignores_case() {
        assert_eq!("CTRL".parse::<AccessLevel>().unwrap(), AccessLevel::Ctrl);
        assert_eq!("hack".parse::<AccessLevel>().unwrap(), AccessLevel::Hack);
    }

    #[test]
    fn test_access_level_from_str_unknown_returns_error() {
        let result = "admin".parse::<AccessLevel>();
        assert!(matches!(
            result,
            Err(ProtocolError::UnknownVariant { kind: "access level", .. })
        ));
    }

    // =====================================================================
    // Ballot
    // =====================================================================

    #[test]
    fn test_ballot_from_str_accepts_all_choices() {
        assert_eq!("yes".parse::<Ballot>().unwrap(), Ballot::Yes);
        assert_eq!("No".parse::<Ballot>().unwrap(), Ballot::No);
        assert_eq!("abstain".parse::<Ballot>().unwrap(), Ballot::Abstain);
        assert!("maybe".parse::<Ballot>().is_err());
    }

    #[test]
    fn test_game_phase_default_is_pregame() {
        assert_eq!(GamePhase::default(), GamePhase::PreGame);
        let json = serde_json::to_string(&GamePhase::PreGame).unwrap();
        assert_eq!(json, "\"pre_game\"");
    }
}
