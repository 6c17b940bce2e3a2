//! Command lines: parsing, errors, and the game's half of execution.
//!
//! A line like `/take alice P-2` is split into a command word and its
//! arguments. The word is resolved against the
//! [`CommandCatalog`](warden_session::CommandCatalog); the session
//! commands (`vote`, `take`, `cmdlevel`, ...) are run by the authority
//! itself and everything else goes to the game's [`CommandExecutor`].

use warden_protocol::ConnectionId;
use warden_session::{BindingError, CatalogError};
use warden_vote::VoteError;

/// Why a command did not run. The `Display` text is the reply the caller
/// sees.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("You are not allowed to use server commands.")]
    NoServerCommands,

    #[error("You are not allowed to use this command.")]
    NotAllowed,

    #[error("Usage: {0}")]
    Usage(&'static str),

    /// A command that acts on the caller's own connection was run by the
    /// server itself (for example through a passed vote).
    #[error("The '{0}' command makes no sense from the server command line.")]
    NeedsCaller(&'static str),

    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error(transparent)]
    Vote(#[from] VoteError),

    #[error("{0}")]
    Failed(String),
}

/// The game's command handler.
///
/// Gets every catalog command the authority does not handle itself. The
/// level check has already passed when these are called.
pub trait CommandExecutor {
    /// Checks a line before it is put to a vote, so a vote is never
    /// called on something that could not run.
    fn validate(&self, _line: &str) -> Result<(), String> {
        Ok(())
    }

    /// Runs a line. `caller` is `None` when the server itself runs it,
    /// as it does for passed votes. The `Ok` text is shown to the caller.
    fn execute(&mut self, caller: Option<ConnectionId>, line: &str) -> Result<String, String>;
}

/// Splits a command line into its command word and the rest.
///
/// A leading `/` is dropped. Returns `None` for a blank line.
pub fn split_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    let line = line.strip_prefix('/').unwrap_or(line).trim_start();
    if line.is_empty() {
        return None;
    }
    Some(match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    })
}

/// Whitespace separated arguments.
pub(crate) fn tokens(args: &str) -> Vec<&str> {
    args.split_whitespace().collect()
}
