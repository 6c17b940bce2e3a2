//! Checks applied to a login request before any password is asked for.

use warden_protocol::{ANON_USER_NAME, MAX_LEN_NAME};

use crate::AuthRejected;

/// Returns `true` if every mandatory capability in `theirs` is present in
/// `ours`.
///
/// Capability strings are space separated; a leading `+` marks a
/// capability the sender cannot work without. Optional capabilities are
/// ignored here.
pub fn has_capabilities(ours: &str, theirs: &str) -> bool {
    let ours: Vec<&str> = ours
        .split_whitespace()
        .map(|cap| cap.trim_start_matches('+'))
        .collect();
    theirs
        .split_whitespace()
        .filter_map(|cap| cap.strip_prefix('+'))
        .all(|required| ours.contains(&required))
}

/// Capability negotiation in both directions.
///
/// # Errors
/// - [`AuthRejected::ClientMissingCapability`] if the server needs
///   something the client lacks.
/// - [`AuthRejected::ServerMissingCapability`] for the reverse.
pub fn check_capabilities(server: &str, client: &str) -> Result<(), AuthRejected> {
    if !has_capabilities(client, server) {
        return Err(AuthRejected::ClientMissingCapability);
    }
    if !has_capabilities(server, client) {
        return Err(AuthRejected::ServerMissingCapability);
    }
    Ok(())
}

/// Returns `true` if `name` may be used as a login name: non-empty, fits
/// the name buffer, ASCII, does not start with a digit, and is not the
/// placeholder given to unowned players.
pub fn is_valid_username(name: &str) -> bool {
    !name.is_empty()
        && name.len() < MAX_LEN_NAME
        && name.is_ascii()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && !name.eq_ignore_ascii_case(ANON_USER_NAME)
}

/// Trims the requested name and validates it.
///
/// # Errors
/// Returns [`AuthRejected::InvalidUsername`] carrying the trimmed name.
pub fn normalize_username(requested: &str) -> Result<String, AuthRejected> {
    let name = requested.trim_matches(' ');
    if !is_valid_username(name) {
        return Err(AuthRejected::InvalidUsername(name.to_string()));
    }
    Ok(name.to_string())
}
