//! Guest names.
//!
//! Any username starting with `guest` (in any case) is a guest login.
//! Guests never touch the credential store; they only need a name that is
//! unique among live connections.

/// Prefix that marks a guest login.
pub const GUEST_NAME: &str = "guest";

/// Returns `true` if `name` starts with the guest prefix, ignoring case.
pub fn is_guest_name(name: &str) -> bool {
    name.len() >= GUEST_NAME.len()
        && name.as_bytes()[..GUEST_NAME.len()]
            .eq_ignore_ascii_case(GUEST_NAME.as_bytes())
}

/// Picks a guest name that `is_taken` does not claim.
///
/// Keeps `requested` when it already is an unused guest name, then tries
/// `guest`, `guest1`, `guest2`, ...
pub fn unique_guest_name(
    requested: &str,
    is_taken: impl Fn(&str) -> bool,
) -> String {
    if is_guest_name(requested) && !is_taken(requested) {
        return requested.to_string();
    }
    if !is_taken(GUEST_NAME) {
        return GUEST_NAME.to_string();
    }
    (1u32..)
        .map(|n| format!("{GUEST_NAME}{n}"))
        .find(|candidate| !is_taken(candidate))
        .unwrap_or_else(|| GUEST_NAME.to_string())
}
