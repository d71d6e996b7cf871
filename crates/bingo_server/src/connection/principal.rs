//! Deciding when two sessions belong to the same participant.
//!
//! Broadcasts and peer listings skip every session that shares the sender's
//! principal, so one user's other tabs and devices never get their own state
//! echoed back. The rule lives behind [`PrincipalPolicy`] so it can be
//! inspected and swapped on its own.

use std::fmt::Debug;

/// Decides whether two sessions represent the same participant.
///
/// Arguments are the sessions' display names; `None` means the session has
/// not bound an identity yet.
pub trait PrincipalPolicy: Send + Sync + Debug + 'static {
    fn same_principal(&self, a: Option<&str>, b: Option<&str>) -> bool;
}

/// Participants are equal when their display names are equal.
///
/// Two unbound sessions compare equal to each other; an unbound session never
/// equals a bound one, so unauthenticated spectators still receive broadcasts.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisplayNamePrincipal;

impl PrincipalPolicy for DisplayNamePrincipal {
    fn same_principal(&self, a: Option<&str>, b: Option<&str>) -> bool {
        a == b
    }
}
