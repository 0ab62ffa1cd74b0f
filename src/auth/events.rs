//! Signals from the session layer to the UI shell
//!
//! The shell subscribes once and decides how to react; the session layer
//! never navigates by itself.

use crate::auth::SessionUser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    LoggedOut,
    MissingRefreshToken,
    RefreshRejected,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::LoggedOut => "logged_out",
            EndReason::MissingRefreshToken => "missing_refresh_token",
            EndReason::RefreshRejected => "refresh_rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SignedIn(SessionUser),
    TokenRefreshed,
    /// Local session state was cleared
    Ended(EndReason),
    /// The shell should move to this location
    NavigateTo(String),
}

/// Capacity of the broadcast channel; slow subscribers skip older events
pub(crate) const EVENT_CAPACITY: usize = 32;
