//! Guard state machine.

use serde::{Deserialize, Serialize};

/// State of an access guard.
///
/// `Allowed` and `Redirecting` are terminal per navigation cycle; the
/// next route change re-enters `Validating`. A stale decision discarded
/// mid-resolution drops back to `Idle` before the follow-up run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardState {
    /// No validation has run for the current navigation yet.
    Idle,
    /// A validation is in flight; new triggers are recorded, not run.
    Validating,
    /// The routed view may render.
    Allowed,
    /// The routed view is blocked; a redirect was determined.
    Redirecting,
}

impl GuardState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: GuardState) -> bool {
        use GuardState::*;

        matches!(
            (self, target),
            (Idle, Validating) |
            // Resolution of an in-flight validation
            (Validating, Allowed) | (Validating, Redirecting) | (Validating, Idle) |
            // The next navigation re-enters validation
            (Allowed, Validating) | (Redirecting, Validating)
        )
    }

    /// Check if this is a per-navigation terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Allowed | Self::Redirecting)
    }
}

impl std::fmt::Display for GuardState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Allowed => "allowed",
            Self::Redirecting => "redirecting",
        };
        write!(f, "{s}")
    }
}
