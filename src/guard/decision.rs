//! Guard decisions and validation outcomes.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::cache::AccountState;
use crate::platform::Platform;

/// Why a validation resolved the way it did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// The route is not access-gated; no query was made.
    RouteNotGated,
    /// A processing job for the routed platform is still running.
    ProcessingActive,
    /// The backend confirmed access.
    BackendConfirmed,
    /// The backend denied access for a non-processing reason.
    BackendDenied,
    /// Backend unreachable; the cached account granted access.
    CachedAccess,
    /// Backend unreachable and no cached account exists.
    NoLocalAccount,
    /// The validation exceeded its time cap and failed open.
    ValidationTimeout,
}

impl DecisionReason {
    pub fn label(&self) -> &'static str {
        match self {
            DecisionReason::RouteNotGated => "route_not_gated",
            DecisionReason::ProcessingActive => "processing_active",
            DecisionReason::BackendConfirmed => "backend_confirmed",
            DecisionReason::BackendDenied => "backend_denied",
            DecisionReason::CachedAccess => "cached_access",
            DecisionReason::NoLocalAccount => "no_local_account",
            DecisionReason::ValidationTimeout => "validation_timeout",
        }
    }
}

/// The sole output of a validation cycle.
///
/// Decisions are values, never side effects: navigation happens only when
/// a decision passes through the redirect arbiter, and the rendering layer
/// observes decisions through the guard's broadcast channel.
#[derive(Debug, Clone, Serialize)]
pub struct GuardDecision {
    /// Identifies the validation cycle that produced this decision.
    pub cycle: Uuid,
    /// The route this decision was made for.
    pub route: String,
    pub platform: Platform,
    pub allow: bool,
    /// Where to go instead, when blocked.
    pub redirect_to: Option<String>,
    pub reason: DecisionReason,
    /// Cache-resolved account state for the rendering layer, when known.
    pub account: Option<AccountState>,
    /// Time left in the processing window, when that is the blocker.
    pub remaining: Option<Duration>,
    pub decided_at: DateTime<Utc>,
}

impl GuardDecision {
    pub fn allowed(
        cycle: Uuid,
        route: &str,
        platform: Platform,
        reason: DecisionReason,
        account: Option<AccountState>,
    ) -> Self {
        Self {
            cycle,
            route: route.to_string(),
            platform,
            allow: true,
            redirect_to: None,
            reason,
            account,
            remaining: None,
            decided_at: Utc::now(),
        }
    }

    pub fn redirecting(
        cycle: Uuid,
        route: &str,
        platform: Platform,
        target: String,
        reason: DecisionReason,
        remaining: Option<Duration>,
    ) -> Self {
        Self {
            cycle,
            route: route.to_string(),
            platform,
            allow: false,
            redirect_to: Some(target),
            reason,
            account: None,
            remaining,
            decided_at: Utc::now(),
        }
    }
}

/// What became of a validation trigger.
///
/// Coalesced and rate-limited triggers are explicit values so callers can
/// tell "decided" from "absorbed by another cycle".
#[derive(Debug, Clone)]
pub enum ValidationOutcome {
    /// The trigger won its cycle and produced a decision.
    Decided(GuardDecision),
    /// A validation was already in flight; the route was recorded.
    Deferred,
    /// Too soon after the previous validation; dropped.
    Throttled,
}

impl ValidationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ValidationOutcome::Decided(_) => "decided",
            ValidationOutcome::Deferred => "deferred",
            ValidationOutcome::Throttled => "throttled",
        }
    }

    /// The decision, when this trigger produced one.
    pub fn decision(&self) -> Option<&GuardDecision> {
        match self {
            ValidationOutcome::Decided(decision) => Some(decision),
            _ => None,
        }
    }
}
