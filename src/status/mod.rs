//! Backend processing-status queries.
//!
//! The backend is the only authority on whether a platform's processing
//! job still blocks its dashboard. Answers are explicit tagged variants: a
//! caller either holds a confirmed verdict or knows the backend was
//! unreachable. Unreachable means unknown, never inactive.

pub mod http;

pub use http::{BackendConfig, HttpStatusClient};

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::platform::Platform;

/// A server-tracked processing window for one platform.
///
/// Authoritative only when freshly fetched. The client never mutates one,
/// and an expired window is never treated as active again without a fresh
/// fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingState {
    pub platform: Platform,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl ProcessingState {
    /// Whether the job is still running at `now`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.end_time > now
    }

    /// Time left in the window at `now`, zero once expired.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.end_time - now).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Why the backend denied dashboard access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    /// The processing job is still running.
    ProcessingActive,
    /// Any other backend-stated reason, carried verbatim.
    Other(String),
}

impl DenialReason {
    pub fn parse(raw: &str) -> DenialReason {
        match raw {
            "processing_active" => DenialReason::ProcessingActive,
            other => DenialReason::Other(other.to_string()),
        }
    }
}

/// Answer to a per-platform status query.
#[derive(Debug, Clone)]
pub enum PlatformStatus {
    /// The backend answered.
    Confirmed {
        access_allowed: bool,
        reason: Option<DenialReason>,
        /// Backend-suggested redirect target, if any.
        redirect_to: Option<String>,
        /// Time left in the processing window, when the denial is one.
        remaining: Option<Duration>,
    },
    /// Timeout, connection failure, error status, or malformed payload.
    Unreachable,
}

/// Answer to an aggregate status query: every platform's processing
/// window in one call. Platforms without a window are simply absent.
#[derive(Debug, Clone)]
pub enum AggregateStatus {
    Confirmed(HashMap<Platform, ProcessingState>),
    Unreachable,
}

/// Authoritative processing-status queries.
#[async_trait]
pub trait StatusClient: Send + Sync {
    /// One platform's access verdict, capped at the query timeout.
    async fn status_for(&self, user: &str, platform: Platform) -> PlatformStatus;

    /// Every platform's processing window in a single batched call.
    async fn status_all(&self, user: &str) -> AggregateStatus;
}
