//! Redirect arbiter.
//!
//! Sits between the guard's decisions and actual navigation. Tracks the
//! last target it committed so a repeated decision is a no-op, and
//! suppresses any redirect whose target is the route already on screen.
//! Navigation always uses replace semantics, so the back button can never
//! return the user to a blocked view.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Replace-semantics navigation, injected by the hosting environment.
#[async_trait]
pub trait Navigator: Send + Sync {
    /// Navigate to `path`, replacing the current history entry.
    async fn replace(&self, path: &str);
}

/// What the arbiter did with a redirect request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The navigator was invoked.
    Navigated,
    /// Same target as the last committed redirect; nothing done.
    DuplicateTarget,
    /// Target equals the route already active; loop suppressed.
    AlreadyThere,
}

impl CommitOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CommitOutcome::Navigated => "navigated",
            CommitOutcome::DuplicateTarget => "duplicate_target",
            CommitOutcome::AlreadyThere => "already_there",
        }
    }
}

/// At most one effective navigation per determination.
pub struct RedirectArbiter {
    navigator: Arc<dyn Navigator>,
    last_target: Mutex<Option<String>>,
}

impl RedirectArbiter {
    pub fn new(navigator: Arc<dyn Navigator>) -> Self {
        Self {
            navigator,
            last_target: Mutex::new(None),
        }
    }

    /// Commit a redirect to `target`, given the route currently active.
    ///
    /// The last-target record updates even when the navigation itself is
    /// suppressed, so a superseding redirect to a new target still goes
    /// through.
    pub async fn commit(&self, current_route: &str, target: &str) -> CommitOutcome {
        let mut last = self.last_target.lock().await;

        if target == current_route {
            debug!(target = %target, "Redirect target already active, suppressing");
            *last = Some(target.to_string());
            return CommitOutcome::AlreadyThere;
        }

        if last.as_deref() == Some(target) {
            debug!(target = %target, "Redirect already committed, suppressing duplicate");
            return CommitOutcome::DuplicateTarget;
        }

        *last = Some(target.to_string());
        drop(last);

        info!(target = %target, from = %current_route, "Replace-navigating");
        self.navigator.replace(target).await;
        CommitOutcome::Navigated
    }

    /// Clear the tracked target after an allow decision, so a future
    /// redirect to the same view is effective again.
    pub async fn clear(&self) {
        *self.last_target.lock().await = None;
    }
}
