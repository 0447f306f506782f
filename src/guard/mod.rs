//! Access guard — the validation state machine.
//!
//! Decides, per navigation, whether the routed platform's dashboard may
//! render or the user must be redirected. One validation is in flight per
//! guard at most; triggers that arrive mid-flight are recorded and the
//! recorded route gets exactly one follow-up run once the stale decision
//! is discarded.
//!
//! Flow for a gated route:
//! 1. Aggregate query — an active processing window for the routed
//!    platform redirects to its processing view (other platforms' jobs
//!    never block).
//! 2. Per-platform query — the backend's verdict wins; confirmed access
//!    is written through to the cache.
//! 3. Backend unreachable — fall back to the cached account state.
//! Every redirect passes through the arbiter; the decision itself is
//! broadcast to subscribers.

pub mod decision;
pub mod state;

pub use decision::{DecisionReason, GuardDecision, ValidationOutcome};
pub use state::GuardState;

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::arbiter::{CommitOutcome, Navigator, RedirectArbiter};
use crate::cache::{AccountUpdate, LocalStateCache};
use crate::config::GuardConfig;
use crate::platform;
use crate::status::{AggregateStatus, DenialReason, PlatformStatus, StatusClient};

/// Capacity of the decision broadcast channel.
const DECISION_BUS_CAPACITY: usize = 64;

/// The guard's mutable core: one state, one monotonic timestamp, one
/// recorded route. All admission decisions happen under this lock.
struct GuardCore {
    state: GuardState,
    last_validation: Option<Instant>,
    pending_route: Option<String>,
}

fn advance(core: &mut GuardCore, to: GuardState) {
    if !core.state.can_transition_to(to) {
        warn!(from = %core.state, to = %to, "Unexpected guard state transition");
    }
    core.state = to;
}

/// Background access validator for one user session.
pub struct AccessGuard {
    user: String,
    config: GuardConfig,
    status: Arc<dyn StatusClient>,
    cache: Arc<LocalStateCache>,
    arbiter: RedirectArbiter,
    core: Mutex<GuardCore>,
    current_route: RwLock<String>,
    decisions: broadcast::Sender<GuardDecision>,
}

impl AccessGuard {
    pub fn new(
        user: impl Into<String>,
        config: GuardConfig,
        status: Arc<dyn StatusClient>,
        cache: Arc<LocalStateCache>,
        navigator: Arc<dyn Navigator>,
    ) -> Arc<Self> {
        let (decisions, _) = broadcast::channel(DECISION_BUS_CAPACITY);
        Arc::new(Self {
            user: user.into(),
            config,
            status,
            cache,
            arbiter: RedirectArbiter::new(navigator),
            core: Mutex::new(GuardCore {
                state: GuardState::Idle,
                last_validation: None,
                pending_route: None,
            }),
            current_route: RwLock::new(String::new()),
            decisions,
        })
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Subscribe to decisions. Each rendering-layer consumer calls this.
    pub fn subscribe(&self) -> broadcast::Receiver<GuardDecision> {
        self.decisions.subscribe()
    }

    pub async fn state(&self) -> GuardState {
        self.core.lock().await.state
    }

    pub async fn is_validating(&self) -> bool {
        self.state().await == GuardState::Validating
    }

    /// The route this session currently shows, as far as the guard knows.
    pub async fn current_route(&self) -> String {
        self.current_route.read().await.clone()
    }

    /// Validate access for a route, navigating through the arbiter when
    /// blocked. Returns how the trigger was handled; a trigger absorbed
    /// by an in-flight or too-recent validation does not run.
    pub async fn validate(&self, route: &str) -> ValidationOutcome {
        let mut route = route.to_string();
        // A follow-up re-run for a recorded route is the winning attempt
        // of the new navigation cycle; it is exempt from the rate limit.
        let mut follow_up = false;

        loop {
            {
                let mut core = self.core.lock().await;
                if core.state == GuardState::Validating {
                    debug!(route = %route, "Validation in flight, recording route");
                    core.pending_route = Some(route);
                    return ValidationOutcome::Deferred;
                }
                if !follow_up {
                    if let Some(last) = core.last_validation {
                        if last.elapsed() < self.config.min_validation_interval {
                            debug!(route = %route, "Validation throttled");
                            return ValidationOutcome::Throttled;
                        }
                    }
                }
                advance(&mut core, GuardState::Validating);
                core.last_validation = Some(Instant::now());
            }
            *self.current_route.write().await = route.clone();

            let cycle = Uuid::new_v4();
            debug!(route = %route, cycle = %cycle, "Validation started");

            let decision = match timeout(
                self.config.validation_timeout,
                self.run_validation(cycle, &route),
            )
            .await
            {
                Ok(decision) => decision,
                Err(_) => {
                    warn!(route = %route, cycle = %cycle, "Validation exceeded its time cap, failing open");
                    GuardDecision::allowed(
                        cycle,
                        &route,
                        platform::resolve_route(&route),
                        DecisionReason::ValidationTimeout,
                        None,
                    )
                }
            };

            // Resolution: if the navigation moved on while this cycle was
            // in flight, its decision is stale and never committed.
            let superseded = {
                let mut core = self.core.lock().await;
                match core.pending_route.take() {
                    Some(next) if next != route => {
                        advance(&mut core, GuardState::Idle);
                        Some(next)
                    }
                    _ => {
                        advance(
                            &mut core,
                            if decision.allow {
                                GuardState::Allowed
                            } else {
                                GuardState::Redirecting
                            },
                        );
                        None
                    }
                }
            };

            if let Some(next) = superseded {
                info!(stale = %route, next = %next, cycle = %cycle, "Discarding stale decision, validating recorded route");
                route = next;
                follow_up = true;
                continue;
            }

            if decision.allow {
                self.arbiter.clear().await;
            } else if let Some(target) = decision.redirect_to.clone() {
                let current = self.current_route.read().await.clone();
                if self.arbiter.commit(&current, &target).await == CommitOutcome::Navigated {
                    *self.current_route.write().await = target;
                }
            }

            info!(
                route = %decision.route,
                cycle = %cycle,
                allow = decision.allow,
                reason = decision.reason.label(),
                "Validation decided"
            );
            let _ = self.decisions.send(decision.clone());
            return ValidationOutcome::Decided(decision);
        }
    }

    /// Spawn a validation in the background so the caller can render
    /// optimistically while it runs.
    pub fn trigger(self: &Arc<Self>, route: &str) -> JoinHandle<()> {
        let guard = Arc::clone(self);
        let route = route.to_string();
        tokio::spawn(async move {
            let outcome = guard.validate(&route).await;
            debug!(route = %route, outcome = outcome.label(), "Background validation finished");
        })
    }

    /// Re-validate the current route. Used by cross-tab sync after a
    /// relevant storage mutation in another session.
    pub async fn revalidate(&self) -> ValidationOutcome {
        let route = self.current_route().await;
        self.validate(&route).await
    }

    async fn run_validation(&self, cycle: Uuid, route: &str) -> GuardDecision {
        if !platform::is_gated(route) {
            return GuardDecision::allowed(
                cycle,
                route,
                platform::resolve_route(route),
                DecisionReason::RouteNotGated,
                None,
            );
        }
        let platform = platform::resolve_route(route);

        // Step 1: an active processing window for this platform blocks it.
        if let AggregateStatus::Confirmed(windows) = self.status.status_all(&self.user).await {
            if let Some(window) = windows.get(&platform) {
                let now = chrono::Utc::now();
                if window.is_active_at(now) {
                    if let Err(e) = self
                        .cache
                        .record_processing(&self.user, platform, window)
                        .await
                    {
                        warn!(platform = %platform, error = %e, "Failed to persist processing window");
                    }
                    return GuardDecision::redirecting(
                        cycle,
                        route,
                        platform,
                        platform.processing_path(),
                        DecisionReason::ProcessingActive,
                        Some(window.remaining_at(now)),
                    );
                }
            }
        }

        // Step 2: the backend's per-platform verdict.
        match self.status.status_for(&self.user, platform).await {
            PlatformStatus::Confirmed {
                access_allowed: true,
                ..
            } => {
                if let Err(e) = self
                    .cache
                    .apply(&self.user, platform, AccountUpdate::accessed(true))
                    .await
                {
                    warn!(platform = %platform, error = %e, "Failed to persist accessed flag");
                }
                let account = self.cache.get(&self.user, platform).await;
                GuardDecision::allowed(
                    cycle,
                    route,
                    platform,
                    DecisionReason::BackendConfirmed,
                    Some(account),
                )
            }
            PlatformStatus::Confirmed {
                access_allowed: false,
                reason,
                redirect_to,
                remaining,
            } => match reason {
                Some(DenialReason::ProcessingActive) => GuardDecision::redirecting(
                    cycle,
                    route,
                    platform,
                    redirect_to.unwrap_or_else(|| platform.processing_path()),
                    DecisionReason::ProcessingActive,
                    remaining,
                ),
                reason => {
                    if let Some(DenialReason::Other(raw)) = &reason {
                        debug!(platform = %platform, reason = %raw, "Backend denied access");
                    }
                    GuardDecision::redirecting(
                        cycle,
                        route,
                        platform,
                        redirect_to.unwrap_or_else(|| platform.onboarding_path()),
                        DecisionReason::BackendDenied,
                        None,
                    )
                }
            },
            // Step 3: authoritative path unreachable — cached state decides.
            PlatformStatus::Unreachable => {
                let account = self.cache.get(&self.user, platform).await;
                if account.grants_access() {
                    GuardDecision::allowed(
                        cycle,
                        route,
                        platform,
                        DecisionReason::CachedAccess,
                        Some(account),
                    )
                } else {
                    GuardDecision::redirecting(
                        cycle,
                        route,
                        platform,
                        platform.onboarding_path(),
                        DecisionReason::NoLocalAccount,
                        None,
                    )
                }
            }
        }
    }
}
