//! Integration tests for the access-validation flow.
//!
//! Each test wires a real guard over an in-memory store with a stub
//! status client and a recording navigator, then exercises the full
//! validate → decide → arbiter → navigate contract.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use tokio::sync::Mutex;
use tokio::time::timeout;

use dashgate::arbiter::Navigator;
use dashgate::cache::{
    AccountUpdate, KeyValueStore, LocalStateCache, MemoryStore, keys,
};
use dashgate::config::GuardConfig;
use dashgate::guard::{AccessGuard, DecisionReason, ValidationOutcome};
use dashgate::platform::Platform;
use dashgate::status::{AggregateStatus, PlatformStatus, ProcessingState, StatusClient};
use dashgate::sync::spawn_cross_tab_sync;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Stub status client with canned answers and an optional artificial
/// response delay.
struct StubStatus {
    all: AggregateStatus,
    one: PlatformStatus,
    delay: Duration,
}

impl StubStatus {
    fn new(all: AggregateStatus, one: PlatformStatus) -> Self {
        Self {
            all,
            one,
            delay: Duration::ZERO,
        }
    }

    fn unreachable() -> Self {
        Self::new(AggregateStatus::Unreachable, PlatformStatus::Unreachable)
    }

    fn allowing() -> Self {
        Self::new(
            AggregateStatus::Confirmed(HashMap::new()),
            PlatformStatus::Confirmed {
                access_allowed: true,
                reason: None,
                redirect_to: None,
                remaining: None,
            },
        )
    }

    fn with_active_window(platform: Platform, minutes: i64) -> Self {
        let now = Utc::now();
        let mut windows = HashMap::new();
        windows.insert(
            platform,
            ProcessingState {
                platform,
                start_time: now,
                end_time: now + TimeDelta::minutes(minutes),
            },
        );
        Self::new(
            AggregateStatus::Confirmed(windows),
            PlatformStatus::Confirmed {
                access_allowed: true,
                reason: None,
                redirect_to: None,
                remaining: None,
            },
        )
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl StatusClient for StubStatus {
    async fn status_for(&self, _user: &str, _platform: Platform) -> PlatformStatus {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.one.clone()
    }

    async fn status_all(&self, _user: &str) -> AggregateStatus {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.all.clone()
    }
}

/// Navigator that records every replace-navigation.
struct RecordingNavigator {
    visited: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            visited: Mutex::new(Vec::new()),
        })
    }

    async fn visited(&self) -> Vec<String> {
        self.visited.lock().await.clone()
    }
}

#[async_trait]
impl Navigator for RecordingNavigator {
    async fn replace(&self, path: &str) {
        self.visited.lock().await.push(path.to_string());
    }
}

struct Harness {
    guard: Arc<AccessGuard>,
    store: Arc<MemoryStore>,
    cache: Arc<LocalStateCache>,
    nav: Arc<RecordingNavigator>,
}

/// Test config: no rate limit, short validation cap, real debounce.
fn test_config() -> GuardConfig {
    GuardConfig {
        query_timeout: Duration::from_secs(1),
        validation_timeout: Duration::from_secs(3),
        min_validation_interval: Duration::ZERO,
        revalidate_debounce: Duration::from_millis(400),
    }
}

fn harness(status: StubStatus, config: GuardConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(LocalStateCache::new(store.clone()));
    let nav = RecordingNavigator::new();
    let guard = AccessGuard::new(
        "u1",
        config,
        Arc::new(status),
        Arc::clone(&cache),
        nav.clone(),
    );
    Harness {
        guard,
        store,
        cache,
        nav,
    }
}

#[tokio::test]
async fn active_window_redirects_to_processing_view() {
    timeout(TEST_TIMEOUT, async {
        let h = harness(
            StubStatus::with_active_window(Platform::Twitter, 5),
            test_config(),
        );

        let outcome = h.guard.validate("/twitter-dashboard").await;

        let decision = outcome.decision().expect("should decide");
        assert!(!decision.allow);
        assert_eq!(decision.redirect_to.as_deref(), Some("/processing/twitter"));
        assert_eq!(decision.reason, DecisionReason::ProcessingActive);

        // remaining = end_time − now, so just under five minutes here.
        let remaining = decision.remaining.expect("window should carry remaining time");
        assert!(remaining.as_secs() > 295 && remaining.as_secs() <= 300);

        assert_eq!(h.nav.visited().await, vec!["/processing/twitter"]);

        // The observed window was written through for other sessions.
        let countdown = h
            .store
            .get(&keys::processing_countdown(Platform::Twitter))
            .await
            .unwrap();
        assert!(countdown.is_some());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn confirmed_access_exposes_cached_account() {
    timeout(TEST_TIMEOUT, async {
        let h = harness(StubStatus::allowing(), test_config());
        h.cache
            .apply(
                "u1",
                Platform::Twitter,
                AccountUpdate::default()
                    .with_account_holder("acme")
                    .with_competitors(vec!["rival".to_string()]),
            )
            .await
            .unwrap();

        let outcome = h.guard.validate("/twitter-dashboard").await;

        let decision = outcome.decision().expect("should decide");
        assert!(decision.allow);
        assert_eq!(decision.reason, DecisionReason::BackendConfirmed);
        let account = decision.account.as_ref().expect("account should be attached");
        assert_eq!(account.account_holder, "acme");
        assert_eq!(account.competitors, vec!["rival".to_string()]);
        assert!(h.nav.visited().await.is_empty());

        // The confirmed read set the accessed flag for future fallbacks.
        assert_eq!(
            h.store
                .get(&keys::accessed("u1", Platform::Twitter))
                .await
                .unwrap(),
            Some("true".to_string())
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn immediate_second_validation_is_rate_limited() {
    timeout(TEST_TIMEOUT, async {
        let config = GuardConfig {
            min_validation_interval: Duration::from_millis(2000),
            ..test_config()
        };
        let h = harness(StubStatus::with_active_window(Platform::Twitter, 5), config);

        let first = h.guard.validate("/twitter-dashboard").await;
        let second = h.guard.validate("/twitter-dashboard").await;

        assert!(first.decision().is_some());
        assert!(matches!(second, ValidationOutcome::Throttled));
        assert_eq!(h.nav.visited().await.len(), 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn repeated_validation_never_navigates_twice() {
    timeout(TEST_TIMEOUT, async {
        let h = harness(
            StubStatus::with_active_window(Platform::Twitter, 5),
            test_config(),
        );

        for _ in 0..3 {
            h.guard.validate("/twitter-dashboard").await;
        }

        assert_eq!(h.nav.visited().await, vec!["/processing/twitter"]);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unreachable_backend_falls_back_to_cached_account() {
    timeout(TEST_TIMEOUT, async {
        let h = harness(StubStatus::unreachable(), test_config());
        h.cache
            .apply(
                "u1",
                Platform::Twitter,
                AccountUpdate::accessed(true).with_account_holder("acme"),
            )
            .await
            .unwrap();

        let outcome = h.guard.validate("/twitter-dashboard").await;

        let decision = outcome.decision().expect("should decide");
        assert!(decision.allow);
        assert_eq!(decision.reason, DecisionReason::CachedAccess);
        assert_eq!(
            decision.account.as_ref().map(|a| a.account_holder.as_str()),
            Some("acme")
        );
        assert!(h.nav.visited().await.is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unreachable_backend_without_account_redirects_to_onboarding() {
    timeout(TEST_TIMEOUT, async {
        let h = harness(StubStatus::unreachable(), test_config());

        let outcome = h.guard.validate("/twitter-dashboard").await;

        let decision = outcome.decision().expect("should decide");
        assert!(!decision.allow);
        assert_eq!(decision.reason, DecisionReason::NoLocalAccount);
        assert_eq!(h.nav.visited().await, vec!["/onboarding/twitter"]);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn slow_backend_fails_open_within_the_cap() {
    timeout(TEST_TIMEOUT, async {
        let config = GuardConfig {
            validation_timeout: Duration::from_millis(300),
            ..test_config()
        };
        let h = harness(
            StubStatus::unreachable().with_delay(Duration::from_secs(30)),
            config,
        );

        let started = std::time::Instant::now();
        let outcome = h.guard.validate("/twitter-dashboard").await;

        let decision = outcome.decision().expect("should decide");
        assert!(decision.allow);
        assert_eq!(decision.reason, DecisionReason::ValidationTimeout);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(h.nav.visited().await.is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn route_change_mid_flight_wins_the_cycle() {
    timeout(TEST_TIMEOUT, async {
        let h = harness(
            StubStatus::allowing().with_delay(Duration::from_millis(300)),
            test_config(),
        );
        let mut decisions = h.guard.subscribe();

        let background = h.guard.trigger("/twitter-dashboard");
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The user navigates away while the first validation is in flight.
        let deferred = h.guard.validate("/instagram-dashboard").await;
        assert!(matches!(deferred, ValidationOutcome::Deferred));

        background.await.unwrap();

        // The stale twitter decision was discarded; exactly one decision
        // lands, and it is for the route the user actually ended up on.
        let decision = decisions.recv().await.unwrap();
        assert_eq!(decision.route, "/instagram-dashboard");
        assert_eq!(decision.platform, Platform::Instagram);
        assert!(decisions.try_recv().is_err());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn cross_tab_countdown_triggers_one_debounced_revalidation() {
    timeout(TEST_TIMEOUT, async {
        let h = harness(StubStatus::unreachable(), test_config());
        h.cache
            .apply("u1", Platform::Twitter, AccountUpdate::accessed(true))
            .await
            .unwrap();

        h.guard.validate("/twitter-dashboard").await;
        let _sync = spawn_cross_tab_sync(
            Arc::clone(&h.guard),
            h.store.clone() as Arc<dyn KeyValueStore>,
        );
        let mut decisions = h.guard.subscribe();

        // Another tab observes a fresh processing window.
        let tab_b = h.store.handle("tab-b");
        tab_b
            .set("twitter_processing_countdown", "1700000300000")
            .await
            .unwrap();

        // Not instantaneous: nothing lands before the debounce settles.
        assert!(
            timeout(Duration::from_millis(300), decisions.recv())
                .await
                .is_err()
        );

        // Exactly one re-validation within the following window.
        let decision = timeout(Duration::from_millis(700), decisions.recv())
            .await
            .expect("re-validation should fire after the debounce")
            .unwrap();
        assert_eq!(decision.route, "/twitter-dashboard");

        assert!(
            timeout(Duration::from_millis(600), decisions.recv())
                .await
                .is_err()
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn irrelevant_and_own_session_mutations_do_not_revalidate() {
    timeout(TEST_TIMEOUT, async {
        let h = harness(StubStatus::unreachable(), test_config());
        h.cache
            .apply("u1", Platform::Twitter, AccountUpdate::accessed(true))
            .await
            .unwrap();

        h.guard.validate("/twitter-dashboard").await;
        let _sync = spawn_cross_tab_sync(
            Arc::clone(&h.guard),
            h.store.clone() as Arc<dyn KeyValueStore>,
        );
        let mut decisions = h.guard.subscribe();

        // A countdown write from this session's own origin.
        h.store
            .set("instagram_processing_countdown", "1700000300000")
            .await
            .unwrap();
        // A foreign write to a non-trigger key.
        let tab_b = h.store.handle("tab-b");
        tab_b.set("u1_twitter_username", "acme").await.unwrap();

        assert!(
            timeout(Duration::from_millis(800), decisions.recv())
                .await
                .is_err()
        );
    })
    .await
    .expect("test timed out");
}
