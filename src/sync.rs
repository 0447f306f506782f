//! Cross-tab sync.
//!
//! Watches the store's mutation bus for processing-countdown keys written
//! by other sessions of the same account. Each relevant mutation schedules
//! one debounced re-validation of the current route; bursts coalesce into
//! the pending one, and the re-validation is skipped entirely if a
//! validation is already in flight when the debounce settles.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use crate::cache::{KeyValueStore, StoreEvent, keys};
use crate::guard::AccessGuard;

/// Spawn the background task observing storage mutations.
///
/// Runs until the store's event bus closes. Abort the handle to stop it
/// earlier.
pub fn spawn_cross_tab_sync(
    guard: Arc<AccessGuard>,
    store: Arc<dyn KeyValueStore>,
) -> JoinHandle<()> {
    let own_origin = store.origin().to_string();
    let mut events = store.subscribe();
    let debounce = guard.config().revalidate_debounce;

    tokio::spawn(async move {
        info!(origin = %own_origin, "Cross-tab sync started");

        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Cross-tab sync lagged behind the event bus");
                    continue;
                }
                Err(RecvError::Closed) => {
                    info!("Store event bus closed, cross-tab sync stopping");
                    return;
                }
            };
            if !is_foreign_trigger(&event, &own_origin) {
                continue;
            }

            debug!(
                key = %event.key,
                platform = ?keys::countdown_platform(&event.key),
                origin = %event.origin,
                "Processing countdown changed in another session"
            );

            // Settle window: further triggers fold into this pending one.
            let deadline = Instant::now() + debounce;
            let mut closed = false;
            loop {
                match timeout_at(deadline, events.recv()).await {
                    Ok(Ok(event)) => {
                        if is_foreign_trigger(&event, &own_origin) {
                            debug!(key = %event.key, "Coalesced into pending re-validation");
                        }
                    }
                    Ok(Err(RecvError::Lagged(skipped))) => {
                        warn!(skipped, "Cross-tab sync lagged behind the event bus");
                    }
                    Ok(Err(RecvError::Closed)) => {
                        closed = true;
                        break;
                    }
                    Err(_) => break,
                }
            }

            if guard.is_validating().await {
                debug!("Validation already in flight, skipping cross-tab re-validation");
            } else {
                let outcome = guard.revalidate().await;
                debug!(outcome = outcome.label(), "Cross-tab re-validation finished");
            }

            if closed {
                info!("Store event bus closed, cross-tab sync stopping");
                return;
            }
        }
    })
}

fn is_foreign_trigger(event: &StoreEvent, own_origin: &str) -> bool {
    event.origin != own_origin && keys::is_countdown_key(&event.key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_origin_events_are_not_triggers() {
        let event = StoreEvent {
            key: "twitter_processing_countdown".to_string(),
            origin: "tab-a".to_string(),
        };
        assert!(!is_foreign_trigger(&event, "tab-a"));
        assert!(is_foreign_trigger(&event, "tab-b"));
    }

    #[test]
    fn non_countdown_keys_are_not_triggers() {
        let event = StoreEvent {
            key: "u1_twitter_username".to_string(),
            origin: "tab-a".to_string(),
        };
        assert!(!is_foreign_trigger(&event, "tab-b"));
    }
}
