//! Configuration types.

use std::time::Duration;

/// Guard timing configuration.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Cap on a single backend status query.
    pub query_timeout: Duration,
    /// Cap on a whole validation cycle (exceeding it fails open).
    pub validation_timeout: Duration,
    /// Minimum gap between two accepted validation runs.
    pub min_validation_interval: Duration,
    /// Settle window before a cross-tab trigger re-validates.
    pub revalidate_debounce: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(5),
            validation_timeout: Duration::from_secs(15),
            min_validation_interval: Duration::from_millis(2000),
            revalidate_debounce: Duration::from_millis(400),
        }
    }
}
