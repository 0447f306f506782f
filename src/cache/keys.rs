//! Storage key scheme.
//!
//! Per-account records are keyed `{user}_{platform}_{field}`. The
//! cross-session trigger is keyed `{platform}_processing_countdown` with
//! no user prefix, so every session of the account observes it.

use std::sync::LazyLock;

use regex::Regex;

use crate::platform::Platform;

static COUNTDOWN_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<platform>[a-z0-9]+)_processing_countdown$").unwrap());

/// Whether the account's dashboard was ever successfully entered.
pub fn accessed(user: &str, platform: Platform) -> String {
    format!("{user}_{platform}_accessed")
}

/// The connected account's username.
pub fn username(user: &str, platform: Platform) -> String {
    format!("{user}_{platform}_username")
}

/// Tracked competitor accounts, as a JSON string array.
pub fn competitors(user: &str, platform: Platform) -> String {
    format!("{user}_{platform}_competitors")
}

/// Branding or non-branding account classification.
pub fn account_type(user: &str, platform: Platform) -> String {
    format!("{user}_{platform}_account_type")
}

/// Raw account record written by the onboarding flow (JSON).
pub fn account_data(user: &str, platform: Platform) -> String {
    format!("{user}_{platform}_account_data")
}

/// Last observed processing window (JSON).
pub fn processing_info(user: &str, platform: Platform) -> String {
    format!("{user}_{platform}_processing_info")
}

/// The cross-session re-validation trigger key for a platform.
pub fn processing_countdown(platform: Platform) -> String {
    format!("{platform}_processing_countdown")
}

/// Whether a mutated key is a re-validation trigger. Unknown platform
/// prefixes still trigger; the platform is log context only.
pub fn is_countdown_key(key: &str) -> bool {
    COUNTDOWN_KEY.is_match(key)
}

/// The platform prefix of a trigger key, if it is one.
pub fn countdown_platform(key: &str) -> Option<&str> {
    COUNTDOWN_KEY
        .captures(key)
        .and_then(|c| c.name("platform"))
        .map(|m| m.as_str())
}
