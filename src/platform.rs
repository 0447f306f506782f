//! Platforms and route resolution.
//!
//! Routes map to platforms deterministically: exact route match first,
//! platform-name substring second, primary platform as the final default.
//! Only dashboard routes are access-gated; processing and onboarding views
//! are not, so a redirect target can never re-enter the guard.

use serde::{Deserialize, Serialize};

/// A connected social platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Twitter,
    Instagram,
    Facebook,
    Linkedin,
    Tiktok,
}

impl Platform {
    /// All supported platforms, in launch order.
    pub const ALL: [Platform; 5] = [
        Platform::Twitter,
        Platform::Instagram,
        Platform::Facebook,
        Platform::Linkedin,
        Platform::Tiktok,
    ];

    /// The first-launched connector; the resolver's fallback.
    pub const fn primary() -> Platform {
        Platform::Twitter
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Platform::Twitter => "twitter",
            Platform::Instagram => "instagram",
            Platform::Facebook => "facebook",
            Platform::Linkedin => "linkedin",
            Platform::Tiktok => "tiktok",
        }
    }

    /// Parse a stored or wire-format platform name.
    pub fn parse(s: &str) -> Option<Platform> {
        match s {
            "twitter" => Some(Platform::Twitter),
            "instagram" => Some(Platform::Instagram),
            "facebook" => Some(Platform::Facebook),
            "linkedin" => Some(Platform::Linkedin),
            "tiktok" => Some(Platform::Tiktok),
            _ => None,
        }
    }

    /// The access-gated dashboard route for this platform.
    pub fn dashboard_path(&self) -> String {
        format!("/{}-dashboard", self.as_str())
    }

    /// The wait view shown while a backend processing job runs.
    pub fn processing_path(&self) -> String {
        format!("/processing/{}", self.as_str())
    }

    /// The onboarding flow entry for this platform.
    pub fn onboarding_path(&self) -> String {
        format!("/onboarding/{}", self.as_str())
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resolve a route path to the platform it concerns.
///
/// Exact dashboard/processing/onboarding routes win; otherwise the first
/// platform whose name appears anywhere in the path; otherwise the primary
/// platform. Pure, so resolving the same path twice always agrees.
pub fn resolve_route(path: &str) -> Platform {
    let path = normalize(path);

    for platform in Platform::ALL {
        if path == platform.dashboard_path()
            || path == platform.processing_path()
            || path == platform.onboarding_path()
        {
            return platform;
        }
    }

    for platform in Platform::ALL {
        if path.contains(platform.as_str()) {
            return platform;
        }
    }

    Platform::primary()
}

/// Whether a route requires access validation before rendering.
pub fn is_gated(path: &str) -> bool {
    normalize(path).ends_with("-dashboard")
}

/// Strip query string, fragment, and trailing slashes.
fn normalize(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}
