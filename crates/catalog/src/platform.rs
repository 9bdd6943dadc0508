//! Supported application platforms and their bundled default spec layers.

use serde::Serialize;
use std::fmt;

/// How enrollments are discovered for a platform's experiments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentsQueryType {
    /// Desktop enrollment events from the normandy event stream.
    Normandy,
    /// Glean `nimbus_events.enrollment` events keyed by app id.
    GleanEvent,
}

impl fmt::Display for EnrollmentsQueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnrollmentsQueryType::Normandy => write!(f, "normandy"),
            EnrollmentsQueryType::GleanEvent => write!(f, "glean_event"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PlatformConfig {
    pub name: &'static str,
    pub app_ids: &'static [&'static str],
    pub enrollments_query_type: EnrollmentsQueryType,
    /// TOML text of the default spec layer for this platform.
    #[serde(skip)]
    pub default_spec: &'static str,
}

pub const DEFAULT_PLATFORM: &str = "firefox_desktop";

pub static PLATFORMS: &[PlatformConfig] = &[
    PlatformConfig {
        name: "firefox_desktop",
        app_ids: &["firefox-desktop"],
        enrollments_query_type: EnrollmentsQueryType::Normandy,
        default_spec: include_str!("../defaults/firefox_desktop.toml"),
    },
    PlatformConfig {
        name: "fenix",
        app_ids: &[
            "org.mozilla.firefox",
            "org.mozilla.firefox_beta",
            "org.mozilla.fenix",
        ],
        enrollments_query_type: EnrollmentsQueryType::GleanEvent,
        default_spec: include_str!("../defaults/fenix.toml"),
    },
    PlatformConfig {
        name: "firefox_ios",
        app_ids: &[
            "org.mozilla.ios.Firefox",
            "org.mozilla.ios.FirefoxBeta",
            "org.mozilla.ios.Fennec",
        ],
        enrollments_query_type: EnrollmentsQueryType::GleanEvent,
        default_spec: include_str!("../defaults/firefox_ios.toml"),
    },
];

pub fn platform(name: &str) -> Option<&'static PlatformConfig> {
    PLATFORMS.iter().find(|p| p.name == name)
}

/// Platform for an experiment's app name, falling back to a search by app
/// id. Experiments without either are desktop experiments.
pub fn platform_for_app(app_name: &str, app_id: &str) -> Option<&'static PlatformConfig> {
    if app_name.is_empty() && app_id.is_empty() {
        return platform(DEFAULT_PLATFORM);
    }
    platform(app_name).or_else(|| PLATFORMS.iter().find(|p| p.app_ids.contains(&app_id)))
}
