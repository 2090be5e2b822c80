//! Feature gates — compile-time cargo features ANDed with runtime config
//! toggles. A disabled gate means the subsystem installs no listeners and
//! its operations are no-ops, so disabled features carry zero runtime cost
//! in builds that compile them out.

use crate::config::TrackerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureGates {
    pub outbound_links: bool,
    pub file_downloads: bool,
    pub tagged_events: bool,
    pub form_submissions: bool,
    pub hash_routing: bool,
    pub revenue: bool,
    pub exclusions: bool,
}

impl FeatureGates {
    /// Gates as compiled into this build. The legacy script-tag embedding
    /// reads these constants directly; the programmatic embedding narrows
    /// them further via [`FeatureGates::resolve`].
    pub const fn compiled() -> Self {
        Self {
            outbound_links: cfg!(feature = "outbound-links"),
            file_downloads: cfg!(feature = "file-downloads"),
            tagged_events: cfg!(feature = "tagged-events"),
            form_submissions: cfg!(feature = "form-submissions"),
            hash_routing: cfg!(feature = "hash-routing"),
            revenue: cfg!(feature = "revenue"),
            exclusions: cfg!(feature = "exclusions"),
        }
    }

    /// Narrow the compiled gates with the runtime configuration. A feature
    /// compiled out can never be re-enabled at runtime.
    pub fn resolve(config: &TrackerConfig) -> Self {
        let compiled = Self::compiled();
        Self {
            outbound_links: compiled.outbound_links && config.outbound_links,
            file_downloads: compiled.file_downloads && config.file_downloads,
            tagged_events: compiled.tagged_events && config.tagged_events,
            form_submissions: compiled.form_submissions && config.form_submissions,
            hash_routing: compiled.hash_routing && config.hash_based_routing,
            revenue: compiled.revenue && config.revenue,
            exclusions: compiled.exclusions && !config.exclusions.is_empty(),
        }
    }
}
