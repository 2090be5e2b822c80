//! Navigation detector — turns raw address-bar changes into logical
//! "navigated" outcomes. Two modes: history routing (path + query, fragment
//! stripped) and hash routing (full URL including fragment).

use glob::{MatchOptions, Pattern};
use tracing::warn;
use url::Url;

/// `*` stays within one path segment; only `**` crosses `/`.
const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingMode {
    History,
    Hash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The candidate equals the last accepted URL.
    SameUrl,
    /// An exclusion pattern matched; the last accepted URL is kept so the
    /// running engagement epoch keeps accumulating.
    Excluded,
    /// Automatic pageview capture is disabled.
    ManualMode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NavigationOutcome {
    Navigated { url: String, via_hash: bool },
    Ignored(IgnoreReason),
}

pub struct NavigationDetector {
    mode: RoutingMode,
    auto_capture: bool,
    exclusions: Vec<Pattern>,
    last_accepted: Option<String>,
}

impl NavigationDetector {
    pub fn new(mode: RoutingMode, auto_capture: bool, exclusions: &[String]) -> Self {
        let exclusions = exclusions
            .iter()
            .filter_map(|raw| {
                let trimmed = raw.trim_start_matches('#');
                match Pattern::new(trimmed) {
                    Ok(pattern) => Some(pattern),
                    Err(e) => {
                        warn!(pattern = %raw, error = %e, "ignoring invalid exclusion pattern");
                        None
                    }
                }
            })
            .collect();
        Self {
            mode,
            auto_capture,
            exclusions,
            last_accepted: None,
        }
    }

    pub fn last_accepted(&self) -> Option<&str> {
        self.last_accepted.as_deref()
    }

    /// Feed one raw address-bar change. Returns `Navigated` only for a
    /// distinct, non-excluded URL.
    pub fn observe(&mut self, raw_url: &str, _via_hash: bool) -> NavigationOutcome {
        if !self.auto_capture {
            return NavigationOutcome::Ignored(IgnoreReason::ManualMode);
        }
        let canonical = self.canonicalize(raw_url);
        if self.last_accepted.as_deref() == Some(canonical.as_str()) {
            return NavigationOutcome::Ignored(IgnoreReason::SameUrl);
        }
        if self.is_excluded(raw_url) {
            return NavigationOutcome::Ignored(IgnoreReason::Excluded);
        }
        self.last_accepted = Some(canonical.clone());
        NavigationOutcome::Navigated {
            url: canonical,
            via_hash: self.mode == RoutingMode::Hash,
        }
    }

    /// Accept a manually tracked pageview URL. Bypasses the distinct-URL
    /// check (an explicit call always counts) but records the URL so later
    /// automatic observations compare against it.
    pub fn accept(&mut self, raw_url: &str) -> String {
        let canonical = self.canonicalize(raw_url);
        self.last_accepted = Some(canonical.clone());
        canonical
    }

    /// Whether an exclusion pattern matches. In hash mode patterns match
    /// the fragment portion, otherwise the path.
    pub fn is_excluded(&self, raw_url: &str) -> bool {
        if self.exclusions.is_empty() {
            return false;
        }
        let candidate = match self.mode {
            RoutingMode::Hash => fragment_of(raw_url).unwrap_or_default(),
            RoutingMode::History => path_of(raw_url),
        };
        self.exclusions
            .iter()
            .any(|p| p.matches_with(&candidate, GLOB_OPTIONS))
    }

    fn canonicalize(&self, raw_url: &str) -> String {
        match self.mode {
            // Full URL including the fragment: each distinct fragment is a
            // distinct logical page.
            RoutingMode::Hash => raw_url.to_string(),
            RoutingMode::History => strip_fragment(raw_url),
        }
    }
}

fn strip_fragment(raw_url: &str) -> String {
    match Url::parse(raw_url) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => raw_url.split('#').next().unwrap_or(raw_url).to_string(),
    }
}

fn fragment_of(raw_url: &str) -> Option<String> {
    match Url::parse(raw_url) {
        Ok(url) => url.fragment().map(str::to_string),
        Err(_) => raw_url.split_once('#').map(|(_, f)| f.to_string()),
    }
}

fn path_of(raw_url: &str) -> String {
    match Url::parse(raw_url) {
        Ok(url) => url.path().to_string(),
        Err(_) => raw_url.split('#').next().unwrap_or(raw_url).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn navigated(outcome: NavigationOutcome) -> String {
        match outcome {
            NavigationOutcome::Navigated { url, .. } => url,
            other => panic!("expected Navigated, got {other:?}"),
        }
    }

    #[test]
    fn test_history_mode_strips_fragment() {
        let mut detector = NavigationDetector::new(RoutingMode::History, true, &[]);
        let url = navigated(detector.observe("https://example.com/docs#install", false));
        assert_eq!(url, "https://example.com/docs");

        // A fragment-only change is not a navigation in history mode.
        let outcome = detector.observe("https://example.com/docs#usage", true);
        assert_eq!(outcome, NavigationOutcome::Ignored(IgnoreReason::SameUrl));
    }

    #[test]
    fn test_history_mode_distinct_paths() {
        let mut detector = NavigationDetector::new(RoutingMode::History, true, &[]);
        detector.observe("https://example.com/", false);
        let url = navigated(detector.observe("https://example.com/pricing?ref=nav", false));
        assert_eq!(url, "https://example.com/pricing?ref=nav");
    }

    #[test]
    fn test_hash_mode_distinct_fragments_navigate() {
        let mut detector = NavigationDetector::new(RoutingMode::Hash, true, &[]);
        detector.observe("https://example.com/#/home", true);
        let outcome = detector.observe("https://example.com/#/about", true);
        match outcome {
            NavigationOutcome::Navigated { url, via_hash } => {
                assert_eq!(url, "https://example.com/#/about");
                assert!(via_hash);
            }
            other => panic!("expected Navigated, got {other:?}"),
        }
    }

    #[test]
    fn test_repeated_url_is_ignored() {
        let mut detector = NavigationDetector::new(RoutingMode::Hash, true, &[]);
        detector.observe("https://example.com/#/home", true);
        let outcome = detector.observe("https://example.com/#/home", true);
        assert_eq!(outcome, NavigationOutcome::Ignored(IgnoreReason::SameUrl));
    }

    #[test]
    fn test_excluded_fragment_never_navigates() {
        let patterns = vec!["hash/should/be/ignored".to_string()];
        let mut detector = NavigationDetector::new(RoutingMode::Hash, true, &patterns);
        detector.observe("https://example.com/#landing", true);

        let outcome = detector.observe("https://example.com/#hash/should/be/ignored", true);
        assert_eq!(outcome, NavigationOutcome::Ignored(IgnoreReason::Excluded));
        // The excluded URL does not become the comparison point.
        assert_eq!(
            detector.last_accepted(),
            Some("https://example.com/#landing")
        );
    }

    #[test]
    fn test_glob_wildcards_in_path_patterns() {
        let patterns = vec!["/admin/**".to_string(), "/draft-*".to_string()];
        let mut detector = NavigationDetector::new(RoutingMode::History, true, &patterns);

        assert!(detector.is_excluded("https://example.com/admin/users/42"));
        assert!(detector.is_excluded("https://example.com/draft-post"));
        assert!(!detector.is_excluded("https://example.com/blog/draft-post"));
        // Single-star wildcards stay inside one path segment.
        let single = NavigationDetector::new(RoutingMode::History, true, &["/admin/*".into()]);
        assert!(single.is_excluded("https://example.com/admin/users"));
        assert!(!single.is_excluded("https://example.com/admin/users/42"));

        let outcome = detector.observe("https://example.com/admin/users/42", false);
        assert_eq!(outcome, NavigationOutcome::Ignored(IgnoreReason::Excluded));
    }

    #[test]
    fn test_manual_mode_never_auto_navigates() {
        let mut detector = NavigationDetector::new(RoutingMode::History, false, &[]);
        let outcome = detector.observe("https://example.com/page", false);
        assert_eq!(outcome, NavigationOutcome::Ignored(IgnoreReason::ManualMode));

        // An explicit pageview still registers.
        let url = detector.accept("https://example.com/page#top");
        assert_eq!(url, "https://example.com/page");
        assert_eq!(detector.last_accepted(), Some("https://example.com/page"));
    }

    #[test]
    fn test_invalid_pattern_is_skipped() {
        let patterns = vec!["[".to_string(), "/ok/*".to_string()];
        let detector = NavigationDetector::new(RoutingMode::History, true, &patterns);
        assert!(detector.is_excluded("https://example.com/ok/page"));
    }
}
