//! Tracker configuration — validation and normalization of the invocation
//! config. Immutable once init succeeds; the init-once rule is enforced by
//! the handle, not here.

use pulse_core::{PropMap, PropValue, PulseError, PulseResult};
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Source of custom properties merged into every composed event.
#[derive(Clone, Default)]
pub enum PropsSource {
    #[default]
    None,
    /// A fixed property map used as-is.
    Static(PropMap),
    /// Invoked with the event name; must return a JSON object. Non-object
    /// returns are ignored and the event proceeds with no custom props.
    Dynamic(Arc<dyn Fn(&str) -> serde_json::Value + Send + Sync>),
}

impl PropsSource {
    /// Build a source from a loose JSON value (the script-tag embedding
    /// hands these through untyped). Anything that is not an object is
    /// silently ignored — the feature behaves as disabled, not an error.
    pub fn from_value(value: serde_json::Value) -> PropsSource {
        match value {
            serde_json::Value::Object(map) => {
                let props: PropMap = map
                    .iter()
                    .filter_map(|(k, v)| PropValue::from_json(v).map(|p| (k.clone(), p)))
                    .collect();
                PropsSource::Static(props)
            }
            _ => PropsSource::None,
        }
    }

    pub fn dynamic<F>(f: F) -> PropsSource
    where
        F: Fn(&str) -> serde_json::Value + Send + Sync + 'static,
    {
        PropsSource::Dynamic(Arc::new(f))
    }
}

impl fmt::Debug for PropsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropsSource::None => write!(f, "PropsSource::None"),
            PropsSource::Static(map) => write!(f, "PropsSource::Static({} keys)", map.len()),
            PropsSource::Dynamic(_) => write!(f, "PropsSource::Dynamic(..)"),
        }
    }
}

/// User-supplied request transform, applied to the composed payload just
/// before delivery. Returning `None` cancels delivery for that event.
#[derive(Clone)]
pub struct TransformHook(Arc<dyn Fn(serde_json::Value) -> Option<serde_json::Value> + Send + Sync>);

impl TransformHook {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(serde_json::Value) -> Option<serde_json::Value> + Send + Sync + 'static,
    {
        TransformHook(Arc::new(f))
    }

    pub fn apply(&self, payload: serde_json::Value) -> Option<serde_json::Value> {
        (self.0)(payload)
    }
}

impl fmt::Debug for TransformHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransformHook(..)")
    }
}

/// Resolved invocation configuration for one page load.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Site domain events are attributed to. Required.
    pub domain: String,
    /// Collection endpoint: an absolute URL or a site-relative path.
    pub endpoint: String,
    pub capture_on_localhost: bool,
    pub hash_based_routing: bool,
    /// When false (manual mode) no automatic pageviews are emitted and the
    /// engagement clock only starts with the first explicit pageview.
    pub auto_capture_pageviews: bool,
    pub outbound_links: bool,
    pub file_downloads: bool,
    pub form_submissions: bool,
    pub tagged_events: bool,
    pub revenue: bool,
    /// Glob-like URL exclusion patterns (`*` within a segment, `**` across).
    pub exclusions: Vec<String>,
    /// Gates ignored-event warnings. Default on.
    pub logging: bool,
    /// Install the handle into the process-wide binding on init.
    pub bind_global: bool,
    /// URL of the page at script load, resolved by the embedding. Seeds the
    /// initial automatic pageview and serves as the fallback event URL.
    pub page_url: Option<String>,
    /// Referrer of the initial document, resolved by the embedding.
    pub referrer: Option<String>,
    pub custom_properties: PropsSource,
    pub transform_request: Option<TransformHook>,
}

impl TrackerConfig {
    pub fn new(domain: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Validate the required fields. Called by the handle before any state
    /// is established.
    pub fn validate(&self) -> PulseResult<()> {
        if self.domain.trim().is_empty() {
            return Err(PulseError::Config(
                "`domain` argument is required".to_string(),
            ));
        }
        if self.endpoint.trim().is_empty() {
            return Err(PulseError::Config(
                "`endpoint` argument is required".to_string(),
            ));
        }
        match Url::parse(&self.endpoint) {
            Ok(_) => Ok(()),
            // Site-relative endpoints ("/api/event") are resolved against
            // the page origin by the embedding.
            Err(url::ParseError::RelativeUrlWithoutBase) if self.endpoint.starts_with('/') => {
                Ok(())
            }
            Err(_) => Err(PulseError::Config(format!(
                "`endpoint` is not a valid URL: {}",
                self.endpoint
            ))),
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            endpoint: String::new(),
            capture_on_localhost: false,
            hash_based_routing: false,
            auto_capture_pageviews: true,
            outbound_links: true,
            file_downloads: true,
            form_submissions: true,
            tagged_events: true,
            revenue: true,
            exclusions: Vec::new(),
            logging: true,
            bind_global: false,
            page_url: None,
            referrer: None,
            custom_properties: PropsSource::None,
            transform_request: None,
        }
    }
}

/// True for URLs the engine skips unless `capture_on_localhost` is set:
/// loopback hosts and `file://` documents.
pub(crate) fn is_local_url(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(url) => {
            if url.scheme() == "file" {
                return true;
            }
            matches!(
                url.host_str(),
                Some("localhost") | Some("127.0.0.1") | Some("[::1]") | Some("::1")
            )
        }
        Err(_) => false,
    }
}
