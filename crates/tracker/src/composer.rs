//! Event composer — builds the wire payload for any event kind, applying
//! custom-properties resolution and the user's request transform.

use std::sync::Arc;

use pulse_core::{EventPayload, PropMap, PropValue, PulseResult, Revenue, SCRIPT_VERSION};
use tracing::debug;

use crate::config::{PropsSource, TrackerConfig};
use crate::engagement::EngagementSample;
use crate::gates::FeatureGates;

pub const PAGEVIEW_EVENT: &str = "pageview";
pub const ENGAGEMENT_EVENT: &str = "engagement";

pub struct EventComposer {
    config: Arc<TrackerConfig>,
    gates: FeatureGates,
}

impl EventComposer {
    pub fn new(config: Arc<TrackerConfig>, gates: FeatureGates) -> Self {
        Self { config, gates }
    }

    /// Resolve the final props for an event: the configured custom
    /// properties as the base, with explicit user props overriding same-key
    /// entries. A dynamic source is invoked exactly once per call; callers
    /// pin the result to the engagement epoch so the paired engagement
    /// event reuses it verbatim instead of re-invoking the source.
    pub fn resolve_props(
        &self,
        event_name: &str,
        user_props: Option<&serde_json::Value>,
    ) -> Option<PropMap> {
        let custom = match &self.config.custom_properties {
            PropsSource::None => None,
            PropsSource::Static(map) => (!map.is_empty()).then(|| map.clone()),
            // A non-object return is swallowed: the event proceeds with no
            // custom props, never an error.
            PropsSource::Dynamic(f) => sanitize_props(&f(event_name)),
        };
        let user = user_props.and_then(sanitize_props);

        match (custom, user) {
            (None, None) => None,
            (Some(map), None) | (None, Some(map)) => Some(map),
            (Some(mut base), Some(user)) => {
                base.extend(user);
                Some(base)
            }
        }
    }

    pub fn compose(
        &self,
        name: &str,
        url: &str,
        props: Option<PropMap>,
        revenue: Option<Revenue>,
        interactive: bool,
        referrer: Option<String>,
    ) -> EventPayload {
        EventPayload {
            name: name.to_string(),
            url: url.to_string(),
            domain: self.config.domain.clone(),
            referrer: referrer.or_else(|| self.config.referrer.clone()),
            props,
            revenue: revenue.filter(|_| self.gates.revenue),
            interactive,
            hash_mode: self.gates.hash_routing.then_some(1),
            engagement_ms: None,
            scroll_depth: None,
            script_version: SCRIPT_VERSION.to_string(),
        }
    }

    /// Compose an engagement event from a flushed sample. Carries the
    /// sample's pinned props and is the only event kind with `e`/`sd`.
    pub fn compose_engagement(&self, sample: &EngagementSample) -> EventPayload {
        let mut payload = self.compose(
            ENGAGEMENT_EVENT,
            &sample.url,
            sample.props.clone(),
            None,
            false,
            None,
        );
        payload.engagement_ms = Some(sample.duration_ms);
        payload.scroll_depth = Some(sample.scroll_depth);
        payload
    }

    /// Run the user's transform hook over the serialized payload. `None`
    /// cancels delivery for exactly this event. Any other return value —
    /// object or not — proceeds to delivery as-is.
    pub fn apply_transform(&self, payload: &EventPayload) -> PulseResult<Option<serde_json::Value>> {
        let value = serde_json::to_value(payload)?;
        match &self.config.transform_request {
            None => Ok(Some(value)),
            Some(hook) => {
                let transformed = hook.apply(value);
                if transformed.is_none() {
                    debug!(event = %payload.name, "delivery cancelled by transform hook");
                }
                Ok(transformed)
            }
        }
    }
}

/// Coerce a loose JSON value into a scalar prop map. Non-objects yield
/// `None`; nested values inside an object are dropped entry-by-entry.
pub(crate) fn sanitize_props(value: &serde_json::Value) -> Option<PropMap> {
    let object = value.as_object()?;
    let map: PropMap = object
        .iter()
        .filter_map(|(k, v)| PropValue::from_json(v).map(|p| (k.clone(), p)))
        .collect();
    (!map.is_empty()).then_some(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn make_composer(config: TrackerConfig) -> EventComposer {
        let gates = FeatureGates::resolve(&config);
        EventComposer::new(Arc::new(config), gates)
    }

    #[test]
    fn test_compose_basic_pageview() {
        let composer = make_composer(TrackerConfig::new("example.com", "/api/event"));
        let payload = composer.compose(
            PAGEVIEW_EVENT,
            "https://example.com/",
            None,
            None,
            true,
            Some("https://news.ycombinator.com/".into()),
        );
        assert_eq!(payload.name, "pageview");
        assert_eq!(payload.domain, "example.com");
        assert_eq!(payload.referrer.as_deref(), Some("https://news.ycombinator.com/"));
        assert!(payload.hash_mode.is_none());
        assert!(payload.engagement_ms.is_none());
    }

    #[test]
    fn test_user_props_override_custom_props() {
        let mut config = TrackerConfig::new("example.com", "/api/event");
        config.custom_properties = PropsSource::from_value(serde_json::json!({
            "team": "growth",
            "plan": "free"
        }));
        let composer = make_composer(config);

        let props = composer
            .resolve_props("Signup", Some(&serde_json::json!({"plan": "pro"})))
            .expect("merged props");
        assert_eq!(props.get("team"), Some(&"growth".into()));
        assert_eq!(props.get("plan"), Some(&"pro".into()));
    }

    #[test]
    fn test_dynamic_source_bad_return_is_swallowed() {
        let mut config = TrackerConfig::new("example.com", "/api/event");
        config.custom_properties = PropsSource::dynamic(|_| serde_json::json!("not an object"));
        let composer = make_composer(config);

        assert!(composer.resolve_props("pageview", None).is_none());
    }

    #[test]
    fn test_dynamic_source_invoked_once_per_resolution() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut config = TrackerConfig::new("example.com", "/api/event");
        config.custom_properties = PropsSource::dynamic(move |name| {
            counter.fetch_add(1, Ordering::SeqCst);
            serde_json::json!({ "for": name })
        });
        let composer = make_composer(config);

        composer.resolve_props("pageview", None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_engagement_carries_duration_and_depth() {
        let composer = make_composer(TrackerConfig::new("example.com", "/api/event"));
        let sample = EngagementSample {
            url: "https://example.com/post".into(),
            duration_ms: 5400,
            scroll_depth: 72,
            props: Some([("author".to_string(), "jane".into())].into()),
        };
        let payload = composer.compose_engagement(&sample);
        assert_eq!(payload.name, "engagement");
        assert_eq!(payload.engagement_ms, Some(5400));
        assert_eq!(payload.scroll_depth, Some(72));
        assert!(!payload.interactive);
        assert_eq!(
            payload.props.unwrap().get("author"),
            Some(&"jane".into())
        );
    }

    #[test]
    fn test_revenue_dropped_when_gate_off() {
        let mut config = TrackerConfig::new("example.com", "/api/event");
        config.revenue = false;
        let composer = make_composer(config);
        let payload = composer.compose(
            "Purchase",
            "https://example.com/checkout",
            None,
            Some(Revenue {
                currency: "USD".into(),
                amount: "10.00".into(),
            }),
            true,
            None,
        );
        assert!(payload.revenue.is_none());
    }

    #[test]
    fn test_hash_flag_follows_config() {
        let mut config = TrackerConfig::new("example.com", "/api/event");
        config.hash_based_routing = true;
        let composer = make_composer(config);
        let payload = composer.compose(PAGEVIEW_EVENT, "https://example.com/#/a", None, None, true, None);
        assert_eq!(payload.hash_mode, Some(1));
    }

    #[test]
    fn test_transform_null_cancels() {
        let mut config = TrackerConfig::new("example.com", "/api/event");
        config.transform_request = Some(crate::config::TransformHook::new(|_| None));
        let composer = make_composer(config);
        let payload = composer.compose(PAGEVIEW_EVENT, "https://example.com/", None, None, true, None);
        assert!(composer.apply_transform(&payload).unwrap().is_none());
    }

    #[test]
    fn test_transform_non_object_return_proceeds_as_is() {
        // Known permissive edge case: a non-object return is delivered
        // untouched rather than rejected.
        let mut config = TrackerConfig::new("example.com", "/api/event");
        config.transform_request = Some(crate::config::TransformHook::new(|_| {
            Some(serde_json::json!("mangled"))
        }));
        let composer = make_composer(config);
        let payload = composer.compose(PAGEVIEW_EVENT, "https://example.com/", None, None, true, None);
        let body = composer.apply_transform(&payload).unwrap().unwrap();
        assert_eq!(body, serde_json::json!("mangled"));
    }

    #[test]
    fn test_transform_can_rewrite_fields() {
        let mut config = TrackerConfig::new("example.com", "/api/event");
        config.transform_request = Some(crate::config::TransformHook::new(|mut value| {
            value["u"] = serde_json::json!("https://example.com/redacted");
            Some(value)
        }));
        let composer = make_composer(config);
        let payload = composer.compose(
            PAGEVIEW_EVENT,
            "https://example.com/user/12345",
            None,
            None,
            true,
            None,
        );
        let body = composer.apply_transform(&payload).unwrap().unwrap();
        assert_eq!(body["u"], "https://example.com/redacted");
    }
}
