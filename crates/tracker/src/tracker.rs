//! The tracker — wires the navigation detector, engagement state machine,
//! event composer and delivery layer together, and exposes the `track`
//! API plus the page-signal entry point.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pulse_core::{PageSignal, PulseError, PulseResult, Revenue};
use tracing::{debug, warn};

use crate::composer::{EventComposer, ENGAGEMENT_EVENT, PAGEVIEW_EVENT};
use crate::config::{is_local_url, TrackerConfig};
use crate::delivery::{DeliveryCallback, DeliveryLayer, HttpTransport, Transport};
use crate::engagement::EngagementTracker;
use crate::gates::FeatureGates;
use crate::navigation::{IgnoreReason, NavigationDetector, NavigationOutcome, RoutingMode};

pub const OUTBOUND_LINK_EVENT: &str = "Outbound Link: Click";
pub const FILE_DOWNLOAD_EVENT: &str = "File Download";
pub const FORM_SUBMISSION_EVENT: &str = "Form: Submission";

/// Per-call options for `track`.
#[derive(Clone, Default)]
pub struct TrackOptions {
    /// Loose JSON props; non-scalar entries are dropped during coercion.
    pub props: Option<serde_json::Value>,
    pub revenue: Option<Revenue>,
    /// Defaults to true; the embedding clears it for prerendered pages.
    pub interactive: Option<bool>,
    pub url: Option<String>,
    pub referrer: Option<String>,
    pub callback: Option<DeliveryCallback>,
}

impl TrackOptions {
    pub fn with_props(props: serde_json::Value) -> Self {
        Self {
            props: Some(props),
            ..Default::default()
        }
    }

    fn interactive(&self) -> bool {
        self.interactive.unwrap_or(true)
    }
}

impl fmt::Debug for TrackOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackOptions")
            .field("props", &self.props)
            .field("revenue", &self.revenue)
            .field("interactive", &self.interactive)
            .field("url", &self.url)
            .field("referrer", &self.referrer)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

pub struct Tracker {
    config: Arc<TrackerConfig>,
    gates: FeatureGates,
    composer: EventComposer,
    delivery: DeliveryLayer,
    detector: Mutex<NavigationDetector>,
    engagement: Mutex<EngagementTracker>,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> PulseResult<Self> {
        let transport = Arc::new(HttpTransport::new()?);
        Self::with_transport(config, transport)
    }

    /// Construct with an injected transport (tests, custom delivery).
    pub fn with_transport(config: TrackerConfig, transport: Arc<dyn Transport>) -> PulseResult<Self> {
        config.validate()?;
        let gates = FeatureGates::resolve(&config);
        let mode = if gates.hash_routing {
            RoutingMode::Hash
        } else {
            RoutingMode::History
        };
        let exclusions = if gates.exclusions {
            config.exclusions.clone()
        } else {
            Vec::new()
        };
        let detector = NavigationDetector::new(mode, config.auto_capture_pageviews, &exclusions);
        let config = Arc::new(config);
        let composer = EventComposer::new(config.clone(), gates);
        let delivery = DeliveryLayer::new(transport, config.endpoint.clone());
        Ok(Self {
            config,
            gates,
            composer,
            delivery,
            detector: Mutex::new(detector),
            engagement: Mutex::new(EngagementTracker::new()),
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn gates(&self) -> FeatureGates {
        self.gates
    }

    /// Emit the initial automatic pageview for the page the engine loaded
    /// on. Called once by the handle after init.
    pub(crate) fn start(&self, at: DateTime<Utc>) {
        if !self.config.auto_capture_pageviews {
            return;
        }
        if let Some(url) = self.config.page_url.clone() {
            self.on_url_changed(&url, false, at);
        }
    }

    /// Entry point for the DOM adapter's translated browser events.
    pub fn signal(&self, signal: PageSignal, at: DateTime<Utc>) {
        match signal {
            PageSignal::UrlChanged { url, via_hash } => self.on_url_changed(&url, via_hash, at),
            PageSignal::VisibilityChanged { visible } => {
                let flushed = self.engagement.lock().set_visibility(visible, at);
                if let Some(sample) = flushed {
                    self.emit_engagement_sample(&sample);
                }
            }
            PageSignal::FocusChanged { focused } => {
                let flushed = self.engagement.lock().set_focus(focused, at);
                if let Some(sample) = flushed {
                    self.emit_engagement_sample(&sample);
                }
            }
            PageSignal::Scrolled {
                scroll_top,
                viewport_height,
                document_height,
            } => {
                self.engagement
                    .lock()
                    .record_scroll(scroll_top, viewport_height, document_height);
            }
            PageSignal::Unloading => {
                // The FIFO worker owns the request, so the unload path is
                // the same keep-alive dispatch as everything else.
                let flushed = self.engagement.lock().finalize(at);
                if let Some(sample) = flushed {
                    self.emit_engagement_sample(&sample);
                }
            }
        }
    }

    fn on_url_changed(&self, url: &str, via_hash: bool, at: DateTime<Utc>) {
        let outcome = self.detector.lock().observe(url, via_hash);
        match outcome {
            NavigationOutcome::Navigated { url, .. } => {
                self.pageview(&url, &TrackOptions::default(), at);
            }
            NavigationOutcome::Ignored(IgnoreReason::Excluded) => {
                self.warn_ignored(url, "URL matches an exclusion pattern");
            }
            NavigationOutcome::Ignored(reason) => {
                debug!(url, ?reason, "navigation ignored");
            }
        }
    }

    pub fn track(&self, name: &str, options: TrackOptions) -> PulseResult<()> {
        self.track_at(name, options, Utc::now())
    }

    pub fn track_at(&self, name: &str, options: TrackOptions, at: DateTime<Utc>) -> PulseResult<()> {
        if name == PAGEVIEW_EVENT {
            return self.manual_pageview(options, at);
        }
        if name == ENGAGEMENT_EVENT {
            // Synthesized internally only.
            return Err(PulseError::Config(
                "`engagement` is a reserved event name".to_string(),
            ));
        }
        let url = self
            .page_url(options.url.as_deref())
            .ok_or_else(|| PulseError::Config("`url` is required before any pageview".to_string()))?;
        if self.ignored_local(&url) {
            return Ok(());
        }
        let props = self.composer.resolve_props(name, options.props.as_ref());
        let payload = self.composer.compose(
            name,
            &url,
            props,
            options.revenue.clone(),
            options.interactive(),
            options.referrer.clone(),
        );
        self.deliver(payload, options.callback.clone());
        Ok(())
    }

    fn manual_pageview(&self, options: TrackOptions, at: DateTime<Utc>) -> PulseResult<()> {
        let url = self
            .page_url(options.url.as_deref())
            .ok_or_else(|| PulseError::Config("`url` is required for a manual pageview".to_string()))?;
        if self.gates.exclusions && self.detector.lock().is_excluded(&url) {
            self.warn_ignored(&url, "URL matches an exclusion pattern");
            return Ok(());
        }
        let canonical = self.detector.lock().accept(&url);
        self.pageview(&canonical, &options, at);
        Ok(())
    }

    /// Shared pageview path for automatic and manual captures. Flushes the
    /// previous engagement epoch first so the engagement event for the old
    /// page always precedes the new pageview in request order.
    fn pageview(&self, url: &str, options: &TrackOptions, at: DateTime<Utc>) {
        if self.ignored_local(url) {
            return;
        }
        let props = self.composer.resolve_props(PAGEVIEW_EVENT, options.props.as_ref());
        let flushed = self.engagement.lock().begin_epoch(url, props.clone(), at);
        if let Some(sample) = flushed {
            self.emit_engagement_sample(&sample);
        }
        let payload = self.composer.compose(
            PAGEVIEW_EVENT,
            url,
            props,
            options.revenue.clone(),
            options.interactive(),
            options.referrer.clone(),
        );
        self.deliver(payload, options.callback.clone());
    }

    /// Outbound-link click: the caller awaits this before letting the
    /// navigation proceed; it resolves when delivery settles or the
    /// navigation delay cap elapses.
    pub async fn report_outbound_click(&self, href: &str, callback: Option<DeliveryCallback>) {
        if !self.gates.outbound_links {
            debug!(href, "outbound link tracking disabled");
            return;
        }
        self.report_navigation_event(OUTBOUND_LINK_EVENT, href, callback)
            .await;
    }

    /// File-download click, same bounded-delay contract as outbound links.
    pub async fn report_file_download(&self, file_url: &str, callback: Option<DeliveryCallback>) {
        if !self.gates.file_downloads {
            debug!(file_url, "file download tracking disabled");
            return;
        }
        self.report_navigation_event(FILE_DOWNLOAD_EVENT, file_url, callback)
            .await;
    }

    async fn report_navigation_event(
        &self,
        name: &str,
        target: &str,
        callback: Option<DeliveryCallback>,
    ) {
        let Some(url) = self.page_url(None) else {
            debug!(name, "no page context yet; skipping");
            return;
        };
        if self.ignored_local(&url) {
            return;
        }
        let props = self
            .composer
            .resolve_props(name, Some(&serde_json::json!({ "url": target })));
        let payload = self.composer.compose(name, &url, props, None, true, None);
        match self.composer.apply_transform(&payload) {
            Ok(Some(body)) => self.delivery.dispatch_bounded(body, callback).await,
            Ok(None) => {}
            Err(e) => warn!(error = %e, "failed to serialize payload"),
        }
    }

    /// Form submission (fire-and-forget; the browser is not delayed).
    pub fn report_form_submission(&self) {
        if !self.gates.form_submissions {
            debug!("form submission tracking disabled");
            return;
        }
        let _ = self.track(FORM_SUBMISSION_EVENT, TrackOptions::default());
    }

    /// Tagged event declared via page markup. Behaves as a custom event
    /// behind its own gate.
    pub fn report_tagged_event(&self, name: &str, options: TrackOptions) {
        if !self.gates.tagged_events {
            debug!(name, "tagged event tracking disabled");
            return;
        }
        if let Err(e) = self.track(name, options) {
            warn!(name, error = %e, "tagged event dropped");
        }
    }

    fn emit_engagement_sample(&self, sample: &crate::engagement::EngagementSample) {
        let payload = self.composer.compose_engagement(sample);
        self.deliver(payload, None);
    }

    fn deliver(&self, payload: pulse_core::EventPayload, callback: Option<DeliveryCallback>) {
        match self.composer.apply_transform(&payload) {
            Ok(Some(body)) => self.delivery.dispatch(body, callback),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "failed to serialize payload"),
        }
    }

    fn page_url(&self, requested: Option<&str>) -> Option<String> {
        if let Some(url) = requested {
            return Some(url.to_string());
        }
        if let Some(url) = self.detector.lock().last_accepted() {
            return Some(url.to_string());
        }
        self.config.page_url.clone()
    }

    fn ignored_local(&self, url: &str) -> bool {
        if self.config.capture_on_localhost || !is_local_url(url) {
            return false;
        }
        self.warn_ignored(url, "localhost capture is disabled");
        true
    }

    fn warn_ignored(&self, url: &str, why: &str) {
        if self.config.logging {
            warn!(url, "ignoring event: {why}");
        }
    }

    /// Wait for every dispatched request to settle. Test hook.
    pub async fn flush_deliveries(&self) {
        self.delivery.flush().await;
    }
}
