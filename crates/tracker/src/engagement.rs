//! Engagement tracker — a per-page state machine accumulating active time
//! and maximum scroll depth. Time runs only while the page is both visible
//! and focused; each flush reads-then-resets the accumulated time within a
//! single call so an epoch is never reported twice.

use chrono::{DateTime, Utc};
use pulse_core::PropMap;
use tracing::debug;
use uuid::Uuid;

/// Flushes below this accumulated duration emit nothing; the time is
/// retained for the next flush trigger.
pub const MIN_ENGAGEMENT_MS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngagementState {
    /// No epoch yet — before the first pageview in manual mode.
    Inactive,
    /// Visible and focused, clock running.
    Active,
    /// Hidden or blurred, clock stopped.
    Suspended,
}

/// One logical page visit, bounded by two navigations or tab lifecycle
/// events.
#[derive(Debug, Clone)]
pub struct EngagementEpoch {
    pub id: Uuid,
    pub page_url: String,
    /// The props resolved for the pageview, reused verbatim for every
    /// engagement event of this epoch.
    pub pinned_props: Option<PropMap>,
    accumulated_ms: u64,
    max_scroll_depth: u8,
    last_resume: Option<DateTime<Utc>>,
}

/// The result of flushing an epoch — everything needed to compose an
/// engagement event.
#[derive(Debug, Clone, PartialEq)]
pub struct EngagementSample {
    pub url: String,
    pub duration_ms: u64,
    pub scroll_depth: u8,
    pub props: Option<PropMap>,
}

pub struct EngagementTracker {
    state: EngagementState,
    epoch: Option<EngagementEpoch>,
    visible: bool,
    focused: bool,
}

impl Default for EngagementTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl EngagementTracker {
    pub fn new() -> Self {
        Self {
            state: EngagementState::Inactive,
            epoch: None,
            // A freshly loaded page is assumed attended until a signal says
            // otherwise.
            visible: true,
            focused: true,
        }
    }

    pub fn state(&self) -> EngagementState {
        self.state
    }

    pub fn current_url(&self) -> Option<&str> {
        self.epoch.as_ref().map(|e| e.page_url.as_str())
    }

    fn attending(&self) -> bool {
        self.visible && self.focused
    }

    /// Start a new epoch for a pageview, flushing the previous one first.
    /// Returns the flushed sample (if the old epoch had reportable time).
    pub fn begin_epoch(
        &mut self,
        url: impl Into<String>,
        props: Option<PropMap>,
        at: DateTime<Utc>,
    ) -> Option<EngagementSample> {
        let flushed = self.flush(at);
        let attending = self.attending();
        let epoch = EngagementEpoch {
            id: Uuid::new_v4(),
            page_url: url.into(),
            pinned_props: props,
            accumulated_ms: 0,
            max_scroll_depth: 0,
            last_resume: attending.then_some(at),
        };
        debug!(epoch_id = %epoch.id, url = %epoch.page_url, "engagement epoch started");
        self.epoch = Some(epoch);
        self.state = if attending {
            EngagementState::Active
        } else {
            EngagementState::Suspended
        };
        flushed
    }

    /// `visibilitychange` — a flush happens on loss, a silent resume on
    /// regain.
    pub fn set_visibility(&mut self, visible: bool, at: DateTime<Utc>) -> Option<EngagementSample> {
        self.attendance_changed(at, |s| s.visible = visible)
    }

    /// Window `focus`/`blur`.
    pub fn set_focus(&mut self, focused: bool, at: DateTime<Utc>) -> Option<EngagementSample> {
        self.attendance_changed(at, |s| s.focused = focused)
    }

    fn attendance_changed(
        &mut self,
        at: DateTime<Utc>,
        apply: impl FnOnce(&mut Self),
    ) -> Option<EngagementSample> {
        let was_attending = self.attending();
        apply(self);
        let now_attending = self.attending();
        if self.epoch.is_none() || was_attending == now_attending {
            // Rapid hide+blur toggles reach here: the second signal finds
            // the clock already stopped and must not flush again.
            return None;
        }
        if now_attending {
            if let Some(epoch) = self.epoch.as_mut() {
                epoch.last_resume = Some(at);
            }
            self.state = EngagementState::Active;
            None
        } else {
            let flushed = self.flush(at);
            self.state = EngagementState::Suspended;
            flushed
        }
    }

    /// Scroll observation. Depth is the monotone maximum over the epoch.
    pub fn record_scroll(&mut self, scroll_top: f64, viewport_height: f64, document_height: f64) {
        if let Some(epoch) = self.epoch.as_mut() {
            let depth = scroll_depth_percent(scroll_top, viewport_height, document_height);
            epoch.max_scroll_depth = epoch.max_scroll_depth.max(depth);
        }
    }

    /// Page unload — flush whatever has accumulated.
    pub fn finalize(&mut self, at: DateTime<Utc>) -> Option<EngagementSample> {
        self.flush(at)
    }

    /// Read-then-reset the accumulated time. Below the minimum threshold
    /// nothing is emitted and the time is retained, so short suspend/resume
    /// cycles still sum into the next reportable flush.
    fn flush(&mut self, at: DateTime<Utc>) -> Option<EngagementSample> {
        let running = self.state == EngagementState::Active;
        let epoch = self.epoch.as_mut()?;
        if running {
            if let Some(resumed) = epoch.last_resume {
                let elapsed = (at - resumed).num_milliseconds().max(0) as u64;
                epoch.accumulated_ms += elapsed;
                epoch.last_resume = Some(at);
            }
        }
        if epoch.accumulated_ms < MIN_ENGAGEMENT_MS {
            return None;
        }
        let sample = EngagementSample {
            url: epoch.page_url.clone(),
            duration_ms: epoch.accumulated_ms,
            scroll_depth: epoch.max_scroll_depth,
            props: epoch.pinned_props.clone(),
        };
        epoch.accumulated_ms = 0;
        debug!(
            epoch_id = %epoch.id,
            duration_ms = sample.duration_ms,
            scroll_depth = sample.scroll_depth,
            "engagement flushed"
        );
        Some(sample)
    }
}

/// `round(100 * (scrollTop + viewportHeight) / documentHeight)`, clamped to
/// 0–100. The document can grow after load; callers pass re-measured
/// heights and the tracker keeps the max.
pub fn scroll_depth_percent(scroll_top: f64, viewport_height: f64, document_height: f64) -> u8 {
    if document_height <= 0.0 {
        return 0;
    }
    let pct = (100.0 * (scroll_top + viewport_height) / document_height).round();
    pct.clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_starts_inactive_until_first_pageview() {
        let mut tracker = EngagementTracker::new();
        assert_eq!(tracker.state(), EngagementState::Inactive);
        assert!(tracker.set_visibility(false, t0()).is_none());

        tracker.begin_epoch("https://example.com/", None, t0());
        assert_eq!(tracker.state(), EngagementState::Active);
    }

    #[test]
    fn test_hide_after_dwell_reports_duration() {
        let start = t0();
        let mut tracker = EngagementTracker::new();
        tracker.begin_epoch("https://example.com/", None, start);

        let sample = tracker
            .set_visibility(false, start + Duration::milliseconds(2500))
            .expect("reportable flush");
        assert_eq!(sample.duration_ms, 2500);
        assert_eq!(sample.url, "https://example.com/");
        assert_eq!(tracker.state(), EngagementState::Suspended);
    }

    #[test]
    fn test_sub_threshold_dwell_emits_nothing() {
        let start = t0();
        let mut tracker = EngagementTracker::new();
        tracker.begin_epoch("https://example.com/", None, start);

        let sample = tracker.set_visibility(false, start + Duration::milliseconds(120));
        assert!(sample.is_none());
    }

    #[test]
    fn test_suspend_resume_cycles_sum() {
        let start = t0();
        let mut tracker = EngagementTracker::new();
        tracker.begin_epoch("https://example.com/", None, start);

        // 200ms active, hidden (below threshold: retained, not emitted)
        assert!(tracker
            .set_visibility(false, start + Duration::milliseconds(200))
            .is_none());
        // hidden for 10s, then back
        tracker.set_visibility(true, start + Duration::milliseconds(10_200));
        // another 250ms active, then unload
        let sample = tracker
            .finalize(start + Duration::milliseconds(10_450))
            .expect("summed intervals exceed threshold");
        assert_eq!(sample.duration_ms, 450);
    }

    #[test]
    fn test_hidden_time_does_not_count() {
        let start = t0();
        let mut tracker = EngagementTracker::new();
        tracker.begin_epoch("https://example.com/", None, start);

        tracker.set_visibility(false, start + Duration::milliseconds(1000));
        tracker.set_visibility(true, start + Duration::milliseconds(61_000));
        let sample = tracker
            .finalize(start + Duration::milliseconds(62_000))
            .expect("flush");
        // 1000ms before hiding, 1000ms after resuming
        assert_eq!(sample.duration_ms, 2000);
    }

    #[test]
    fn test_rapid_hide_blur_flushes_once() {
        let start = t0();
        let mut tracker = EngagementTracker::new();
        tracker.begin_epoch("https://example.com/", None, start);

        let first = tracker.set_visibility(false, start + Duration::milliseconds(800));
        assert!(first.is_some());
        // blur lands right after visibilitychange: already suspended
        let second = tracker.set_focus(false, start + Duration::milliseconds(801));
        assert!(second.is_none());
        // navigating away while hidden has nothing further to report
        let third = tracker.begin_epoch("https://example.com/next", None, start + Duration::milliseconds(900));
        assert!(third.is_none());
    }

    #[test]
    fn test_focus_alone_is_not_enough() {
        let start = t0();
        let mut tracker = EngagementTracker::new();
        tracker.begin_epoch("https://example.com/", None, start);

        tracker.set_visibility(false, start + Duration::milliseconds(500));
        // focus regained while still hidden: clock stays stopped
        assert!(tracker
            .set_focus(true, start + Duration::milliseconds(600))
            .is_none());
        assert_eq!(tracker.state(), EngagementState::Suspended);
        assert!(tracker.finalize(start + Duration::milliseconds(5000)).is_none());
    }

    #[test]
    fn test_navigation_flushes_previous_epoch() {
        let start = t0();
        let mut tracker = EngagementTracker::new();
        tracker.begin_epoch("https://example.com/a", None, start);
        tracker.record_scroll(600.0, 400.0, 2000.0);

        let sample = tracker
            .begin_epoch("https://example.com/b", None, start + Duration::milliseconds(3000))
            .expect("previous epoch flushed");
        assert_eq!(sample.url, "https://example.com/a");
        assert_eq!(sample.duration_ms, 3000);
        assert_eq!(sample.scroll_depth, 50);
        assert_eq!(tracker.current_url(), Some("https://example.com/b"));
    }

    #[test]
    fn test_scroll_depth_is_monotone_max() {
        let mut tracker = EngagementTracker::new();
        let start = t0();
        tracker.begin_epoch("https://example.com/", None, start);

        tracker.record_scroll(0.0, 500.0, 1000.0); // 50%
        tracker.record_scroll(500.0, 500.0, 1000.0); // 100%
        tracker.record_scroll(100.0, 500.0, 1000.0); // back up: 60%, ignored

        let sample = tracker
            .finalize(start + Duration::milliseconds(1000))
            .expect("flush");
        assert_eq!(sample.scroll_depth, 100);
    }

    #[test]
    fn test_scroll_depth_handles_growing_document() {
        // Async content grows the document after the first measurement.
        assert_eq!(scroll_depth_percent(0.0, 800.0, 800.0), 100);
        assert_eq!(scroll_depth_percent(0.0, 800.0, 2400.0), 33);
        assert_eq!(scroll_depth_percent(0.0, 800.0, 0.0), 0);
        assert_eq!(scroll_depth_percent(9000.0, 800.0, 2400.0), 100);
    }

    #[test]
    fn test_pinned_props_travel_with_the_sample() {
        let start = t0();
        let mut tracker = EngagementTracker::new();
        let props: PropMap = [("author".to_string(), "jane".into())].into();
        tracker.begin_epoch("https://example.com/", Some(props.clone()), start);

        let sample = tracker
            .finalize(start + Duration::milliseconds(400))
            .expect("flush");
        assert_eq!(sample.props, Some(props));
    }
}
