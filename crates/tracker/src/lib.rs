//! PagePulse tracking engine — composes structured analytics events
//! (pageview, engagement, custom goals) for a visited page and delivers
//! them to a collection endpoint, tolerating SPA navigation, tab
//! visibility changes, and the page being torn down mid-request.
//!
//! # Modules
//!
//! - [`config`] — Invocation configuration, validation, props/transform hooks
//! - [`gates`] — Compile-time feature gates narrowed by runtime config
//! - [`navigation`] — History/hash navigation detection with exclusion rules
//! - [`engagement`] — Active-time and scroll-depth state machine
//! - [`composer`] — Wire payload composition and the request transform
//! - [`queue`] — Pre-init call queue
//! - [`delivery`] — FIFO keep-alive delivery with a bounded navigation delay
//! - [`tracker`] — The assembled engine
//! - [`handle`] — Init-once process-wide handle and probe surface

pub mod composer;
pub mod config;
pub mod delivery;
pub mod engagement;
pub mod gates;
pub mod handle;
pub mod navigation;
pub mod queue;
pub mod tracker;

pub use config::{PropsSource, TrackerConfig, TransformHook};
pub use delivery::{DeliveryCallback, DeliveryResult, Transport, NAVIGATION_DELAY_CAP};
pub use engagement::{EngagementState, EngagementTracker, MIN_ENGAGEMENT_MS};
pub use gates::FeatureGates;
pub use handle::{bound, Embedding, PulseHandle};
pub use navigation::{IgnoreReason, NavigationDetector, NavigationOutcome, RoutingMode};
pub use tracker::{TrackOptions, Tracker};
