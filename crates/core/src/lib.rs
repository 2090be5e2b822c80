//! Shared vocabulary for the PagePulse tracking engine — wire payload
//! types, the error taxonomy, and the typed page-signal stream the DOM
//! adapter feeds into the engine.

pub mod error;
pub mod signal;
pub mod types;

pub use error::{PulseError, PulseResult};
pub use signal::PageSignal;
pub use types::{EventPayload, PropMap, PropValue, Revenue};

/// Script version reported in every payload's `v` field.
pub const SCRIPT_VERSION: &str = env!("CARGO_PKG_VERSION");
