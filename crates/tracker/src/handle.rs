//! The process-wide tracker handle — the engine's abstraction of the
//! `window.<name>` binding. Owns the uninitialized → initialized lifecycle,
//! the pre-init call queue, and the loaded/version probe surface the
//! installation verifier reads.

use std::mem;
use std::sync::{Arc, OnceLock};

use chrono::Utc;
use parking_lot::Mutex;
use pulse_core::{PageSignal, PulseError, PulseResult, SCRIPT_VERSION};
use tracing::{info, warn};

use crate::config::TrackerConfig;
use crate::delivery::{HttpTransport, Transport};
use crate::queue::PendingCallQueue;
use crate::tracker::{TrackOptions, Tracker};

/// Which embedding produced the calls. The script-tag snippet queues
/// pre-init calls and tolerates a second init; the module surface is
/// strict on both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Embedding {
    Snippet,
    Module,
}

enum HandleState {
    Pending(PendingCallQueue),
    Ready(Arc<Tracker>),
}

pub struct PulseHandle {
    embedding: Embedding,
    state: Mutex<HandleState>,
}

impl PulseHandle {
    pub fn new(embedding: Embedding) -> Arc<Self> {
        Arc::new(Self {
            embedding,
            state: Mutex::new(HandleState::Pending(PendingCallQueue::new())),
        })
    }

    /// Initialize with the default HTTP transport.
    pub fn init(self: &Arc<Self>, config: TrackerConfig) -> PulseResult<()> {
        let transport = Arc::new(HttpTransport::new()?);
        self.init_with_transport(config, transport)
    }

    /// Initialize with an injected transport. On success the first config
    /// is authoritative forever: a second call warns (snippet) or errors
    /// (module) and changes nothing.
    pub fn init_with_transport(
        self: &Arc<Self>,
        config: TrackerConfig,
        transport: Arc<dyn Transport>,
    ) -> PulseResult<()> {
        let mut state = self.state.lock();
        if matches!(*state, HandleState::Ready(_)) {
            return match self.embedding {
                Embedding::Snippet => {
                    warn!("init() already called; keeping the first configuration");
                    Ok(())
                }
                Embedding::Module => Err(PulseError::AlreadyInitialized),
            };
        }

        // Validation failures leave the queue intact for a later retry.
        let tracker = Arc::new(Tracker::with_transport(config, transport)?);
        let queue = match mem::replace(&mut *state, HandleState::Ready(tracker.clone())) {
            HandleState::Pending(queue) => queue,
            HandleState::Ready(_) => PendingCallQueue::new(),
        };
        drop(state);

        if tracker.config().bind_global && !bind(self.clone()) {
            warn!("global binding already taken; continuing unbound");
        }
        info!(
            domain = %tracker.config().domain,
            queued = queue.len(),
            version = SCRIPT_VERSION,
            "tracker initialized"
        );

        // Side effects first (initial pageview), then the replay, so queued
        // goal events follow the auto-captured pageview in request order.
        tracker.start(Utc::now());
        for call in queue.drain() {
            if let Err(e) = tracker.track(&call.name, call.options) {
                warn!(event = %call.name, error = %e, "queued call dropped during replay");
            }
        }
        Ok(())
    }

    /// Record an event. Before init this queues (snippet) or fails with
    /// `NotInitialized` (module).
    pub fn track(&self, name: &str, options: TrackOptions) -> PulseResult<()> {
        let mut state = self.state.lock();
        match &mut *state {
            HandleState::Ready(tracker) => {
                let tracker = tracker.clone();
                drop(state);
                tracker.track(name, options)
            }
            HandleState::Pending(queue) => match self.embedding {
                Embedding::Snippet => {
                    queue.push(name, options);
                    Ok(())
                }
                Embedding::Module => Err(PulseError::NotInitialized),
            },
        }
    }

    /// Forward a page signal to the tracker. Signals before init are
    /// dropped — there is no page state to account them against.
    pub fn signal(&self, signal: PageSignal) {
        if let Some(tracker) = self.tracker() {
            tracker.signal(signal, Utc::now());
        }
    }

    pub fn tracker(&self) -> Option<Arc<Tracker>> {
        match &*self.state.lock() {
            HandleState::Ready(tracker) => Some(tracker.clone()),
            HandleState::Pending(_) => None,
        }
    }

    /// The `.l` probe: true once init has completed.
    pub fn loaded(&self) -> bool {
        matches!(*self.state.lock(), HandleState::Ready(_))
    }

    /// The `.v` probe.
    pub fn version(&self) -> &'static str {
        SCRIPT_VERSION
    }
}

// The only place the engine touches process-global state.
static GLOBAL: OnceLock<Arc<PulseHandle>> = OnceLock::new();

/// Install a handle as the process-wide binding. Returns false when a
/// binding already exists (the first one wins).
pub fn bind(handle: Arc<PulseHandle>) -> bool {
    GLOBAL.set(handle).is_ok()
}

/// The process-wide handle, if one has been bound.
pub fn bound() -> Option<Arc<PulseHandle>> {
    GLOBAL.get().cloned()
}
