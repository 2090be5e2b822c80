//! Typed page-signal stream. Browser listeners (`popstate`, `hashchange`,
//! `visibilitychange`, `focus`/`blur`, `scroll`, `pagehide`) are a thin
//! adapter that translates DOM events into these signals, which keeps the
//! navigation and engagement state machines testable without a DOM.

/// One observation from the host page, delivered to the tracker together
/// with the timestamp at which it occurred.
#[derive(Debug, Clone, PartialEq)]
pub enum PageSignal {
    /// The address bar changed — a history API call, a `popstate`, or a
    /// `hashchange`. `via_hash` is true when only the fragment moved.
    UrlChanged { url: String, via_hash: bool },
    /// `visibilitychange`: the tab became visible or hidden.
    VisibilityChanged { visible: bool },
    /// The window gained or lost focus.
    FocusChanged { focused: bool },
    /// A scroll observation with the measurements needed to derive depth.
    /// `document_height` is re-measured by the adapter since async content
    /// can grow the page after load.
    Scrolled {
        scroll_top: f64,
        viewport_height: f64,
        document_height: f64,
    },
    /// The document is being torn down (`pagehide`/`beforeunload`).
    Unloading,
}
