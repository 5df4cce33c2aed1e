//! Coordinator notifications
//!
//! Outcome notifications are delivered over a plain `mpsc` channel handed
//! out at construction; the receiving end belongs to the UI context. At
//! most one terminal notification fires per completed non-aborted job, and
//! none for an aborted one.

/// Notification emitted by the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterEvent {
    /// A preview result was composited and is ready to display
    PreviewReady,

    /// A preview execution failed; the message is user-facing
    PreviewFailed(String),

    /// A full apply was delivered to the host
    ApplyDone,

    /// A full apply failed; the message is user-facing
    ApplyFailed(String),

    /// The last retiring job finished; no background work remains
    AllRetiringJobsDrained,

    /// A job outlived the busy debounce; the UI should show a busy cursor
    BusyIndicatorRequested,
}
