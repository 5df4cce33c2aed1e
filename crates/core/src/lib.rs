//! Filter Runner Core Library
//!
//! Execution coordinator for an image-filter plugin: accepts preview and
//! full-apply requests, runs the external filter engine on the right
//! execution path, tracks the single active job, retires cancelled jobs
//! without blocking, and keeps preview and apply random seeds linked so a
//! committed result matches the preview the user saw.

pub mod coordinator;
pub mod event;
pub mod names;
pub mod persistence;
pub mod providers;
pub mod record;
pub mod request;
pub mod telemetry;
pub mod validate;

pub use coordinator::{
    CoordinatorError, CoordinatorHosts, CoordinatorResult, FilterCoordinator,
    WAITING_INDICATOR_DELAY,
};
pub use event::FilterEvent;
pub use persistence::{PersistenceError, PersistenceResult};
pub use providers::{
    BusyIndicator, ColorProfileApplier, ExtentProvider, NoBusyIndicator, NoColorProfile,
    OutputSink, PreviewCompositor, WorkingSetProvider,
};
pub use record::LastAppliedRecord;
pub use request::{
    FilterRequest, InputOutputState, PositionCorrection, RequestKind, VisibleRect,
};
pub use telemetry::PreviewDurations;
pub use validate::{check_channels, InvalidChannels};
