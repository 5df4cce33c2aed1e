//! Filter Runner Engine Library
//!
//! Execution layer for the filter runner: the image buffer model, the
//! filter-engine interface, cooperative stop tokens, and the background
//! job handle that runs an engine invocation on a worker thread and
//! reports completion over a one-shot channel.

pub mod engine;
pub mod image;
pub mod job;
pub mod stop;

pub use engine::{EngineError, EngineOutput, EngineRequest, EngineResult, FilterEngine};
pub use image::{ImageBuffer, ImageList};
pub use job::{run_foreground, FilterJob, JobId, JobOutcome, ProgressShare};
pub use stop::StopToken;
