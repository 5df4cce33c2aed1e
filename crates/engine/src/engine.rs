//! Filter engine interface
//!
//! The actual command interpreter lives outside this workspace; the
//! coordinator only depends on this trait. An engine receives the formatted
//! request, takes ownership of the working image set, and either returns a
//! mutated set plus status text, or fails with a user-facing message.

use crate::image::ImageList;
use crate::job::ProgressShare;
use crate::stop::StopToken;

/// Everything an engine invocation needs besides the image set.
///
/// The environment string encodes input/output/preview modes the way the
/// engine expects (`_input_layers=… _output_mode=…`). The seed makes
/// randomized filters reproducible: the coordinator replays a preview's
/// seed when the matching full apply is dispatched.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineRequest {
    /// Filter command to run
    pub command: String,

    /// Argument string for the command
    pub arguments: String,

    /// Environment string made of `_key=value` pairs
    pub environment: String,

    /// Verbosity of the engine's output messages
    pub output_message_mode: i32,

    /// Random seed this invocation must execute with
    pub seed: u64,
}

/// Result of a successful engine invocation.
///
/// Buffers and names come back by ownership; the caller validates and
/// routes them. Status lines carry the engine's status text; parameter
/// visibility flags are per-parameter UI hints.
#[derive(Debug, Clone, Default)]
pub struct EngineOutput {
    /// Output image buffers (mutated in place by the engine)
    pub images: ImageList,

    /// Output image names, parallel to `images`
    pub names: Vec<String>,

    /// Status text emitted by the command
    pub status_lines: Vec<String>,

    /// Per-parameter visibility flags
    pub parameter_visibility: Vec<i32>,
}

/// Error type for engine invocations
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// The command failed; the message is surfaced to the user verbatim
    #[error("{0}")]
    Execution(String),

    /// The execution honored a stop request before completing
    #[error("filter execution was stopped")]
    Stopped,
}

/// Result type for engine invocations
pub type EngineResult<T> = Result<T, EngineError>;

/// External filter execution engine.
///
/// Implementations must be reentrant across distinct invocations: the
/// coordinator may still be draining a stopped job on one thread while a
/// new job starts on another. Long-running engines should poll `stop`
/// and publish a completion estimate through `progress`.
pub trait FilterEngine: Send + Sync {
    /// Run a command over an owned image set
    fn run(
        &self,
        request: &EngineRequest,
        images: ImageList,
        names: Vec<String>,
        stop: &StopToken,
        progress: &ProgressShare,
    ) -> EngineResult<EngineOutput>;
}
