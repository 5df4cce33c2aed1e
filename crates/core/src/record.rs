//! Last-applied record
//!
//! Snapshot of the most recently committed full apply, fed to the host's
//! settings store so a "repeat last filter" action can replay it exactly,
//! including the random seed the user previewed with.

/// Snapshot of the last successfully completed full apply.
///
/// Identity fields are written pre-emptively at full-apply dispatch so the
/// persisted intent survives a teardown racing the completion; the status
/// lines are committed only on success. Failure or an invalid result clears
/// the identity fields again.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LastAppliedRecord {
    /// Stable identity hash of the filter
    pub filter_hash: String,

    /// Human-readable filter path
    pub filter_path: String,

    /// Command that was run
    pub command: String,

    /// Argument string of the command
    pub arguments: String,

    /// Input routing mode used
    pub input_mode: i32,

    /// Output routing mode used
    pub output_mode: i32,

    /// Preview composition mode used
    pub preview_mode: i32,

    /// Status lines the engine produced
    pub status_lines: Vec<String>,

    /// Quoted-parameter string associated with the status
    pub quoted_parameters: String,

    /// Random seed the apply executed with (same seed as its preview)
    pub seed: u64,
}

impl LastAppliedRecord {
    /// Whether no apply has been recorded
    pub fn is_empty(&self) -> bool {
        self.command.is_empty()
    }

    /// Clear the identity fields after a failed or rejected apply
    pub fn clear_identity(&mut self) {
        self.filter_hash.clear();
        self.filter_path.clear();
        self.command.clear();
        self.arguments.clear();
    }
}
