//! Request descriptor model
//!
//! A [`FilterRequest`] fully describes one execution: what to run, over
//! which region, on which path, and how the preview should be shaped. It is
//! set once before each `execute` call and read-only afterwards.

/// Execution path requested for a filter run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Scaled preview executed on a worker thread
    InteractivePreview,

    /// Scaled preview executed inline, blocking the caller
    SynchronousPreview,

    /// Full-resolution run whose output is committed to the host
    FullApply,
}

impl RequestKind {
    /// Whether this kind produces a display-only scaled preview
    pub fn is_preview(self) -> bool {
        matches!(
            self,
            RequestKind::InteractivePreview | RequestKind::SynchronousPreview
        )
    }
}

/// Input/output routing modes for an execution
///
/// The mode spaces are host-defined; the coordinator only forwards them to
/// the engine environment and the persisted record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct InputOutputState {
    /// Which layers feed the engine
    pub input_mode: i32,

    /// How results are routed back into the host image
    pub output_mode: i32,

    /// Preview composition mode
    pub preview_mode: i32,
}

/// Region of interest, in normalized full-image coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleRect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl VisibleRect {
    /// The whole image
    pub fn full() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            w: 1.0,
            h: 1.0,
        }
    }
}

impl Default for VisibleRect {
    fn default() -> Self {
        Self::full()
    }
}

/// Correction factors applied to `pos(x,y)` markers in image names so
/// on-canvas position indicators stay accurate in a downscaled preview
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionCorrection {
    pub x_factor: f64,
    pub y_factor: f64,
}

impl Default for PositionCorrection {
    fn default() -> Self {
        Self {
            x_factor: 1.0,
            y_factor: 1.0,
        }
    }
}

/// Immutable descriptor for one filter execution
#[derive(Debug, Clone)]
pub struct FilterRequest {
    /// Execution path
    pub kind: RequestKind,

    /// Filter command to run
    pub command: String,

    /// Argument string for the command
    pub arguments: String,

    /// Stable identity hash of the filter (for the last-applied record)
    pub filter_hash: String,

    /// Human-readable filter path (for the last-applied record)
    pub filter_path: String,

    /// Input/output routing modes
    pub io_state: InputOutputState,

    /// Region of interest
    pub visible_rect: VisibleRect,

    /// Preview zoom factor (working-set scale for preview kinds)
    pub zoom: f64,

    /// Preview target width in pixels
    pub preview_width: u32,

    /// Preview target height in pixels
    pub preview_height: u32,

    /// Preview timeout in seconds, forwarded as engine configuration only
    pub preview_timeout: u32,

    /// Verbosity of the engine's output messages
    pub output_message_mode: i32,

    /// Position-marker correction factors for downscaled previews
    pub position_correction: PositionCorrection,
}

impl FilterRequest {
    /// Create a request with default region, zoom, and preview shape
    pub fn new(kind: RequestKind, command: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            kind,
            command: command.into(),
            arguments: arguments.into(),
            filter_hash: String::new(),
            filter_path: String::new(),
            io_state: InputOutputState::default(),
            visible_rect: VisibleRect::full(),
            zoom: 1.0,
            preview_width: 0,
            preview_height: 0,
            preview_timeout: 0,
            output_message_mode: 0,
            position_correction: PositionCorrection::default(),
        }
    }

    /// Set the filter identity recorded on a successful full apply
    pub fn with_identity(mut self, hash: impl Into<String>, path: impl Into<String>) -> Self {
        self.filter_hash = hash.into();
        self.filter_path = path.into();
        self
    }

    /// Set the input/output routing modes
    pub fn with_io_state(mut self, io_state: InputOutputState) -> Self {
        self.io_state = io_state;
        self
    }

    /// Set the region of interest
    pub fn with_visible_rect(mut self, rect: VisibleRect) -> Self {
        self.visible_rect = rect;
        self
    }

    /// Set the preview zoom factor
    pub fn with_zoom(mut self, zoom: f64) -> Self {
        self.zoom = zoom;
        self
    }

    /// Set the preview target size
    pub fn with_preview_size(mut self, width: u32, height: u32) -> Self {
        self.preview_width = width;
        self.preview_height = height;
        self
    }

    /// Set the preview timeout (seconds)
    pub fn with_preview_timeout(mut self, timeout: u32) -> Self {
        self.preview_timeout = timeout;
        self
    }

    /// Set the output message verbosity
    pub fn with_message_mode(mut self, mode: i32) -> Self {
        self.output_message_mode = mode;
        self
    }

    /// Set the position-marker correction factors
    pub fn with_position_correction(mut self, correction: PositionCorrection) -> Self {
        self.position_correction = correction;
        self
    }

    /// Build the engine environment string for this request.
    ///
    /// Preview kinds additionally carry the preview shape and timeout; the
    /// timeout is engine configuration, never enforced by the coordinator.
    pub fn environment(&self) -> String {
        let mut env = format!("_input_layers={}", self.io_state.input_mode);
        env.push_str(&format!(" _output_mode={}", self.io_state.output_mode));
        env.push_str(&format!(" _output_messages={}", self.output_message_mode));
        env.push_str(&format!(" _preview_mode={}", self.io_state.preview_mode));
        if self.kind.is_preview() {
            env.push_str(&format!(" _preview_width={}", self.preview_width));
            env.push_str(&format!(" _preview_height={}", self.preview_height));
            env.push_str(&format!(" _preview_timeout={}", self.preview_timeout));
        }
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_is_preview() {
        assert!(RequestKind::InteractivePreview.is_preview());
        assert!(RequestKind::SynchronousPreview.is_preview());
        assert!(!RequestKind::FullApply.is_preview());
    }

    #[test]
    fn test_request_builder() {
        let request = FilterRequest::new(RequestKind::InteractivePreview, "fx_sketch", "3,1")
            .with_identity("abc123", "Artistic/Sketch")
            .with_io_state(InputOutputState {
                input_mode: 1,
                output_mode: 2,
                preview_mode: 0,
            })
            .with_zoom(0.5)
            .with_preview_size(640, 480)
            .with_preview_timeout(16)
            .with_message_mode(2);

        assert_eq!(request.command, "fx_sketch");
        assert_eq!(request.filter_hash, "abc123");
        assert_eq!(request.io_state.output_mode, 2);
        assert_eq!(request.zoom, 0.5);
        assert_eq!(request.preview_width, 640);
    }

    #[test]
    fn test_environment_for_preview() {
        let request = FilterRequest::new(RequestKind::InteractivePreview, "fx", "")
            .with_io_state(InputOutputState {
                input_mode: 1,
                output_mode: 0,
                preview_mode: 2,
            })
            .with_preview_size(800, 600)
            .with_preview_timeout(16)
            .with_message_mode(1);

        assert_eq!(
            request.environment(),
            "_input_layers=1 _output_mode=0 _output_messages=1 _preview_mode=2 \
             _preview_width=800 _preview_height=600 _preview_timeout=16"
        );
    }

    #[test]
    fn test_environment_for_full_apply_omits_preview_shape() {
        let request = FilterRequest::new(RequestKind::FullApply, "fx", "")
            .with_preview_size(800, 600);

        let env = request.environment();
        assert!(!env.contains("_preview_width"));
        assert!(!env.contains("_preview_timeout"));
        assert!(env.contains("_preview_mode=0"));
    }

    #[test]
    fn test_default_rect_covers_full_image() {
        let rect = VisibleRect::default();
        assert_eq!(rect.x, 0.0);
        assert_eq!(rect.w, 1.0);
    }
}
