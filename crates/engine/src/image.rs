//! Owned image buffer model
//!
//! Image data is held in flat `f32` planes and moves by ownership between
//! the coordinator and job handles. Nothing in the execution layer copies
//! pixel data.

/// A single owned image buffer.
///
/// Pixel data is stored as a flat vector of `width * height * channels`
/// samples. The channel count is unconstrained here; result validation
/// (at most 4 channels) happens after execution, not at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBuffer {
    /// Image width in pixels
    pub width: u32,

    /// Image height in pixels
    pub height: u32,

    /// Number of channels (e.g. 1 = gray, 3 = RGB, 4 = RGBA)
    pub channels: u32,

    /// Flat sample data, `width * height * channels` values
    pub data: Vec<f32>,
}

impl ImageBuffer {
    /// Create a zero-filled image buffer
    pub fn new(width: u32, height: u32, channels: u32) -> Self {
        let len = width as usize * height as usize * channels as usize;
        Self {
            width,
            height,
            channels,
            data: vec![0.0; len],
        }
    }

    /// Create an image buffer from existing sample data
    ///
    /// The data length must match `width * height * channels`.
    pub fn from_data(width: u32, height: u32, channels: u32, data: Vec<f32>) -> Self {
        debug_assert_eq!(
            data.len(),
            width as usize * height as usize * channels as usize
        );
        Self {
            width,
            height,
            channels,
            data,
        }
    }

    /// Fill every sample with a constant value
    pub fn fill(&mut self, value: f32) {
        for sample in &mut self.data {
            *sample = value;
        }
    }

    /// Number of pixels (width * height)
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Whether the buffer holds no samples
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// An ordered list of owned image buffers
///
/// Image names travel alongside as a parallel `Vec<String>`.
pub type ImageList = Vec<ImageBuffer>;
