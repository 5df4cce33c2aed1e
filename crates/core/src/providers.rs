//! Host collaborator interfaces
//!
//! Everything the coordinator needs from the surrounding application is
//! behind these traits: fetching the cropped working set, the layer
//! extent, preview compositing, output delivery, color-profile correction,
//! and the busy cursor. None of them contain coordination logic.

use crate::request::VisibleRect;
use filter_runner_engine::{ImageBuffer, ImageList};

/// Supplies the cropped working image set for a region of interest.
///
/// Preview kinds fetch at the request's zoom factor; a full apply fetches
/// at scale 1.0. Implementations typically cache crops and must drop those
/// caches on `invalidate` (output may have changed layer geometry).
pub trait WorkingSetProvider {
    /// Fetch image buffers and their names for a region
    fn fetch(&mut self, rect: &VisibleRect, input_mode: i32, scale: f64)
        -> (ImageList, Vec<String>);

    /// Drop any cached crops
    fn invalidate(&mut self) {}
}

/// Supplies the full-resolution extent of the input layers
pub trait ExtentProvider {
    /// Extent (width, height) in pixels for an input mode
    fn extent(&mut self, input_mode: i32) -> (u32, u32);

    /// Drop any cached extent
    fn invalidate(&mut self) {}
}

/// Builds a displayable raster from a validated output image list
pub trait PreviewCompositor {
    fn compose(
        &self,
        images: &ImageList,
        preview_mode: i32,
        width: u32,
        height: u32,
    ) -> ImageBuffer;
}

/// Receives committed full-apply output
pub trait OutputSink {
    fn deliver(&mut self, images: ImageList, names: Vec<String>, output_mode: i32);
}

/// Applies the host's color profile to one output image
pub trait ColorProfileApplier {
    fn apply(&self, image: &mut ImageBuffer);
}

/// Color-profile hook that leaves images untouched
pub struct NoColorProfile;

impl ColorProfileApplier for NoColorProfile {
    fn apply(&self, _image: &mut ImageBuffer) {}
}

/// GUI busy-cursor collaborator.
///
/// Shown only when a background job outlives the debounce delay, hidden
/// unconditionally during outcome processing and on cancellation.
pub trait BusyIndicator {
    fn set_waiting(&mut self, waiting: bool);
}

/// Busy indicator that ignores all requests (headless hosts, tests)
pub struct NoBusyIndicator;

impl BusyIndicator for NoBusyIndicator {
    fn set_waiting(&mut self, _waiting: bool) {}
}
