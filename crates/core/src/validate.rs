//! Result validation
//!
//! Output batches are accepted or rejected as a whole: the first image with
//! more than four channels fails the batch, identified by its index.

use filter_runner_engine::ImageBuffer;

/// Maximum channel count an output image may have
pub const MAX_CHANNELS: u32 = 4;

/// Rejection of an output batch because one image has too many channels
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Image #{index} returned by filter has {channels} channels (should be at most 4)")]
pub struct InvalidChannels {
    /// Index of the first offending image
    pub index: usize,

    /// Its channel count
    pub channels: u32,
}

/// Check that every image in the batch has at most four channels.
///
/// Scans in order and short-circuits on the first violation; later
/// violations are not aggregated.
pub fn check_channels(images: &[ImageBuffer]) -> Result<(), InvalidChannels> {
    for (index, image) in images.iter().enumerate() {
        if image.channels > MAX_CHANNELS {
            return Err(InvalidChannels {
                index,
                channels: image.channels,
            });
        }
    }
    Ok(())
}
