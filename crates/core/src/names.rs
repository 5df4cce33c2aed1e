//! Position-marker correction in image names
//!
//! Some filters embed on-canvas coordinates in image names as `pos(x,y)`
//! markers. A downscaled preview would draw those indicators in the wrong
//! place, so before an interactive preview dispatch the coordinates are
//! rescaled with the request's correction factors against the
//! full-resolution extent.

use crate::request::PositionCorrection;
use regex::Regex;
use std::sync::OnceLock;

fn position_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"pos\((\d+)([^0-9]*)(\d+)\)").expect("valid position regex"))
}

/// Rescale `pos(x,y)` markers in place.
///
/// `max_width`/`max_height` is the full-resolution extent of the input
/// layers. A zero extent leaves the names untouched; names without a
/// marker pass through unchanged. Only the first marker per name is
/// rewritten, preserving whatever separator the filter used.
pub fn correct_position_markers(
    names: &mut [String],
    correction: &PositionCorrection,
    max_width: u32,
    max_height: u32,
) {
    if max_width == 0 || max_height == 0 {
        return;
    }
    for name in names.iter_mut() {
        let Some(caps) = position_marker().captures(name) else {
            continue;
        };
        let x: f64 = caps[1].parse().unwrap_or(0.0);
        let y: f64 = caps[3].parse().unwrap_or(0.0);
        let separator = caps[2].to_string();
        let new_x = (x * (correction.x_factor / max_width as f64)) as i64;
        let new_y = (y * (correction.y_factor / max_height as f64)) as i64;
        let marker = caps[0].to_string();
        let replacement = format!("pos({}{}{})", new_x, separator, new_y);
        *name = name.replacen(&marker, &replacement, 1);
    }
}
