//! Frame annotation: skeletons, part labels and track boxes.

mod overlay;
mod skeleton;

use std::fs;
use std::path::Path;

use ab_glyph::FontArc;

use crate::error::ConfigError;

pub use overlay::{draw_tracks_mut, track_color};
pub use skeleton::{BONE_THICKNESS, JOINT_RADIUS, SkeletonRenderer, part_color};

/// Loads a TTF/OTF font for identifiers and labels.
pub fn load_font<P: AsRef<Path>>(path: P) -> Result<FontArc, ConfigError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|err| ConfigError::Font {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    FontArc::try_from_vec(bytes).map_err(|err| ConfigError::Font {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}

/// Maps an index to a well-spread, fully saturated colour.
pub(crate) fn spread_color(index: u64) -> image::Rgb<u8> {
    // golden-angle hue steps keep neighbouring indices apart
    let hue = (index as f64 * 137.508) % 360.0;
    let sector = hue / 60.0;
    let x = 1.0 - (sector % 2.0 - 1.0).abs();
    let (r, g, b) = match sector as u32 {
        0 => (1.0, x, 0.0),
        1 => (x, 1.0, 0.0),
        2 => (0.0, 1.0, x),
        3 => (0.0, x, 1.0),
        4 => (x, 0.0, 1.0),
        _ => (1.0, 0.0, x),
    };
    let channel = |v: f64| (v * 255.0).round() as u8;
    image::Rgb([channel(r), channel(g), channel(b)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spread_color_is_deterministic_and_distinct() {
        assert_eq!(spread_color(0), image::Rgb([255, 0, 0]));
        assert_eq!(spread_color(5), spread_color(5));
        assert_ne!(spread_color(1), spread_color(2));
    }

    #[test]
    fn test_load_font_missing() {
        assert!(matches!(
            load_font("/nonexistent/font.ttf"),
            Err(ConfigError::Font { .. })
        ));
    }
}
