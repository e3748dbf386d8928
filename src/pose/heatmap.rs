//! Stateless conversions around the keypoint network: frame to input
//! tensor, and per-part confidence heatmaps to keypoints.

use image::RgbImage;
use image::imageops::{self, FilterType};
use ndarray::{Array4, ArrayView2, ArrayView3, Axis};

use crate::error::ExtractionError;
use crate::pose::keypoint::{BodyPart, Keypoint, Pose};

/// Square input resolution of the keypoint network.
pub const NETWORK_INPUT_SIZE: u32 = 368;

const INPUT_MEAN: f32 = 127.5;

/// Resizes a frame to the network input and lays it out as a
/// `(1, 3, H, W)` tensor in RGB order with the mean removed.
pub fn preprocess(frame: &RgbImage) -> Array4<f32> {
    let size = NETWORK_INPUT_SIZE;
    let resized = imageops::resize(frame, size, size, FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = f32::from(pixel.0[c]) - INPUT_MEAN;
        }
    }
    tensor
}

/// Decodes one pose from a `(parts, H, W)` heatmap tensor.
///
/// Each part takes the location of its heatmap maximum, scaled to frame
/// pixels. Parts whose peak is not above `threshold` are absent. Channels
/// past the 18 body parts (the background map) are ignored.
pub fn extract_keypoints(
    heatmaps: ArrayView3<'_, f32>,
    frame_width: u32,
    frame_height: u32,
    threshold: f32,
) -> Result<Pose, ExtractionError> {
    let (parts, height, width) = heatmaps.dim();
    if parts < BodyPart::COUNT {
        return Err(ExtractionError::TooFewParts {
            expected: BodyPart::COUNT,
            got: parts,
        });
    }
    if height == 0 || width == 0 {
        return Err(ExtractionError::EmptyHeatmap { height, width });
    }

    let mut pose = Pose::new();
    for (part, heatmap) in BodyPart::ALL.iter().zip(heatmaps.axis_iter(Axis(0))) {
        let Some((row, col, confidence)) = arg_max(heatmap) else {
            continue;
        };
        if confidence <= threshold {
            continue;
        }
        let x = (frame_width as usize * col / width) as f32;
        let y = (frame_height as usize * row / height) as f32;
        pose.set(Keypoint::new(*part, x, y, confidence));
    }
    Ok(pose)
}

/// First maximum in row-major order, NaNs ignored.
fn arg_max(heatmap: ArrayView2<'_, f32>) -> Option<(usize, usize, f32)> {
    let mut best: Option<(usize, usize, f32)> = None;
    for ((row, col), &value) in heatmap.indexed_iter() {
        if value.is_nan() {
            continue;
        }
        if best.is_none_or(|(_, _, v)| value > v) {
            best = Some((row, col, value));
        }
    }
    best
}
