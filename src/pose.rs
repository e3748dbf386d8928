//! Body-part topology, keypoints and the heatmap decoding step.

mod heatmap;
mod keypoint;

pub use heatmap::{NETWORK_INPUT_SIZE, extract_keypoints, preprocess};
pub use keypoint::{BodyPart, Keypoint, POSE_PAIRS, Pose};
