//! Turning per-frame poses into tracker detections.

use serde::{Deserialize, Serialize};

use crate::config::DetectionConfig;
use crate::pose::Pose;
use crate::tracker::{Detection, Rect};

/// Builder for `Detection` objects from corner or centre forms.
#[derive(Debug, Clone, Default)]
pub struct DetectionBuilder {
    bbox: Rect,
    score: f32,
}

impl DetectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set bounding box from corners (x1, y1, x2, y2).
    pub fn tlbr(mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        self.bbox = Rect::from_tlbr(x1, y1, x2, y2);
        self
    }

    /// Set bounding box from centre and size.
    pub fn center(mut self, cx: f32, cy: f32, w: f32, h: f32) -> Self {
        self.bbox = Rect::from_center(cx, cy, w, h);
        self
    }

    pub fn rect(mut self, bbox: Rect) -> Self {
        self.bbox = bbox;
        self
    }

    pub fn score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }

    pub fn build(self) -> Detection {
        Detection::from_rect(self.bbox, self.score)
    }
}

/// How a pose becomes a tracker detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionStrategy {
    /// Box around every confident keypoint of the pose, padded
    #[default]
    Extent,
    /// Fixed-size placeholder box centred on a single anchor part
    Anchor,
}

/// Builds one detection per pose that has enough keypoints for the
/// configured strategy. Returns `(pose index, detection)` pairs in pose
/// order; poses that yield nothing are left out.
pub fn detections_from_poses(poses: &[Pose], config: &DetectionConfig) -> Vec<(usize, Detection)> {
    poses
        .iter()
        .enumerate()
        .filter_map(|(idx, pose)| detection_for_pose(pose, config).map(|det| (idx, det)))
        .collect()
}

fn detection_for_pose(pose: &Pose, config: &DetectionConfig) -> Option<Detection> {
    match config.strategy {
        DetectionStrategy::Anchor => {
            let kp = pose.get(config.anchor_part)?;
            Some(
                DetectionBuilder::new()
                    .center(kp.x, kp.y, config.box_size, config.box_size)
                    .score(kp.confidence)
                    .build(),
            )
        }
        DetectionStrategy::Extent => {
            let mut bbox = Rect::enclosing(pose.present().map(|kp| (kp.x, kp.y)), config.padding)?;
            // a lone keypoint or a straight line of them has no area
            if bbox.width < config.box_size || bbox.height < config.box_size {
                let (cx, cy) = bbox.center();
                bbox = Rect::from_center(
                    cx,
                    cy,
                    bbox.width.max(config.box_size),
                    bbox.height.max(config.box_size),
                );
            }
            Some(
                DetectionBuilder::new()
                    .rect(bbox)
                    .score(pose.mean_confidence())
                    .build(),
            )
        }
    }
}
