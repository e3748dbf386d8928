//! Keypoint extraction backends.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use image::RgbImage;
use ndarray::{Array3, Array4};
use serde::Deserialize;

use crate::error::ExtractionError;
use crate::pose::{self, Keypoint, Pose};

/// Source of per-frame poses.
///
/// Implement this trait to connect any pose estimator to the pipeline. Each
/// returned pose is one person; keypoints below the extractor's confidence
/// threshold are absent.
pub trait KeypointExtractor {
    fn extract(&mut self, frame: &RgbImage) -> Result<Vec<Pose>, ExtractionError>;
}

/// A keypoint network treated as an oracle: input tensor in, per-part
/// confidence heatmaps out.
///
/// # Example
///
/// ```ignore
/// use posetrack_rs::integration::HeatmapModel;
///
/// struct MyNetwork { /* ... */ }
///
/// impl HeatmapModel for MyNetwork {
///     fn infer(&mut self, input: &Array4<f32>) -> Result<Array3<f32>, ExtractionError> {
///         // run the network, return (parts, H, W)
///     }
/// }
/// ```
pub trait HeatmapModel {
    /// `input` is `(1, 3, 368, 368)` as produced by [`pose::preprocess`].
    /// Returns heatmaps shaped `(parts, H, W)`, body parts first.
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array3<f32>, ExtractionError>;
}

/// Single-person extractor: arg-max of each part's heatmap.
pub struct HeatmapExtractor<M: HeatmapModel> {
    model: M,
    confidence_threshold: f32,
}

impl<M: HeatmapModel> HeatmapExtractor<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            confidence_threshold: 0.2,
        }
    }

    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }
}

impl<M: HeatmapModel> KeypointExtractor for HeatmapExtractor<M> {
    fn extract(&mut self, frame: &RgbImage) -> Result<Vec<Pose>, ExtractionError> {
        let input = pose::preprocess(frame);
        let heatmaps = self.model.infer(&input)?;
        let pose = pose::extract_keypoints(
            heatmaps.view(),
            frame.width(),
            frame.height(),
            self.confidence_threshold,
        )?;
        Ok(if pose.is_empty() { vec![] } else { vec![pose] })
    }
}

#[derive(Debug, Deserialize)]
struct FrameRecord {
    #[serde(default)]
    poses: Vec<Vec<Keypoint>>,
}

/// Replays keypoints recorded earlier, one JSON object per line:
///
/// ```text
/// {"poses": [[{"part": "Nose", "x": 120.0, "y": 80.0, "confidence": 0.91}, ...], ...]}
/// ```
///
/// Line `n` holds the poses of frame `n`. Frames are consumed in order and
/// the frame content is ignored.
#[derive(Debug)]
pub struct ReplayExtractor {
    frames: VecDeque<Vec<Pose>>,
    served: u64,
    confidence_threshold: f32,
}

impl ReplayExtractor {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ExtractionError> {
        let file = File::open(path.as_ref()).map_err(|err| ExtractionError::MalformedRecord {
            line: 0,
            message: format!("{}: {err}", path.as_ref().display()),
        })?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, ExtractionError> {
        let mut frames = VecDeque::new();
        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx + 1;
            let line = line.map_err(|err| ExtractionError::MalformedRecord {
                line: line_no,
                message: err.to_string(),
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let record: FrameRecord =
                serde_json::from_str(&line).map_err(|err| ExtractionError::MalformedRecord {
                    line: line_no,
                    message: err.to_string(),
                })?;
            frames.push_back(record.poses.into_iter().map(Pose::from_keypoints).collect());
        }
        Ok(Self {
            frames,
            served: 0,
            confidence_threshold: 0.2,
        })
    }

    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl KeypointExtractor for ReplayExtractor {
    fn extract(&mut self, _frame: &RgbImage) -> Result<Vec<Pose>, ExtractionError> {
        self.served += 1;
        let mut poses = self
            .frames
            .pop_front()
            .ok_or(ExtractionError::ReplayExhausted(self.served))?;
        for pose in &mut poses {
            pose.retain_confident(self.confidence_threshold);
        }
        poses.retain(|p| !p.is_empty());
        Ok(poses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::BodyPart;

    struct PeakModel {
        row: usize,
        col: usize,
        calls: usize,
    }

    impl HeatmapModel for PeakModel {
        fn infer(&mut self, input: &Array4<f32>) -> Result<Array3<f32>, ExtractionError> {
            assert_eq!(input.dim(), (1, 3, 368, 368));
            self.calls += 1;
            let mut maps = Array3::zeros((19, 46, 46));
            maps[[BodyPart::Neck.index(), self.row, self.col]] = 0.9;
            Ok(maps)
        }
    }

    struct FailingModel;

    impl HeatmapModel for FailingModel {
        fn infer(&mut self, _input: &Array4<f32>) -> Result<Array3<f32>, ExtractionError> {
            Err(ExtractionError::Inference("device lost".into()))
        }
    }

    #[test]
    fn test_heatmap_extractor() {
        let mut extractor = HeatmapExtractor::new(PeakModel {
            row: 23,
            col: 10,
            calls: 0,
        });
        let frame = RgbImage::new(460, 92);
        let poses = extractor.extract(&frame).unwrap();
        assert_eq!(poses.len(), 1);
        let neck = poses[0].get(BodyPart::Neck).unwrap();
        assert_eq!((neck.x, neck.y), (100.0, 46.0));
        assert_eq!(extractor.model().calls, 1);
    }

    #[test]
    fn test_heatmap_extractor_propagates_failure() {
        let mut extractor = HeatmapExtractor::new(FailingModel);
        assert!(matches!(
            extractor.extract(&RgbImage::new(8, 8)),
            Err(ExtractionError::Inference(_))
        ));
    }

    #[test]
    fn test_replay_extractor() {
        let data = concat!(
            r#"{"poses": [[{"part": "Nose", "x": 10.0, "y": 20.0, "confidence": 0.9},"#,
            r#"{"part": "Neck", "x": 10.0, "y": 40.0, "confidence": 0.1}]]}"#,
            "\n",
            "\n",
            r#"{"poses": []}"#,
            "\n",
        );
        let mut replay = ReplayExtractor::from_reader(data.as_bytes()).unwrap();
        assert_eq!(replay.remaining(), 2);

        let frame = RgbImage::new(1, 1);
        let first = replay.extract(&frame).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].len(), 1);
        assert!(replay.extract(&frame).unwrap().is_empty());
        assert!(matches!(
            replay.extract(&frame),
            Err(ExtractionError::ReplayExhausted(3))
        ));
    }

    #[test]
    fn test_replay_rejects_bad_line() {
        let err = ReplayExtractor::from_reader("{\"poses\": 5}\n".as_bytes()).unwrap_err();
        assert!(matches!(err, ExtractionError::MalformedRecord { line: 1, .. }));
    }
}
