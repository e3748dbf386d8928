//! Frame orchestrator: drives one stream through extraction, tracking,
//! rendering and snapshot sampling.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ab_glyph::FontArc;
use image::RgbImage;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::builder::detections_from_poses;
use super::extractor::KeypointExtractor;
use super::frames::{FrameSink, FrameSource, SnapshotStore};
use crate::config::PipelineConfig;
use crate::error::{ExtractionError, OutputError, PipelineError};
use crate::pose::Pose;
use crate::render::{SkeletonRenderer, draw_tracks_mut};
use crate::snapshot::{should_snapshot, snapshot_file_name};
use crate::tracker::{Detection, TrackEngine, TrackOutput};

/// Shared stop request, checked between frames.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why a stream run stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum StreamEnd {
    #[default]
    Exhausted,
    ReadFailed(String),
    Cancelled,
}

/// Result of processing one stream.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamSummary {
    pub video_stem: String,
    pub frame_rate: f64,
    pub frames_read: u64,
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub tracks_created: u64,
    pub snapshots: Vec<PathBuf>,
    /// Where the annotated stream was written, filled in by the caller
    pub processed_output: Option<PathBuf>,
    pub end: StreamEnd,
}

/// Everything produced for one successfully processed frame.
#[derive(Debug, Clone)]
pub struct FrameOutput {
    pub annotated: RgbImage,
    /// Poses with keypoints at or below the confidence threshold removed
    pub poses: Vec<Pose>,
    pub detections: Vec<Detection>,
    /// Index into `poses` for each entry of `detections`
    pub detection_poses: Vec<usize>,
    /// `detection_index` points into `detections`
    pub tracks: Vec<TrackOutput>,
}

/// Closes the sink on every exit path, including early returns.
struct OutputGuard<'a, K: FrameSink> {
    sink: &'a mut K,
    closed: bool,
}

impl<'a, K: FrameSink> OutputGuard<'a, K> {
    fn new(sink: &'a mut K) -> Self {
        Self {
            sink,
            closed: false,
        }
    }

    fn write(&mut self, frame: &RgbImage) -> Result<(), OutputError> {
        self.sink.write_frame(frame)
    }

    fn close(&mut self) -> Result<(), OutputError> {
        self.closed = true;
        self.sink.close()
    }
}

impl<K: FrameSink> Drop for OutputGuard<'_, K> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(err) = self.sink.close() {
                warn!(%err, "failed to close output stream");
            }
        }
    }
}

/// Single-stream pipeline. Each [`run`](Self::run) starts a fresh
/// [`TrackEngine`], so identifiers never carry over between streams.
pub struct FrameOrchestrator<E: KeypointExtractor> {
    extractor: E,
    engine: TrackEngine,
    renderer: SkeletonRenderer,
    font: Option<FontArc>,
    config: PipelineConfig,
    cancel: CancelFlag,
}

impl<E: KeypointExtractor> FrameOrchestrator<E> {
    pub fn new(extractor: E, config: PipelineConfig) -> Self {
        Self {
            extractor,
            engine: TrackEngine::new(config.engine_config(config.fps)),
            renderer: SkeletonRenderer::new(),
            font: None,
            config,
            cancel: CancelFlag::new(),
        }
    }

    /// Font for track identifiers, and for part labels when enabled.
    pub fn with_font(mut self, font: FontArc) -> Self {
        if self.config.render.draw_labels {
            self.renderer = SkeletonRenderer::new().with_labels(font.clone());
        }
        self.font = Some(font);
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn engine(&self) -> &TrackEngine {
        &self.engine
    }

    pub fn extractor(&self) -> &E {
        &self.extractor
    }

    /// Extracts, tracks and annotates one frame.
    ///
    /// `keypoint_confidence_threshold` is applied here on top of whatever
    /// filtering the extractor does; poses left empty are dropped.
    pub fn process_frame(&mut self, frame: &RgbImage) -> Result<FrameOutput, ExtractionError> {
        let mut poses = self.extractor.extract(frame)?;
        for pose in &mut poses {
            pose.retain_confident(self.config.keypoint_confidence_threshold);
        }
        poses.retain(|pose| !pose.is_empty());

        let (detection_poses, detections): (Vec<usize>, Vec<Detection>) =
            detections_from_poses(&poses, &self.config.detection)
                .into_iter()
                .unzip();
        let tracks = self.engine.update(&detections);

        let mut annotated = frame.clone();
        for pose in &poses {
            self.renderer.render_mut(&mut annotated, pose);
        }
        draw_tracks_mut(&mut annotated, &tracks, self.font.as_ref());

        Ok(FrameOutput {
            annotated,
            poses,
            detections,
            detection_poses,
            tracks,
        })
    }

    /// Processes `source` to exhaustion, writing every frame to `sink`.
    ///
    /// A failed frame read ends the stream normally. A failed extraction
    /// passes the raw frame through and continues. Snapshot failures are
    /// logged. Only a sink failure aborts the run, after the sink is closed.
    pub fn run<S, K, T>(
        &mut self,
        video_stem: &str,
        source: &mut S,
        sink: &mut K,
        snapshots: &mut T,
    ) -> Result<StreamSummary, PipelineError>
    where
        S: FrameSource,
        K: FrameSink,
        T: SnapshotStore,
    {
        let frame_rate = source.frame_rate();
        self.engine = TrackEngine::new(self.config.engine_config(frame_rate));
        info!(
            video = video_stem,
            frame_rate,
            max_age_frames = self.engine.config().max_age_frames,
            "processing stream"
        );

        let mut summary = StreamSummary {
            video_stem: video_stem.to_string(),
            frame_rate,
            ..StreamSummary::default()
        };
        let mut output = OutputGuard::new(sink);

        loop {
            if self.cancel.is_cancelled() {
                info!(video = video_stem, frame = summary.frames_read, "stream cancelled");
                summary.end = StreamEnd::Cancelled;
                break;
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(err) => {
                    warn!(video = video_stem, %err, "frame read failed, ending stream");
                    summary.end = StreamEnd::ReadFailed(err.to_string());
                    break;
                }
            };
            summary.frames_read += 1;
            let frame_index = summary.frames_read;

            let processed = match self.process_frame(&frame) {
                Ok(processed) => processed,
                Err(err) => {
                    warn!(video = video_stem, frame = frame_index, %err, "extraction failed, skipping frame");
                    summary.frames_skipped += 1;
                    output.write(&frame)?;
                    continue;
                }
            };
            summary.frames_processed += 1;
            debug!(
                frame = frame_index,
                poses = processed.poses.len(),
                tracks = processed.tracks.len(),
                "processed frame"
            );

            output.write(&processed.annotated)?;

            if should_snapshot(frame_index, frame_rate, self.config.snapshot_interval_seconds) {
                let name = snapshot_file_name(video_stem, frame_index, &self.config.snapshot_extension);
                match snapshots.save(&name, &processed.annotated) {
                    Ok(path) => summary.snapshots.push(path),
                    Err(err) => warn!(frame = frame_index, %err, "snapshot failed"),
                }
            }
        }

        output.close()?;
        summary.tracks_created = self.engine.tracks_created();
        info!(
            video = video_stem,
            frames = summary.frames_read,
            skipped = summary.frames_skipped,
            tracks = summary.tracks_created,
            snapshots = summary.snapshots.len(),
            "finished stream"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FrameReadError;
    use crate::integration::DetectionStrategy;
    use crate::pose::{BodyPart, Keypoint};

    struct ScriptedExtractor {
        frames: Vec<Result<Vec<Pose>, ()>>,
        cursor: usize,
    }

    impl KeypointExtractor for ScriptedExtractor {
        fn extract(&mut self, _frame: &RgbImage) -> Result<Vec<Pose>, ExtractionError> {
            let step = self.frames.get(self.cursor).cloned().unwrap_or(Ok(vec![]));
            self.cursor += 1;
            step.map_err(|()| ExtractionError::Inference("scripted failure".into()))
        }
    }

    struct VecSource {
        frames: Vec<Result<RgbImage, ()>>,
        cursor: usize,
    }

    impl FrameSource for VecSource {
        fn frame_rate(&self) -> f64 {
            2.0
        }

        fn next_frame(&mut self) -> Result<Option<RgbImage>, FrameReadError> {
            let Some(next) = self.frames.get(self.cursor).cloned() else {
                return Ok(None);
            };
            self.cursor += 1;
            next.map(Some).map_err(|()| FrameReadError::SizeMismatch {
                index: self.cursor as u64,
                expected: (0, 0),
                got: (1, 1),
            })
        }
    }

    #[derive(Default)]
    struct VecSink {
        frames: Vec<RgbImage>,
        closes: usize,
        fail_on: Option<usize>,
    }

    impl FrameSink for VecSink {
        fn write_frame(&mut self, frame: &RgbImage) -> Result<(), OutputError> {
            if self.fail_on == Some(self.frames.len()) {
                return Err(OutputError::Closed);
            }
            self.frames.push(frame.clone());
            Ok(())
        }

        fn close(&mut self) -> Result<(), OutputError> {
            self.closes += 1;
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        names: Vec<String>,
    }

    impl SnapshotStore for MemoryStore {
        fn save(&mut self, name: &str, _frame: &RgbImage) -> Result<PathBuf, OutputError> {
            self.names.push(name.to_string());
            Ok(PathBuf::from(name))
        }
    }

    fn person_at(x: f32) -> Pose {
        Pose::from_keypoints([
            Keypoint::new(BodyPart::Neck, x, 40.0, 0.9),
            Keypoint::new(BodyPart::RightShoulder, x - 10.0, 45.0, 0.9),
            Keypoint::new(BodyPart::LeftShoulder, x + 10.0, 45.0, 0.9),
        ])
    }

    fn blank_frames(n: usize) -> Vec<Result<RgbImage, ()>> {
        (0..n).map(|_| Ok(RgbImage::new(120, 80))).collect()
    }

    #[test]
    fn test_process_frame_annotates_copy() {
        let extractor = ScriptedExtractor {
            frames: vec![Ok(vec![person_at(50.0)])],
            cursor: 0,
        };
        let mut orchestrator = FrameOrchestrator::new(extractor, PipelineConfig::default());
        let frame = RgbImage::new(120, 80);
        let out = orchestrator.process_frame(&frame).unwrap();
        assert_eq!(out.detections.len(), 1);
        assert!(out.tracks.is_empty());
        assert_ne!(out.annotated, frame);
    }

    #[test]
    fn test_process_frame_applies_configured_threshold() {
        let mut faint = person_at(50.0);
        faint.set(Keypoint::new(BodyPart::Nose, 50.0, 20.0, 0.3));
        let ghost = Pose::from_keypoints([Keypoint::new(BodyPart::Neck, 10.0, 10.0, 0.35)]);
        let extractor = ScriptedExtractor {
            frames: vec![Ok(vec![ghost, faint])],
            cursor: 0,
        };
        let config = PipelineConfig {
            keypoint_confidence_threshold: 0.4,
            ..PipelineConfig::default()
        };
        let mut orchestrator = FrameOrchestrator::new(extractor, config);

        let out = orchestrator.process_frame(&RgbImage::new(120, 80)).unwrap();
        assert_eq!(out.poses.len(), 1);
        assert!(out.poses[0].get(BodyPart::Nose).is_none());
        assert_eq!(out.poses[0].len(), 3);
    }

    #[test]
    fn test_detections_map_back_to_poses() {
        let mut with_nose = person_at(90.0);
        with_nose.set(Keypoint::new(BodyPart::Nose, 90.0, 20.0, 0.9));
        let extractor = ScriptedExtractor {
            frames: vec![Ok(vec![person_at(30.0), with_nose])],
            cursor: 0,
        };
        let mut config = PipelineConfig::default();
        config.detection.strategy = DetectionStrategy::Anchor;
        config.detection.anchor_part = BodyPart::Nose;
        let mut orchestrator = FrameOrchestrator::new(extractor, config);

        let out = orchestrator.process_frame(&RgbImage::new(120, 80)).unwrap();
        assert_eq!(out.poses.len(), 2);
        assert_eq!(out.detections.len(), 1);
        assert_eq!(out.detection_poses, vec![1]);
    }

    #[test]
    fn test_run_skips_failed_extraction_and_keeps_going() {
        let extractor = ScriptedExtractor {
            frames: vec![
                Ok(vec![person_at(50.0)]),
                Err(()),
                Ok(vec![person_at(51.0)]),
                Ok(vec![person_at(52.0)]),
                Ok(vec![person_at(53.0)]),
            ],
            cursor: 0,
        };
        let mut orchestrator = FrameOrchestrator::new(extractor, PipelineConfig::default());
        let mut source = VecSource {
            frames: blank_frames(5),
            cursor: 0,
        };
        let mut sink = VecSink::default();
        let mut store = MemoryStore::default();

        let summary = orchestrator
            .run("clip", &mut source, &mut sink, &mut store)
            .unwrap();

        assert_eq!(summary.frames_read, 5);
        assert_eq!(summary.frames_processed, 4);
        assert_eq!(summary.frames_skipped, 1);
        assert_eq!(summary.tracks_created, 1);
        assert_eq!(summary.end, StreamEnd::Exhausted);
        assert_eq!(sink.frames.len(), 5);
        assert_eq!(sink.closes, 1);
        // 2 fps, 1 s interval: frames 2 and 4, frame 2 was skipped
        assert_eq!(store.names, vec!["clip_frame_4.png"]);
    }

    #[test]
    fn test_read_failure_ends_stream_cleanly() {
        let mut frames = blank_frames(3);
        frames[1] = Err(());
        let mut orchestrator = FrameOrchestrator::new(
            ScriptedExtractor {
                frames: vec![],
                cursor: 0,
            },
            PipelineConfig::default(),
        );
        let mut source = VecSource { frames, cursor: 0 };
        let mut sink = VecSink::default();

        let summary = orchestrator
            .run("clip", &mut source, &mut sink, &mut MemoryStore::default())
            .unwrap();
        assert_eq!(summary.frames_read, 1);
        assert!(matches!(summary.end, StreamEnd::ReadFailed(_)));
        assert_eq!(sink.closes, 1);
    }

    #[test]
    fn test_sink_failure_still_closes_output() {
        let mut orchestrator = FrameOrchestrator::new(
            ScriptedExtractor {
                frames: vec![],
                cursor: 0,
            },
            PipelineConfig::default(),
        );
        let mut source = VecSource {
            frames: blank_frames(4),
            cursor: 0,
        };
        let mut sink = VecSink {
            fail_on: Some(2),
            ..VecSink::default()
        };

        let result = orchestrator.run("clip", &mut source, &mut sink, &mut MemoryStore::default());
        assert!(matches!(result, Err(PipelineError::Output(OutputError::Closed))));
        assert_eq!(sink.frames.len(), 2);
        assert_eq!(sink.closes, 1);
    }

    #[test]
    fn test_cancelled_run_closes_output() {
        let orchestrator = FrameOrchestrator::new(
            ScriptedExtractor {
                frames: vec![],
                cursor: 0,
            },
            PipelineConfig::default(),
        );
        let cancel = orchestrator.cancel_flag();
        let mut orchestrator = orchestrator;
        cancel.cancel();

        let mut source = VecSource {
            frames: blank_frames(3),
            cursor: 0,
        };
        let mut sink = VecSink::default();
        let summary = orchestrator
            .run("clip", &mut source, &mut sink, &mut MemoryStore::default())
            .unwrap();
        assert_eq!(summary.end, StreamEnd::Cancelled);
        assert_eq!(summary.frames_read, 0);
        assert_eq!(sink.closes, 1);
    }

    #[test]
    fn test_each_run_gets_fresh_identifiers() {
        let poses: Vec<Result<Vec<Pose>, ()>> = (0..6).map(|i| Ok(vec![person_at(50.0 + i as f32)])).collect();
        let mut orchestrator = FrameOrchestrator::new(
            ScriptedExtractor {
                frames: poses,
                cursor: 0,
            },
            PipelineConfig::default(),
        );
        for _ in 0..2 {
            let mut source = VecSource {
                frames: blank_frames(3),
                cursor: 0,
            };
            let summary = orchestrator
                .run("clip", &mut source, &mut VecSink::default(), &mut MemoryStore::default())
                .unwrap();
            assert_eq!(summary.tracks_created, 1);
        }
        assert_eq!(orchestrator.engine().frame_count(), 3);
    }
}
