//! Integration module connecting pose estimators, frame I/O and the
//! tracker.
//!
//! This module provides the traits the pipeline talks to (keypoint
//! extraction, frame sources and sinks, snapshot storage) and the frame
//! orchestrator that sequences them for one stream.

mod builder;
mod extractor;
mod frames;
mod pipeline;

pub use builder::{DetectionBuilder, DetectionStrategy, detections_from_poses};
pub use extractor::{HeatmapExtractor, HeatmapModel, KeypointExtractor, ReplayExtractor};
pub use frames::{
    DirectorySnapshotStore, FrameSink, FrameSource, ImageSequenceSink, ImageSequenceSource,
    SnapshotStore,
};
pub use pipeline::{CancelFlag, FrameOrchestrator, FrameOutput, StreamEnd, StreamSummary};

#[cfg(feature = "burn-backend")]
mod burn_backend;

#[cfg(feature = "burn-backend")]
pub use burn_backend::{BurnHeatmapModel, BurnPoseModel};
