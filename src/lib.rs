//! Causal multi-person pose tracking for video frame streams.
//!
//! Per frame: keypoints are extracted, turned into detection boxes,
//! associated with persistent tracks, and drawn as a skeleton with track
//! boxes and identifiers. Snapshots are sampled periodically.

pub mod config;
pub mod error;
pub mod integration;
pub mod pose;
pub mod render;
pub mod snapshot;
pub mod tracker;

pub use config::PipelineConfig;
pub use integration::{FrameOrchestrator, KeypointExtractor, StreamSummary};
pub use pose::{BodyPart, Keypoint, Pose};
pub use tracker::{Detection, EngineConfig, Rect, TrackEngine, TrackOutput};
