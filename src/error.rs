//! Error kinds for the tracking pipeline.
//!
//! Every failure in the per-frame pipeline is frame-scoped: the orchestrator
//! logs it and moves on. Only configuration problems and a broken output
//! sink surface to the caller.

use std::path::PathBuf;

use thiserror::Error;

/// Reading the next frame from the source failed. Ends the stream loop.
#[derive(Debug, Error)]
pub enum FrameReadError {
    #[error("failed to read frame {index} from {path}: {source}")]
    Io {
        index: u64,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode frame {index} from {path}: {source}")]
    Decode {
        index: u64,
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("frame {index} has size {got:?}, stream size is {expected:?}")]
    SizeMismatch {
        index: u64,
        expected: (u32, u32),
        got: (u32, u32),
    },
}

/// Keypoint extraction failed for a single frame. The frame is skipped.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("heatmap tensor has {got} part channels, need at least {expected}")]
    TooFewParts { expected: usize, got: usize },
    #[error("heatmap tensor has an empty spatial grid ({height}x{width})")]
    EmptyHeatmap { height: usize, width: usize },
    #[error("model inference failed: {0}")]
    Inference(String),
    #[error("no recorded keypoints for frame {0}")]
    ReplayExhausted(u64),
    #[error("malformed keypoint record at line {line}: {message}")]
    MalformedRecord { line: usize, message: String },
}

/// A detection box that cannot enter the cost matrix.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum InvalidDetectionError {
    #[error("non-positive box size {width}x{height}")]
    NonPositiveSize { width: f32, height: f32 },
    #[error("non-finite box coordinates")]
    NonFinite,
}

/// Writing processed frames or snapshots failed.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("output already closed")]
    Closed,
}

/// Configuration could not be loaded or is out of range.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("cannot load font {path}: {reason}")]
    Font { path: PathBuf, reason: String },
}

/// Terminal failure of a stream run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("output stream failed: {0}")]
    Output(#[from] OutputError),
}
