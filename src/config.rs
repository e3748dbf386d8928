use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::integration::DetectionStrategy;
use crate::pose::BodyPart;
use crate::tracker::{EngineConfig, frames_for};

/// Options recognised by the pipeline. Every key is optional in the TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Keypoints are kept when their confidence is strictly above this
    pub keypoint_confidence_threshold: f32,
    /// Largest `1 - IoU` accepted as a match
    pub association_cost_gate: f32,
    pub confirm_hits_threshold: u32,
    /// Coasting tolerance in seconds of video
    pub max_track_age_seconds: f64,
    /// Overrides `max_track_age_seconds` when set
    pub max_track_age_frames: Option<u32>,
    pub snapshot_interval_seconds: f64,
    pub snapshot_extension: String,
    /// Frame rate assumed for sources that carry none (image sequences)
    pub fps: f64,
    pub detection: DetectionConfig,
    pub render: RenderConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub strategy: DetectionStrategy,
    /// Part the placeholder box is centred on for the `anchor` strategy
    pub anchor_part: BodyPart,
    /// Side of the placeholder box, pixels
    pub box_size: f32,
    /// Margin added around `extent` boxes, pixels
    pub padding: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub draw_labels: bool,
    /// TTF font for track identifiers and part labels; text is skipped without one
    pub font_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            keypoint_confidence_threshold: 0.2,
            association_cost_gate: 0.8,
            confirm_hits_threshold: 3,
            max_track_age_seconds: 1.0,
            max_track_age_frames: None,
            snapshot_interval_seconds: 1.0,
            snapshot_extension: "png".to_string(),
            fps: 30.0,
            detection: DetectionConfig::default(),
            render: RenderConfig::default(),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            strategy: DetectionStrategy::Extent,
            anchor_part: BodyPart::Nose,
            box_size: 50.0,
            padding: 10.0,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            draw_labels: true,
            font_path: None,
        }
    }
}

impl PipelineConfig {
    /// Reads and validates a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = |key, v: f32| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(invalid(key, format!("{v} is outside [0, 1]")))
            }
        };
        let positive = |key, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(invalid(key, format!("{v} must be positive")))
            }
        };

        unit("keypoint_confidence_threshold", self.keypoint_confidence_threshold)?;
        unit("association_cost_gate", self.association_cost_gate)?;
        if self.confirm_hits_threshold == 0 {
            return Err(invalid("confirm_hits_threshold", "must be at least 1".into()));
        }
        if self.max_track_age_frames == Some(0) {
            return Err(invalid("max_track_age_frames", "must be at least 1".into()));
        }
        positive("max_track_age_seconds", self.max_track_age_seconds)?;
        positive("snapshot_interval_seconds", self.snapshot_interval_seconds)?;
        positive("fps", self.fps)?;
        positive("detection.box_size", f64::from(self.detection.box_size))?;
        if !(self.detection.padding.is_finite() && self.detection.padding >= 0.0) {
            return Err(invalid("detection.padding", "must be non-negative".into()));
        }
        if self.snapshot_extension.is_empty() {
            return Err(invalid("snapshot_extension", "must not be empty".into()));
        }
        Ok(())
    }

    /// Coasting tolerance in frames for a stream at `frame_rate`.
    pub fn max_age_frames(&self, frame_rate: f64) -> u32 {
        self.max_track_age_frames
            .unwrap_or_else(|| frames_for(frame_rate, self.max_track_age_seconds))
    }

    pub fn engine_config(&self, frame_rate: f64) -> EngineConfig {
        EngineConfig {
            association_cost_gate: self.association_cost_gate,
            confirm_hits_threshold: self.confirm_hits_threshold,
            max_age_frames: self.max_age_frames(frame_rate),
        }
    }
}

fn invalid(key: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { key, reason }
}
