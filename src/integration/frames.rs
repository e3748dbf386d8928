//! Frame sources, frame sinks and snapshot storage.
//!
//! Container muxing is left to external tools: streams here are directories
//! of still images, one file per frame, ordered by file name.

use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;
use serde::Serialize;
use tracing::debug;

use crate::error::{FrameReadError, OutputError};

/// Ordered, read-once stream of frames.
pub trait FrameSource {
    /// Frames per second of the source material.
    fn frame_rate(&self) -> f64;

    /// `Ok(None)` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<RgbImage>, FrameReadError>;
}

/// Destination of processed frames.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<(), OutputError>;

    /// Flushes and releases the output. Writes after closing fail.
    fn close(&mut self) -> Result<(), OutputError>;
}

/// Storage for still snapshots.
pub trait SnapshotStore {
    /// Persists `frame` under `name` and returns where it went.
    fn save(&mut self, name: &str, frame: &RgbImage) -> Result<PathBuf, OutputError>;
}

const FRAME_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "tiff"];

/// Reads a directory of frame images in file-name order.
#[derive(Debug)]
pub struct ImageSequenceSource {
    files: Vec<PathBuf>,
    cursor: usize,
    frame_rate: f64,
    dimensions: Option<(u32, u32)>,
}

impl ImageSequenceSource {
    pub fn open<P: AsRef<Path>>(dir: P, frame_rate: f64) -> std::io::Result<Self> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            if path.is_file() && is_frame_file(&path) {
                files.push(path);
            }
        }
        files.sort();
        debug!(dir = %dir.as_ref().display(), frames = files.len(), "opened image sequence");
        Ok(Self {
            files,
            cursor: 0,
            frame_rate,
            dimensions: None,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| FRAME_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

impl FrameSource for ImageSequenceSource {
    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, FrameReadError> {
        let Some(path) = self.files.get(self.cursor).cloned() else {
            return Ok(None);
        };
        self.cursor += 1;
        let index = self.cursor as u64;

        let frame = image::open(&path)
            .map_err(|source| match source {
                image::ImageError::IoError(source) => FrameReadError::Io {
                    index,
                    path: path.clone(),
                    source,
                },
                source => FrameReadError::Decode {
                    index,
                    path: path.clone(),
                    source,
                },
            })?
            .to_rgb8();

        let got = frame.dimensions();
        match self.dimensions {
            None => self.dimensions = Some(got),
            Some(expected) if expected != got => {
                return Err(FrameReadError::SizeMismatch {
                    index,
                    expected,
                    got,
                });
            }
            Some(_) => {}
        }
        Ok(Some(frame))
    }
}

#[derive(Debug, Serialize)]
struct SequenceManifest {
    frame_rate: f64,
    width: u32,
    height: u32,
    frames: u64,
}

/// Writes frames as numbered PNGs plus a `sequence.json` manifest holding
/// the frame rate and resolution.
#[derive(Debug)]
pub struct ImageSequenceSink {
    dir: PathBuf,
    frame_rate: f64,
    written: u64,
    dimensions: (u32, u32),
    closed: bool,
}

impl ImageSequenceSink {
    pub fn create<P: AsRef<Path>>(dir: P, frame_rate: f64) -> Result<Self, OutputError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| OutputError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            frame_rate,
            written: 0,
            dimensions: (0, 0),
            closed: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn frames_written(&self) -> u64 {
        self.written
    }
}

impl FrameSink for ImageSequenceSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<(), OutputError> {
        if self.closed {
            return Err(OutputError::Closed);
        }
        let path = self.dir.join(format!("frame_{:06}.png", self.written + 1));
        frame
            .save(&path)
            .map_err(|source| OutputError::Encode { path, source })?;
        self.written += 1;
        self.dimensions = frame.dimensions();
        Ok(())
    }

    fn close(&mut self) -> Result<(), OutputError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let manifest = SequenceManifest {
            frame_rate: self.frame_rate,
            width: self.dimensions.0,
            height: self.dimensions.1,
            frames: self.written,
        };
        let path = self.dir.join("sequence.json");
        let json = serde_json::to_vec_pretty(&manifest)
            .map_err(|err| OutputError::Io {
                path: path.clone(),
                source: err.into(),
            })?;
        fs::write(&path, json).map_err(|source| OutputError::Io { path, source })
    }
}

/// Saves snapshots into one directory, format chosen by file extension.
#[derive(Debug)]
pub struct DirectorySnapshotStore {
    dir: PathBuf,
}

impl DirectorySnapshotStore {
    pub fn create<P: AsRef<Path>>(dir: P) -> Result<Self, OutputError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| OutputError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }
}

impl SnapshotStore for DirectorySnapshotStore {
    fn save(&mut self, name: &str, frame: &RgbImage) -> Result<PathBuf, OutputError> {
        let path = self.dir.join(name);
        frame.save(&path).map_err(|source| OutputError::Encode {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}
