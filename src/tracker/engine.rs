//! Track association engine: predict, associate, update, spawn, age, prune.

use serde::Serialize;
use tracing::{debug, warn};

use crate::tracker::kalman_filter::KalmanFilter;
use crate::tracker::matching::{self, AssignmentResult, Detection};
use crate::tracker::rect::Rect;
use crate::tracker::track::Track;
use crate::tracker::track_state::TrackState;

/// Configuration for the [`TrackEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Largest `1 - IoU` accepted as a match
    pub association_cost_gate: f32,
    /// Hits needed before a track is reported
    pub confirm_hits_threshold: u32,
    /// Frames a track may go unmatched before it is deleted
    pub max_age_frames: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            association_cost_gate: 0.8,
            confirm_hits_threshold: 3,
            max_age_frames: 30,
        }
    }
}

impl EngineConfig {
    /// Default gating and confirmation, with the coasting tolerance expressed
    /// in seconds of a stream running at `frame_rate`.
    pub fn for_frame_rate(frame_rate: f64, max_age_seconds: f64) -> Self {
        Self {
            max_age_frames: frames_for(frame_rate, max_age_seconds),
            ..Self::default()
        }
    }
}

/// Converts a duration to a whole number of frames, at least one.
pub fn frames_for(frame_rate: f64, seconds: f64) -> u32 {
    let frames = (frame_rate * seconds).round();
    if frames.is_finite() && frames >= 1.0 {
        frames.min(u32::MAX as f64) as u32
    } else {
        1
    }
}

/// One confirmed track reported for a frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackOutput {
    pub track_id: u64,
    pub bbox: Rect,
    /// Index into the frame's detection list, `None` while coasting
    pub detection_index: Option<usize>,
}

/// Multi-target tracker for a single stream.
///
/// Owns its tracks and its identifier counter; two engines never share
/// state.
pub struct TrackEngine {
    tracks: Vec<Track>,
    config: EngineConfig,
    kalman_filter: KalmanFilter,
    next_id: u64,
    frame_id: u64,
}

impl TrackEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            tracks: Vec::new(),
            config,
            kalman_filter: KalmanFilter::default(),
            next_id: 1,
            frame_id: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Live tracks, tentative and confirmed, in identifier order.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Frames processed so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_id
    }

    /// Identifiers handed out so far.
    pub fn tracks_created(&self) -> u64 {
        self.next_id - 1
    }

    /// Runs one frame and returns the confirmed tracks in identifier order.
    pub fn update(&mut self, detections: &[Detection]) -> Vec<TrackOutput> {
        self.frame_id += 1;

        // Step 1: Drop boxes that cannot enter the cost matrix
        let valid: Vec<usize> = detections
            .iter()
            .enumerate()
            .filter_map(|(idx, det)| match det.bbox.validate() {
                Ok(()) => Some(idx),
                Err(err) => {
                    warn!(frame = self.frame_id, detection = idx, %err, "skipped invalid detection");
                    None
                }
            })
            .collect();

        // Step 2: Predict
        for track in &mut self.tracks {
            track.predict(&self.kalman_filter);
        }

        // Step 3: Associate
        let track_rects: Vec<Rect> = self.tracks.iter().map(Track::rect).collect();
        let det_rects: Vec<Rect> = valid.iter().map(|&idx| detections[idx].bbox).collect();
        let dists = matching::iou_distance(&track_rects, &det_rects);

        let AssignmentResult {
            matches,
            unmatched_tracks,
            unmatched_detections,
        } = matching::linear_assignment(&dists, self.config.association_cost_gate);

        // Step 4: Update matched, age everything that existed before this frame
        let mut matched_detection = vec![None; self.tracks.len()];
        for (itrack, idet) in matches {
            let det_idx = valid[idet];
            self.tracks[itrack].update(&detections[det_idx].bbox, &self.kalman_filter);
            matched_detection[itrack] = Some(det_idx);
        }
        for itrack in unmatched_tracks {
            self.tracks[itrack].mark_missed();
        }
        for track in &mut self.tracks {
            track.advance_age();
        }

        // Step 5: Spawn
        for idet in unmatched_detections {
            let det_idx = valid[idet];
            let track_id = self.next_id;
            self.next_id += 1;
            debug!(frame = self.frame_id, track_id, detection = det_idx, "spawned track");
            self.tracks
                .push(Track::spawn(track_id, detections[det_idx].bbox, &self.kalman_filter));
            matched_detection.push(Some(det_idx));
        }

        // Step 6: Lifecycle
        let EngineConfig {
            confirm_hits_threshold,
            max_age_frames,
            ..
        } = self.config;
        for track in &mut self.tracks {
            let before = track.state();
            track.step_lifecycle(confirm_hits_threshold, max_age_frames);
            match (before, track.state()) {
                (TrackState::Tentative, TrackState::Confirmed) => {
                    debug!(frame = self.frame_id, track_id = track.track_id(), "confirmed track");
                }
                (_, TrackState::Deleted) => {
                    debug!(
                        frame = self.frame_id,
                        track_id = track.track_id(),
                        age = track.age(),
                        hits = track.hits(),
                        "deleted track"
                    );
                }
                _ => {}
            }
        }

        let mut outputs = Vec::new();
        let mut kept = Vec::with_capacity(self.tracks.len());
        for (track, detection_index) in self.tracks.drain(..).zip(matched_detection) {
            if !track.state().is_live() {
                continue;
            }
            if track.is_confirmed() {
                outputs.push(TrackOutput {
                    track_id: track.track_id(),
                    bbox: track.rect(),
                    detection_index,
                });
            }
            kept.push(track);
        }
        self.tracks = kept;

        // Step 7: Emit
        outputs
    }
}
