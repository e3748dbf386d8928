//! A single tracked person.

use crate::tracker::kalman_filter::{KalmanFilter, StateCovariance, StateMean};
use crate::tracker::rect::Rect;
use crate::tracker::track_state::TrackState;

/// Persistent per-person track owned by a [`TrackEngine`](super::TrackEngine).
#[derive(Debug, Clone)]
pub struct Track {
    track_id: u64,
    state: TrackState,
    /// Successful associations, including the spawning detection
    hits: u32,
    /// Frames since birth
    age: u32,
    /// Frames since the last successful association
    time_since_update: u32,
    mean: StateMean,
    covariance: StateCovariance,
}

impl Track {
    pub(crate) fn spawn(track_id: u64, bbox: Rect, kalman_filter: &KalmanFilter) -> Self {
        let (mean, covariance) = kalman_filter.initiate(measurement(&bbox));
        Self {
            track_id,
            state: TrackState::Tentative,
            hits: 1,
            age: 0,
            time_since_update: 0,
            mean,
            covariance,
        }
    }

    pub fn track_id(&self) -> u64 {
        self.track_id
    }

    pub fn state(&self) -> TrackState {
        self.state
    }

    pub fn hits(&self) -> u32 {
        self.hits
    }

    pub fn age(&self) -> u32 {
        self.age
    }

    pub fn time_since_update(&self) -> u32 {
        self.time_since_update
    }

    pub fn is_confirmed(&self) -> bool {
        self.state == TrackState::Confirmed
    }

    /// Current box estimate: corrected if matched this frame, predicted otherwise.
    pub fn rect(&self) -> Rect {
        Rect::from_xyah(
            self.mean[0] as f32,
            self.mean[1] as f32,
            self.mean[2] as f32,
            self.mean[3] as f32,
        )
    }

    pub(crate) fn predict(&mut self, kalman_filter: &KalmanFilter) {
        let (mean, covariance) = kalman_filter.predict(&self.mean, &self.covariance);
        self.mean = mean;
        self.covariance = covariance;
    }

    pub(crate) fn update(&mut self, bbox: &Rect, kalman_filter: &KalmanFilter) {
        let (mean, covariance) = kalman_filter.update(&self.mean, &self.covariance, measurement(bbox));
        self.mean = mean;
        self.covariance = covariance;
        self.hits += 1;
        self.time_since_update = 0;
    }

    pub(crate) fn mark_missed(&mut self) {
        self.time_since_update += 1;
    }

    pub(crate) fn advance_age(&mut self) {
        self.age += 1;
    }

    /// Applies the lifecycle transitions for the end of a frame.
    pub(crate) fn step_lifecycle(&mut self, confirm_hits: u32, max_age: u32) {
        if self.state == TrackState::Deleted {
            return;
        }
        if self.time_since_update > max_age {
            self.state = TrackState::Deleted;
        } else if self.state == TrackState::Tentative && self.hits >= confirm_hits {
            self.state = TrackState::Confirmed;
        }
    }
}

fn measurement(bbox: &Rect) -> [f64; 4] {
    bbox.to_xyah().map(f64::from)
}
