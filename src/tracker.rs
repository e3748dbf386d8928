mod engine;
mod kalman_filter;
mod matching;
mod rect;
mod track;
mod track_state;

pub use engine::{EngineConfig, TrackEngine, TrackOutput, frames_for};
pub use kalman_filter::KalmanFilter;
pub use matching::{AssignmentResult, Detection, gate_costs, iou_distance, linear_assignment};
pub use rect::Rect;
pub use track::Track;
pub use track_state::TrackState;
