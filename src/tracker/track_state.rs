/// Lifecycle state of a track.
///
/// `Tentative -> Confirmed -> Deleted`, or `Tentative -> Deleted`.
/// Nothing leaves `Deleted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackState {
    /// Newly spawned, not enough hits yet
    #[default]
    Tentative,
    /// Reported in the engine output
    Confirmed,
    /// Coasted past the maximum age
    Deleted,
}

impl TrackState {
    pub fn is_live(self) -> bool {
        self != TrackState::Deleted
    }
}
