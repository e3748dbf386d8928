//! Periodic snapshot policy.
//!
//! Frame indices are 1-based: the first frame read from a stream is frame 1.

/// Frames between snapshots, `None` when the rate or interval cannot
/// produce a period.
pub fn snapshot_period(frame_rate: f64, interval_seconds: f64) -> Option<u64> {
    let frames = (frame_rate * interval_seconds).floor();
    if !frames.is_finite() || frame_rate <= 0.0 || interval_seconds <= 0.0 {
        return None;
    }
    Some(frames.max(1.0) as u64)
}

/// Whether frame `frame_index` should be persisted as a still image.
pub fn should_snapshot(frame_index: u64, frame_rate: f64, interval_seconds: f64) -> bool {
    match snapshot_period(frame_rate, interval_seconds) {
        Some(period) => frame_index > 0 && frame_index % period == 0,
        None => false,
    }
}

/// `{video_stem}_frame_{frame_index}.{extension}`
pub fn snapshot_file_name(video_stem: &str, frame_index: u64, extension: &str) -> String {
    format!("{video_stem}_frame_{frame_index}.{extension}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_per_second() {
        let taken: Vec<u64> = (1..=90).filter(|&i| should_snapshot(i, 30.0, 1.0)).collect();
        assert_eq!(taken, vec![30, 60, 90]);
    }

    #[test]
    fn test_fractional_rate_truncates() {
        assert_eq!(snapshot_period(29.97, 2.0), Some(59));
        assert_eq!(snapshot_period(0.5, 1.0), Some(1));
    }

    #[test]
    fn test_degenerate_rate_never_snapshots() {
        assert!(!should_snapshot(30, 0.0, 1.0));
        assert!(!should_snapshot(30, f64::NAN, 1.0));
        assert!(!should_snapshot(30, 30.0, -1.0));
        assert!(!should_snapshot(0, 30.0, 1.0));
    }

    #[test]
    fn test_file_name() {
        assert_eq!(snapshot_file_name("clip", 60, "png"), "clip_frame_60.png");
    }
}
