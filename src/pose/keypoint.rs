use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The 18 anatomical parts produced by the keypoint network, in channel
/// order. The network's trailing background channel is not a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(usize)]
pub enum BodyPart {
    Nose = 0,
    Neck = 1,
    #[serde(rename = "RShoulder")]
    RightShoulder = 2,
    #[serde(rename = "RElbow")]
    RightElbow = 3,
    #[serde(rename = "RWrist")]
    RightWrist = 4,
    #[serde(rename = "LShoulder")]
    LeftShoulder = 5,
    #[serde(rename = "LElbow")]
    LeftElbow = 6,
    #[serde(rename = "LWrist")]
    LeftWrist = 7,
    #[serde(rename = "RHip")]
    RightHip = 8,
    #[serde(rename = "RKnee")]
    RightKnee = 9,
    #[serde(rename = "RAnkle")]
    RightAnkle = 10,
    #[serde(rename = "LHip")]
    LeftHip = 11,
    #[serde(rename = "LKnee")]
    LeftKnee = 12,
    #[serde(rename = "LAnkle")]
    LeftAnkle = 13,
    #[serde(rename = "REye")]
    RightEye = 14,
    #[serde(rename = "LEye")]
    LeftEye = 15,
    #[serde(rename = "REar")]
    RightEar = 16,
    #[serde(rename = "LEar")]
    LeftEar = 17,
}

impl BodyPart {
    pub const COUNT: usize = 18;

    pub const ALL: [BodyPart; Self::COUNT] = [
        Self::Nose,
        Self::Neck,
        Self::RightShoulder,
        Self::RightElbow,
        Self::RightWrist,
        Self::LeftShoulder,
        Self::LeftElbow,
        Self::LeftWrist,
        Self::RightHip,
        Self::RightKnee,
        Self::RightAnkle,
        Self::LeftHip,
        Self::LeftKnee,
        Self::LeftAnkle,
        Self::RightEye,
        Self::LeftEye,
        Self::RightEar,
        Self::LeftEar,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Short label drawn next to the keypoint.
    pub fn label(self) -> &'static str {
        match self {
            Self::Nose => "Nose",
            Self::Neck => "Neck",
            Self::RightShoulder => "RShoulder",
            Self::RightElbow => "RElbow",
            Self::RightWrist => "RWrist",
            Self::LeftShoulder => "LShoulder",
            Self::LeftElbow => "LElbow",
            Self::LeftWrist => "LWrist",
            Self::RightHip => "RHip",
            Self::RightKnee => "RKnee",
            Self::RightAnkle => "RAnkle",
            Self::LeftHip => "LHip",
            Self::LeftKnee => "LKnee",
            Self::LeftAnkle => "LAnkle",
            Self::RightEye => "REye",
            Self::LeftEye => "LEye",
            Self::RightEar => "REar",
            Self::LeftEar => "LEar",
        }
    }
}

impl fmt::Display for BodyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for BodyPart {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|part| part.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown body part `{s}`"))
    }
}

/// Bone topology: `(from, to)` pairs drawn by the skeleton renderer.
pub const POSE_PAIRS: [(BodyPart, BodyPart); 17] = [
    (BodyPart::Neck, BodyPart::RightShoulder),
    (BodyPart::Neck, BodyPart::LeftShoulder),
    (BodyPart::RightShoulder, BodyPart::RightElbow),
    (BodyPart::RightElbow, BodyPart::RightWrist),
    (BodyPart::LeftShoulder, BodyPart::LeftElbow),
    (BodyPart::LeftElbow, BodyPart::LeftWrist),
    (BodyPart::Neck, BodyPart::RightHip),
    (BodyPart::RightHip, BodyPart::RightKnee),
    (BodyPart::RightKnee, BodyPart::RightAnkle),
    (BodyPart::Neck, BodyPart::LeftHip),
    (BodyPart::LeftHip, BodyPart::LeftKnee),
    (BodyPart::LeftKnee, BodyPart::LeftAnkle),
    (BodyPart::Neck, BodyPart::Nose),
    (BodyPart::Nose, BodyPart::RightEye),
    (BodyPart::RightEye, BodyPart::RightEar),
    (BodyPart::Nose, BodyPart::LeftEye),
    (BodyPart::LeftEye, BodyPart::LeftEar),
];

/// A located body part in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub part: BodyPart,
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(part: BodyPart, x: f32, y: f32, confidence: f32) -> Self {
        Self {
            part,
            x,
            y,
            confidence,
        }
    }

    pub fn pixel(&self) -> (i32, i32) {
        (self.x as i32, self.y as i32)
    }
}

/// One person's keypoints for one frame; a slot is `None` when the part
/// was not found with enough confidence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pose {
    keypoints: [Option<Keypoint>; BodyPart::COUNT],
}

impl Pose {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a pose from keypoints, keeping the later one on duplicate parts.
    pub fn from_keypoints<I: IntoIterator<Item = Keypoint>>(keypoints: I) -> Self {
        let mut pose = Self::new();
        for kp in keypoints {
            pose.set(kp);
        }
        pose
    }

    pub fn set(&mut self, keypoint: Keypoint) {
        self.keypoints[keypoint.part.index()] = Some(keypoint);
    }

    pub fn get(&self, part: BodyPart) -> Option<&Keypoint> {
        self.keypoints[part.index()].as_ref()
    }

    /// Present keypoints in part order.
    pub fn present(&self) -> impl Iterator<Item = &Keypoint> {
        self.keypoints.iter().flatten()
    }

    /// Drops keypoints whose confidence is not above `threshold`.
    pub fn retain_confident(&mut self, threshold: f32) {
        for slot in &mut self.keypoints {
            if slot.is_some_and(|kp| kp.confidence <= threshold) {
                *slot = None;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.iter().all(Option::is_none)
    }

    pub fn len(&self) -> usize {
        self.present().count()
    }

    /// Mean confidence over present keypoints, 0.0 for an empty pose.
    pub fn mean_confidence(&self) -> f32 {
        let n = self.len();
        if n == 0 {
            return 0.0;
        }
        self.present().map(|kp| kp.confidence).sum::<f32>() / n as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_indices_match_channel_order() {
        for (i, part) in BodyPart::ALL.iter().enumerate() {
            assert_eq!(part.index(), i);
            assert_eq!(BodyPart::from_index(i), Some(*part));
        }
        assert_eq!(BodyPart::from_index(18), None);
    }

    #[test]
    fn test_part_from_str() {
        assert_eq!("RShoulder".parse(), Ok(BodyPart::RightShoulder));
        assert_eq!("nose".parse(), Ok(BodyPart::Nose));
        assert!("Background".parse::<BodyPart>().is_err());
    }

    #[test]
    fn test_pose_pairs_reference_distinct_parts() {
        for (from, to) in POSE_PAIRS {
            assert_ne!(from, to);
        }
    }

    #[test]
    fn test_pose_accessors() {
        let mut pose = Pose::from_keypoints([
            Keypoint::new(BodyPart::Nose, 10.0, 20.0, 0.9),
            Keypoint::new(BodyPart::Neck, 10.0, 40.0, 0.1),
        ]);
        assert_eq!(pose.len(), 2);
        assert_eq!(pose.get(BodyPart::Nose).map(|k| k.pixel()), Some((10, 20)));
        assert!((pose.mean_confidence() - 0.5).abs() < 1e-6);

        pose.retain_confident(0.2);
        assert_eq!(pose.len(), 1);
        assert!(pose.get(BodyPart::Neck).is_none());
        assert!(!pose.is_empty());
    }
}
