// src/landmarks.rs - Pose landmark types consumed from the pose estimator
use serde::{Deserialize, Serialize};

use crate::vector_math::{landmark_vector, Vector3D};

/// BlazePose 33-point topology. Discriminants match the estimator's output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(usize)]
pub enum LandmarkIndex {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl LandmarkIndex {
    pub const COUNT: usize = 33;

    pub const ALL: [LandmarkIndex; Self::COUNT] = [
        Self::Nose,
        Self::LeftEyeInner,
        Self::LeftEye,
        Self::LeftEyeOuter,
        Self::RightEyeInner,
        Self::RightEye,
        Self::RightEyeOuter,
        Self::LeftEar,
        Self::RightEar,
        Self::MouthLeft,
        Self::MouthRight,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftPinky,
        Self::RightPinky,
        Self::LeftIndex,
        Self::RightIndex,
        Self::LeftThumb,
        Self::RightThumb,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
        Self::LeftHeel,
        Self::RightHeel,
        Self::LeftFootIndex,
        Self::RightFootIndex,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftEyeInner => "left_eye_inner",
            Self::LeftEye => "left_eye",
            Self::LeftEyeOuter => "left_eye_outer",
            Self::RightEyeInner => "right_eye_inner",
            Self::RightEye => "right_eye",
            Self::RightEyeOuter => "right_eye_outer",
            Self::LeftEar => "left_ear",
            Self::RightEar => "right_ear",
            Self::MouthLeft => "mouth_left",
            Self::MouthRight => "mouth_right",
            Self::LeftShoulder => "left_shoulder",
            Self::RightShoulder => "right_shoulder",
            Self::LeftElbow => "left_elbow",
            Self::RightElbow => "right_elbow",
            Self::LeftWrist => "left_wrist",
            Self::RightWrist => "right_wrist",
            Self::LeftPinky => "left_pinky",
            Self::RightPinky => "right_pinky",
            Self::LeftIndex => "left_index",
            Self::RightIndex => "right_index",
            Self::LeftThumb => "left_thumb",
            Self::RightThumb => "right_thumb",
            Self::LeftHip => "left_hip",
            Self::RightHip => "right_hip",
            Self::LeftKnee => "left_knee",
            Self::RightKnee => "right_knee",
            Self::LeftAnkle => "left_ankle",
            Self::RightAnkle => "right_ankle",
            Self::LeftHeel => "left_heel",
            Self::RightHeel => "right_heel",
            Self::LeftFootIndex => "left_foot_index",
            Self::RightFootIndex => "right_foot_index",
        }
    }

    /// The same keypoint on the other side of the body. Midline points map to themselves.
    pub fn mirror(self) -> Self {
        let idx = self.index();
        let mirrored = match idx {
            0 => 0,
            1..=3 => idx + 3,
            4..=6 => idx - 3,
            // ears, mouth and every limb pair alternate left/right from 7 onwards
            _ if idx % 2 == 1 => idx + 1,
            _ => idx - 1,
        };
        Self::ALL[mirrored]
    }
}

/// Side of the body a measurement refers to. Always supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }

    pub fn shoulder(self) -> LandmarkIndex {
        match self {
            Side::Left => LandmarkIndex::LeftShoulder,
            Side::Right => LandmarkIndex::RightShoulder,
        }
    }

    pub fn elbow(self) -> LandmarkIndex {
        match self {
            Side::Left => LandmarkIndex::LeftElbow,
            Side::Right => LandmarkIndex::RightElbow,
        }
    }

    pub fn wrist(self) -> LandmarkIndex {
        match self {
            Side::Left => LandmarkIndex::LeftWrist,
            Side::Right => LandmarkIndex::RightWrist,
        }
    }

    pub fn hip(self) -> LandmarkIndex {
        match self {
            Side::Left => LandmarkIndex::LeftHip,
            Side::Right => LandmarkIndex::RightHip,
        }
    }

    pub fn knee(self) -> LandmarkIndex {
        match self {
            Side::Left => LandmarkIndex::LeftKnee,
            Side::Right => LandmarkIndex::RightKnee,
        }
    }

    pub fn ankle(self) -> LandmarkIndex {
        match self {
            Side::Left => LandmarkIndex::LeftAnkle,
            Side::Right => LandmarkIndex::RightAnkle,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" | "l" => Ok(Side::Left),
            "right" | "r" => Ok(Side::Right),
            other => Err(format!("unknown side '{}'", other)),
        }
    }
}

/// A detected keypoint. Coordinates follow the estimator's convention:
/// x to the subject's image right, y downwards, z towards the camera negative.
/// Distance-based deviations assume world coordinates in metres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseLandmark {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub visibility: f64,
    pub index: usize,
    pub name: String,
}

impl PoseLandmark {
    pub fn new(index: LandmarkIndex, x: f64, y: f64, z: f64, visibility: f64) -> Self {
        Self {
            x,
            y,
            z,
            visibility,
            index: index.index(),
            name: index.name().to_string(),
        }
    }

    pub fn is_visible(&self, floor: f64) -> bool {
        self.visibility >= floor && self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn position(&self) -> Vector3D {
        landmark_vector(self)
    }
}

/// One frame of landmarks from the pose estimator, ordered by `LandmarkIndex`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseFrame {
    pub timestamp_ms: u64,
    pub landmarks: Vec<PoseLandmark>,
}

impl PoseFrame {
    pub fn new(timestamp_ms: u64, landmarks: Vec<PoseLandmark>) -> Self {
        Self {
            timestamp_ms,
            landmarks,
        }
    }

    pub fn landmark(&self, index: LandmarkIndex) -> Option<&PoseLandmark> {
        self.landmarks
            .get(index.index())
            .filter(|lm| lm.index == index.index())
            .or_else(|| self.landmarks.iter().find(|lm| lm.index == index.index()))
    }

    /// Position of a landmark if present and at or above the visibility floor.
    pub fn visible(&self, index: LandmarkIndex, floor: f64) -> Option<Vector3D> {
        self.landmark(index)
            .filter(|lm| lm.is_visible(floor))
            .map(PoseLandmark::position)
    }

    /// Horizontally mirrored copy: x becomes 1 - x and left/right keypoints swap.
    pub fn mirrored(&self) -> Self {
        let mut landmarks: Vec<PoseLandmark> = self
            .landmarks
            .iter()
            .filter_map(|lm| {
                let target = LandmarkIndex::from_index(lm.index)?.mirror();
                Some(PoseLandmark::new(target, 1.0 - lm.x, lm.y, lm.z, lm.visibility))
            })
            .collect();
        landmarks.sort_by_key(|lm| lm.index);

        Self {
            timestamp_ms: self.timestamp_ms,
            landmarks,
        }
    }
}
