// src/pose_source.rs - Where landmark frames come from
//
// The estimator itself lives outside this crate. Sources are picked when the
// session is built: a synthetic generator for demos/tests, or a CSV recording.
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv::{Reader, Writer};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::joint_angles::Movement;
use crate::landmarks::{LandmarkIndex, PoseFrame, PoseLandmark, Side};
use crate::vector_math::Vector3D;

pub trait PoseSource {
    /// Next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<PoseFrame>>;

    fn name(&self) -> &str;
}

const UPPER_ARM_M: f64 = 0.28;
const FOREARM_M: f64 = 0.26;
const SHANK_M: f64 = 0.45;

/// Standing subject facing the camera performing one movement on a loop.
pub struct SyntheticPoseSource {
    movement: Movement,
    side: Side,
    frame_interval_ms: u64,
    total_frames: usize,
    emitted: usize,
    amplitude_deg: f64,
    period_ms: f64,
    shoulder_hike_m: f64,
    visibility: f64,
}

impl SyntheticPoseSource {
    pub fn new(movement: Movement, side: Side, total_frames: usize) -> Self {
        Self {
            movement,
            side,
            frame_interval_ms: 33,
            total_frames,
            emitted: 0,
            amplitude_deg: movement.target_angle() * 0.8,
            period_ms: 3000.0,
            shoulder_hike_m: 0.0,
            visibility: 0.9,
        }
    }

    pub fn with_frame_interval(mut self, ms: u64) -> Self {
        self.frame_interval_ms = ms.max(1);
        self
    }

    pub fn with_amplitude(mut self, degrees: f64) -> Self {
        self.amplitude_deg = degrees;
        self
    }

    /// Raises the working shoulder by a fixed amount to simulate hiking.
    pub fn with_shoulder_hike(mut self, metres: f64) -> Self {
        self.shoulder_hike_m = metres;
        self
    }

    pub fn with_visibility(mut self, visibility: f64) -> Self {
        self.visibility = visibility;
        self
    }

    fn angle_at(&self, t_ms: f64) -> f64 {
        let phase = 2.0 * std::f64::consts::PI * t_ms / self.period_ms;
        (self.amplitude_deg * (1.0 - phase.cos()) / 2.0).to_radians()
    }

    fn build_frame(&self, timestamp_ms: u64) -> PoseFrame {
        let theta = self.angle_at(timestamp_ms as f64);
        let mut points: BTreeMap<LandmarkIndex, Vector3D> = standing_pose();

        // Subject's left is image right
        let outward = match self.side {
            Side::Left => 1.0,
            Side::Right => -1.0,
        };

        let shoulder = points[&self.side.shoulder()] - Vector3D::new(0.0, self.shoulder_hike_m, 0.0);
        points.insert(self.side.shoulder(), shoulder);

        match self.movement {
            Movement::ShoulderFlexion | Movement::ShoulderAbduction => {
                let dir = if self.movement == Movement::ShoulderFlexion {
                    Vector3D::new(0.0, theta.cos(), -theta.sin())
                } else {
                    Vector3D::new(outward * theta.sin(), theta.cos(), 0.0)
                };
                let elbow = shoulder + dir * UPPER_ARM_M;
                points.insert(self.side.elbow(), elbow);
                points.insert(self.side.wrist(), elbow + dir * FOREARM_M);
            }
            Movement::ShoulderRotation => {
                let elbow = shoulder + Vector3D::new(0.0, UPPER_ARM_M, 0.0);
                let forearm = Vector3D::new(outward * theta.sin(), 0.0, -theta.cos());
                points.insert(self.side.elbow(), elbow);
                points.insert(self.side.wrist(), elbow + forearm * FOREARM_M);
            }
            Movement::ElbowFlexion => {
                let elbow = shoulder + Vector3D::new(0.0, UPPER_ARM_M, 0.0);
                let forearm = Vector3D::new(0.0, theta.cos(), -theta.sin());
                points.insert(self.side.elbow(), elbow);
                points.insert(self.side.wrist(), elbow + forearm * FOREARM_M);
            }
            Movement::KneeFlexion => {
                let knee = points[&self.side.knee()];
                let shank = Vector3D::new(0.0, theta.cos(), theta.sin());
                points.insert(self.side.ankle(), knee + shank * SHANK_M);
            }
        }

        let landmarks = LandmarkIndex::ALL
            .iter()
            .map(|&idx| {
                let p = points.get(&idx).copied().unwrap_or_else(|| Vector3D::new(0.5, 0.1, 0.0));
                PoseLandmark::new(idx, p.x, p.y, p.z, self.visibility)
            })
            .collect();

        PoseFrame::new(timestamp_ms, landmarks)
    }
}

fn standing_pose() -> BTreeMap<LandmarkIndex, Vector3D> {
    use LandmarkIndex::*;
    [
        (Nose, [0.50, 0.12, -0.05]),
        (LeftEar, [0.56, 0.12, 0.0]),
        (RightEar, [0.44, 0.12, 0.0]),
        (LeftShoulder, [0.65, 0.30, 0.0]),
        (RightShoulder, [0.35, 0.30, 0.0]),
        (LeftElbow, [0.65, 0.58, 0.0]),
        (RightElbow, [0.35, 0.58, 0.0]),
        (LeftWrist, [0.65, 0.84, 0.0]),
        (RightWrist, [0.35, 0.84, 0.0]),
        (LeftHip, [0.60, 0.80, 0.0]),
        (RightHip, [0.40, 0.80, 0.0]),
        (LeftKnee, [0.60, 1.25, 0.0]),
        (RightKnee, [0.40, 1.25, 0.0]),
        (LeftAnkle, [0.60, 1.70, 0.0]),
        (RightAnkle, [0.40, 1.70, 0.0]),
        (LeftHeel, [0.60, 1.74, 0.03]),
        (RightHeel, [0.40, 1.74, 0.03]),
        (LeftFootIndex, [0.61, 1.76, -0.12]),
        (RightFootIndex, [0.39, 1.76, -0.12]),
    ]
    .into_iter()
    .map(|(idx, p)| (idx, Vector3D::new(p[0], p[1], p[2])))
    .collect()
}

impl PoseSource for SyntheticPoseSource {
    fn next_frame(&mut self) -> Result<Option<PoseFrame>> {
        if self.emitted >= self.total_frames {
            return Ok(None);
        }
        let timestamp_ms = self.emitted as u64 * self.frame_interval_ms;
        self.emitted += 1;
        Ok(Some(self.build_frame(timestamp_ms)))
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

/// One landmark of one frame in a recording file.
#[derive(Debug, Serialize, Deserialize)]
struct LandmarkRecord {
    timestamp_ms: u64,
    index: usize,
    x: f64,
    y: f64,
    z: f64,
    visibility: f64,
}

/// Replays frames from a CSV recording (`timestamp_ms,index,x,y,z,visibility`).
pub struct RecordedPoseSource {
    path: PathBuf,
    frames: std::vec::IntoIter<PoseFrame>,
}

impl RecordedPoseSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .with_context(|| format!("Cannot open recording {}", path.display()))?;
        let mut reader = Reader::from_reader(file);

        let mut grouped: BTreeMap<u64, Vec<PoseLandmark>> = BTreeMap::new();
        for (row, record) in reader.deserialize::<LandmarkRecord>().enumerate() {
            let record = record.with_context(|| format!("Malformed row {} in {}", row + 1, path.display()))?;
            let Some(idx) = LandmarkIndex::from_index(record.index) else {
                warn!(row = row + 1, index = record.index, "skipping unknown landmark index");
                continue;
            };
            grouped
                .entry(record.timestamp_ms)
                .or_default()
                .push(PoseLandmark::new(idx, record.x, record.y, record.z, record.visibility));
        }

        let frames: Vec<PoseFrame> = grouped
            .into_iter()
            .map(|(ts, mut landmarks)| {
                landmarks.sort_by_key(|lm| lm.index);
                PoseFrame::new(ts, landmarks)
            })
            .collect();

        info!(frames = frames.len(), path = %path.display(), "loaded pose recording");
        Ok(Self {
            path,
            frames: frames.into_iter(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PoseSource for RecordedPoseSource {
    fn next_frame(&mut self) -> Result<Option<PoseFrame>> {
        Ok(self.frames.next())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Writes frames in the layout `RecordedPoseSource` reads.
pub fn write_recording(path: impl AsRef<Path>, frames: &[PoseFrame]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = Writer::from_path(path)
        .with_context(|| format!("Cannot create recording {}", path.display()))?;
    for frame in frames {
        for lm in &frame.landmarks {
            writer.serialize(LandmarkRecord {
                timestamp_ms: frame.timestamp_ms,
                index: lm.index,
                x: lm.x,
                y: lm.y,
                z: lm.z,
                visibility: lm.visibility,
            })?;
        }
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::joint_angles::JointAngleCalculator;
    use approx::assert_abs_diff_eq;

    fn drain(source: &mut dyn PoseSource) -> Vec<PoseFrame> {
        let mut frames = Vec::new();
        while let Some(frame) = source.next_frame().unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_synthetic_frame_count_and_timing() {
        let mut source = SyntheticPoseSource::new(Movement::ElbowFlexion, Side::Left, 5).with_frame_interval(50);
        let frames = drain(&mut source);

        assert_eq!(frames.len(), 5);
        assert_eq!(frames[4].timestamp_ms, 200);
        assert!(frames.iter().all(|f| f.landmarks.len() == LandmarkIndex::COUNT));
        assert_eq!(source.name(), "synthetic");
    }

    #[test]
    fn test_synthetic_reaches_amplitude() {
        let calc = JointAngleCalculator::default();
        for movement in Movement::ALL {
            for side in [Side::Left, Side::Right] {
                let source = SyntheticPoseSource::new(movement, side, 1).with_amplitude(60.0);
                // half period is the peak of the cosine ramp
                let frame = source.build_frame(1500);
                let m = calc.measure(&frame, movement, side).unwrap();
                assert_abs_diff_eq!(m.primary_joint.angle, 60.0, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_recording_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.csv");

        let mut synthetic = SyntheticPoseSource::new(Movement::KneeFlexion, Side::Right, 4);
        let frames = drain(&mut synthetic);
        write_recording(&path, &frames).unwrap();

        let mut recorded = RecordedPoseSource::open(&path).unwrap();
        let replayed = drain(&mut recorded);

        assert_eq!(replayed.len(), frames.len());
        for (a, b) in frames.iter().zip(&replayed) {
            assert_eq!(a.timestamp_ms, b.timestamp_ms);
            assert_eq!(a.landmarks.len(), b.landmarks.len());
            for (la, lb) in a.landmarks.iter().zip(&b.landmarks) {
                assert_eq!(la.name, lb.name);
                assert_abs_diff_eq!(la.x, lb.x, epsilon = 1e-12);
                assert_abs_diff_eq!(la.z, lb.z, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_recording_skips_unknown_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("odd.csv");
        std::fs::write(
            &path,
            "timestamp_ms,index,x,y,z,visibility\n0,11,0.6,0.3,0.0,0.9\n0,99,0.1,0.1,0.1,0.9\n33,11,0.6,0.3,0.0,0.9\n",
        )
        .unwrap();

        let mut source = RecordedPoseSource::open(&path).unwrap();
        let frames = drain(&mut source);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].landmarks.len(), 1);
        assert!(frames[0].landmark(LandmarkIndex::LeftShoulder).is_some());
    }

    #[test]
    fn test_missing_recording_is_error() {
        assert!(RecordedPoseSource::open("/nonexistent/recording.csv").is_err());
    }
}
