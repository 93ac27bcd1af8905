// src/joint_angles.rs - Clinical joint angles from a landmark frame (ISB-style frames)
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::landmarks::{LandmarkIndex, PoseFrame, Side};
use crate::thresholds::{BodyRegion, ErrorType};
use crate::vector_math::{
    angle_between_vectors, cross_product, dot_product, magnitude, midpoint_3d, normalize,
    project_vector_onto_plane, subtract_3d, Vector3D,
};

pub const DEFAULT_MIN_VISIBILITY: f64 = 0.5;

// Below this a segment has no usable direction
const DEGENERATE_EPSILON: f64 = 1e-9;

// Fraction of a segment's length that must lie in the measuring plane
// (about 0.06° off the plane normal)
const MIN_IN_PLANE_FRACTION: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Movement {
    ShoulderFlexion,
    ShoulderAbduction,
    ShoulderRotation,
    ElbowFlexion,
    KneeFlexion,
}

impl Movement {
    pub const ALL: [Movement; 5] = [
        Movement::ShoulderFlexion,
        Movement::ShoulderAbduction,
        Movement::ShoulderRotation,
        Movement::ElbowFlexion,
        Movement::KneeFlexion,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Movement::ShoulderFlexion => "shoulder_flexion",
            Movement::ShoulderAbduction => "shoulder_abduction",
            Movement::ShoulderRotation => "shoulder_rotation",
            Movement::ElbowFlexion => "elbow_flexion",
            Movement::KneeFlexion => "knee_flexion",
        }
    }

    /// Normal active range of motion in degrees.
    pub fn target_angle(self) -> f64 {
        match self {
            Movement::ShoulderFlexion => 180.0,
            Movement::ShoulderAbduction => 180.0,
            Movement::ShoulderRotation => 90.0,
            Movement::ElbowFlexion => 150.0,
            Movement::KneeFlexion => 135.0,
        }
    }

    pub fn region(self) -> BodyRegion {
        match self {
            Movement::ShoulderFlexion | Movement::ShoulderAbduction | Movement::ShoulderRotation => {
                BodyRegion::Shoulder
            }
            Movement::ElbowFlexion => BodyRegion::Elbow,
            Movement::KneeFlexion => BodyRegion::Knee,
        }
    }

    /// Compensations watched while this movement is performed.
    pub fn compensation_types(self) -> &'static [ErrorType] {
        match self {
            Movement::ShoulderFlexion | Movement::ShoulderAbduction => &[
                ErrorType::ShoulderHiking,
                ErrorType::TrunkLean,
                ErrorType::ElbowFlexionDrift,
            ],
            // elbow is bent on purpose during rotation
            Movement::ShoulderRotation => &[ErrorType::ShoulderHiking, ErrorType::TrunkLean],
            Movement::ElbowFlexion => &[ErrorType::ShoulderCompensation],
            Movement::KneeFlexion => &[ErrorType::KneeValgus, ErrorType::TrunkFlexion],
        }
    }
}

impl fmt::Display for Movement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Movement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_ascii_lowercase().replace('-', "_");
        Movement::ALL
            .into_iter()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| format!("unknown movement '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClinicalGrade {
    Excellent,
    Good,
    Fair,
    Limited,
}

impl ClinicalGrade {
    pub fn from_percent(percent_of_target: f64) -> Self {
        if percent_of_target >= 90.0 {
            ClinicalGrade::Excellent
        } else if percent_of_target >= 70.0 {
            ClinicalGrade::Good
        } else if percent_of_target >= 50.0 {
            ClinicalGrade::Fair
        } else {
            ClinicalGrade::Limited
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClinicalGrade::Excellent => "excellent",
            ClinicalGrade::Good => "good",
            ClinicalGrade::Fair => "fair",
            ClinicalGrade::Limited => "limited",
        }
    }
}

/// Raw deviation for one compensation pattern, in the error type's unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Compensation {
    pub error_type: ErrorType,
    pub deviation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointMeasurement {
    pub joint: String,
    pub angle: f64,
    pub target_angle: f64,
    pub percent_of_target: f64,
    pub clinical_grade: ClinicalGrade,
    pub compensations: Vec<Compensation>,
}

impl JointMeasurement {
    pub fn new(joint: String, angle: f64, target_angle: f64, compensations: Vec<Compensation>) -> Self {
        let percent_of_target = angle / target_angle * 100.0;
        Self {
            joint,
            angle,
            target_angle,
            percent_of_target,
            clinical_grade: ClinicalGrade::from_percent(percent_of_target),
            compensations,
        }
    }
}

/// One movement measured on one frame. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalJointMeasurement {
    pub movement: Movement,
    pub side: Side,
    pub timestamp_ms: u64,
    pub primary_joint: JointMeasurement,
    pub secondary_joints: Vec<JointMeasurement>,
}

/// Thorax axes built from both shoulders and both hips.
#[derive(Debug, Clone, Copy)]
struct TrunkFrame {
    /// hips towards shoulders
    up: Vector3D,
    /// anatomical left towards right, orthogonal to `up`
    mediolateral: Vector3D,
    anterior: Vector3D,
}

impl TrunkFrame {
    fn from_points(
        left_shoulder: &Vector3D,
        right_shoulder: &Vector3D,
        left_hip: &Vector3D,
        right_hip: &Vector3D,
    ) -> Option<Self> {
        let mid_shoulder = midpoint_3d(left_shoulder, right_shoulder);
        let mid_hip = midpoint_3d(left_hip, right_hip);
        let torso = subtract_3d(&mid_shoulder, &mid_hip);
        if is_degenerate(&torso) {
            return None;
        }
        let up = normalize(&torso);

        // Right minus left regardless of the measured side, so mirroring stays an isometry
        let across = subtract_3d(right_shoulder, left_shoulder);
        let mediolateral = in_plane_direction(&across, &up)?;

        let anterior = normalize(&cross_product(&up, &mediolateral));
        Some(Self {
            up,
            mediolateral,
            anterior,
        })
    }

    fn sagittal_normal(&self) -> Vector3D {
        self.mediolateral
    }

    fn frontal_normal(&self) -> Vector3D {
        self.anterior
    }
}

fn is_degenerate(v: &Vector3D) -> bool {
    magnitude(v) < DEGENERATE_EPSILON
}

/// Unit direction of `v` within the plane of `normal`, or `None` when `v`
/// runs (almost) along the normal and the projection is rounding noise.
fn in_plane_direction(v: &Vector3D, normal: &Vector3D) -> Option<Vector3D> {
    let length = magnitude(v);
    let off_normal = magnitude(&(v - normal * dot_product(v, normal)));
    if length < DEGENERATE_EPSILON || off_normal < MIN_IN_PLANE_FRACTION * length {
        return None;
    }
    Some(project_vector_onto_plane(v, normal))
}

/// Vertical of the camera image, pointing up (landmark y grows downwards).
fn image_up() -> Vector3D {
    Vector3D::new(0.0, -1.0, 0.0)
}

pub struct JointAngleCalculator {
    min_visibility: f64,
}

impl Default for JointAngleCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_VISIBILITY)
    }
}

impl JointAngleCalculator {
    pub fn new(min_visibility: f64) -> Self {
        Self { min_visibility }
    }

    pub fn min_visibility(&self) -> f64 {
        self.min_visibility
    }

    /// Measures `movement` on `side`. Returns `None` when a required landmark
    /// is missing or below the visibility floor, or the geometry is degenerate.
    pub fn measure(
        &self,
        frame: &PoseFrame,
        movement: Movement,
        side: Side,
    ) -> Option<ClinicalJointMeasurement> {
        let result = match movement {
            Movement::ShoulderFlexion => self.shoulder_flexion(frame, side),
            Movement::ShoulderAbduction => self.shoulder_abduction(frame, side),
            Movement::ShoulderRotation => self.shoulder_rotation(frame, side),
            Movement::ElbowFlexion => self.elbow_flexion(frame, side),
            Movement::KneeFlexion => self.knee_flexion(frame, side),
        };

        if result.is_none() {
            debug!(movement = movement.as_str(), side = side.as_str(), ts = frame.timestamp_ms, "no measurement this frame");
        }
        result
    }

    pub fn shoulder_flexion(&self, frame: &PoseFrame, side: Side) -> Option<ClinicalJointMeasurement> {
        self.shoulder_plane_angle(frame, side, Movement::ShoulderFlexion)
    }

    pub fn shoulder_abduction(&self, frame: &PoseFrame, side: Side) -> Option<ClinicalJointMeasurement> {
        self.shoulder_plane_angle(frame, side, Movement::ShoulderAbduction)
    }

    /// Forearm direction around the humeral long axis, measured from the
    /// trunk's anterior axis. 0 = forearm pointing forward.
    pub fn shoulder_rotation(&self, frame: &PoseFrame, side: Side) -> Option<ClinicalJointMeasurement> {
        let trunk = self.trunk_frame(frame)?;
        let shoulder = self.point(frame, side.shoulder())?;
        let elbow = self.point(frame, side.elbow())?;
        let wrist = self.point(frame, side.wrist())?;

        let humerus = subtract_3d(&elbow, &shoulder);
        let forearm = subtract_3d(&wrist, &elbow);
        if is_degenerate(&humerus) {
            return None;
        }
        let axis = normalize(&humerus);

        // Straight arm: forearm along the humerus, rotation undefined
        let forearm_dir = in_plane_direction(&forearm, &axis)?;
        let reference = in_plane_direction(&trunk.anterior, &axis)?;

        let angle = angle_between_vectors(&forearm_dir, &reference);
        let compensations = self.shoulder_compensations(frame, side, &trunk, Movement::ShoulderRotation, &humerus, Some(&forearm))?;
        let secondary = vec![elbow_joint(side, &humerus, &forearm)];

        Some(build_measurement(frame, Movement::ShoulderRotation, side, side.shoulder(), angle, compensations, secondary))
    }

    /// 0 = arm straight, grows as the elbow bends.
    pub fn elbow_flexion(&self, frame: &PoseFrame, side: Side) -> Option<ClinicalJointMeasurement> {
        let shoulder = self.point(frame, side.shoulder())?;
        let elbow = self.point(frame, side.elbow())?;
        let wrist = self.point(frame, side.wrist())?;

        let humerus = subtract_3d(&elbow, &shoulder);
        let forearm = subtract_3d(&wrist, &elbow);
        if is_degenerate(&humerus) || is_degenerate(&forearm) {
            return None;
        }

        let angle = angle_between_vectors(&humerus, &forearm);

        // Humerus should stay alongside the trunk; only checked when the trunk is visible
        let mut compensations = Vec::new();
        if let Some(trunk) = self.trunk_frame(frame) {
            compensations.push(Compensation {
                error_type: ErrorType::ShoulderCompensation,
                deviation: angle_between_vectors(&humerus, &-trunk.up),
            });
        }

        Some(build_measurement(frame, Movement::ElbowFlexion, side, side.elbow(), angle, compensations, Vec::new()))
    }

    /// 0 = knee straight, grows as the knee bends.
    pub fn knee_flexion(&self, frame: &PoseFrame, side: Side) -> Option<ClinicalJointMeasurement> {
        let hip = self.point(frame, side.hip())?;
        let knee = self.point(frame, side.knee())?;
        let ankle = self.point(frame, side.ankle())?;

        let thigh = subtract_3d(&knee, &hip);
        let shank = subtract_3d(&ankle, &knee);
        if is_degenerate(&thigh) || is_degenerate(&shank) {
            return None;
        }

        let angle = angle_between_vectors(&thigh, &shank);

        let mut compensations = Vec::new();
        if let Some(other_hip) = self.point(frame, side.opposite().hip()) {
            compensations.push(Compensation {
                error_type: ErrorType::KneeValgus,
                deviation: knee_valgus_percent(&hip, &knee, &ankle, &other_hip),
            });
        }
        if let Some(trunk) = self.trunk_frame(frame) {
            compensations.push(Compensation {
                error_type: ErrorType::TrunkFlexion,
                deviation: angle_between_vectors(&trunk.up, &image_up()),
            });
        }

        Some(build_measurement(frame, Movement::KneeFlexion, side, side.knee(), angle, compensations, Vec::new()))
    }

    fn shoulder_plane_angle(
        &self,
        frame: &PoseFrame,
        side: Side,
        movement: Movement,
    ) -> Option<ClinicalJointMeasurement> {
        let trunk = self.trunk_frame(frame)?;
        let shoulder = self.point(frame, side.shoulder())?;
        let elbow = self.point(frame, side.elbow())?;

        let humerus = subtract_3d(&elbow, &shoulder);
        let plane_normal = match movement {
            Movement::ShoulderAbduction => trunk.frontal_normal(),
            _ => trunk.sagittal_normal(),
        };

        let projected = in_plane_direction(&humerus, &plane_normal)?;

        // Arm hanging at the side is 0°
        let angle = angle_between_vectors(&projected, &-trunk.up);

        let forearm = self
            .point(frame, side.wrist())
            .map(|wrist| subtract_3d(&wrist, &elbow));
        let compensations = self.shoulder_compensations(frame, side, &trunk, movement, &humerus, forearm.as_ref())?;
        let secondary = forearm
            .iter()
            .filter(|f| !is_degenerate(f))
            .map(|f| elbow_joint(side, &humerus, f))
            .collect();

        Some(build_measurement(frame, movement, side, side.shoulder(), angle, compensations, secondary))
    }

    fn shoulder_compensations(
        &self,
        frame: &PoseFrame,
        side: Side,
        trunk: &TrunkFrame,
        movement: Movement,
        humerus: &Vector3D,
        forearm: Option<&Vector3D>,
    ) -> Option<Vec<Compensation>> {
        let shoulder = self.point(frame, side.shoulder())?;
        let other_shoulder = self.point(frame, side.opposite().shoulder())?;

        // Positive when the working shoulder rides above the other one (metres → cm)
        let rise = dot_product(&subtract_3d(&shoulder, &other_shoulder), &trunk.up);
        let mut compensations = vec![
            Compensation {
                error_type: ErrorType::ShoulderHiking,
                deviation: (rise * 100.0).max(0.0),
            },
            Compensation {
                error_type: ErrorType::TrunkLean,
                deviation: angle_between_vectors(&trunk.up, &image_up()),
            },
        ];

        if movement != Movement::ShoulderRotation {
            if let Some(forearm) = forearm.filter(|f| !is_degenerate(f)) {
                compensations.push(Compensation {
                    error_type: ErrorType::ElbowFlexionDrift,
                    deviation: angle_between_vectors(humerus, forearm),
                });
            }
        }

        Some(compensations)
    }

    fn trunk_frame(&self, frame: &PoseFrame) -> Option<TrunkFrame> {
        let left_shoulder = self.point(frame, LandmarkIndex::LeftShoulder)?;
        let right_shoulder = self.point(frame, LandmarkIndex::RightShoulder)?;
        let left_hip = self.point(frame, LandmarkIndex::LeftHip)?;
        let right_hip = self.point(frame, LandmarkIndex::RightHip)?;
        TrunkFrame::from_points(&left_shoulder, &right_shoulder, &left_hip, &right_hip)
    }

    fn point(&self, frame: &PoseFrame, index: LandmarkIndex) -> Option<Vector3D> {
        frame.visible(index, self.min_visibility)
    }
}

fn elbow_joint(side: Side, humerus: &Vector3D, forearm: &Vector3D) -> JointMeasurement {
    JointMeasurement::new(
        side.elbow().name().to_string(),
        angle_between_vectors(humerus, forearm),
        Movement::ElbowFlexion.target_angle(),
        Vec::new(),
    )
}

/// Medial drift of the knee off the hip–ankle line, as a percentage of thigh length.
fn knee_valgus_percent(hip: &Vector3D, knee: &Vector3D, ankle: &Vector3D, other_hip: &Vector3D) -> f64 {
    let hip_to_ankle = subtract_3d(ankle, hip);
    let thigh_length = magnitude(&subtract_3d(knee, hip));
    if is_degenerate(&hip_to_ankle) || thigh_length < DEGENERATE_EPSILON {
        return 0.0;
    }
    let leg_axis = normalize(&hip_to_ankle);

    let hip_to_knee = subtract_3d(knee, hip);
    let offset = hip_to_knee - leg_axis * dot_product(&hip_to_knee, &leg_axis);

    let medial = match in_plane_direction(&subtract_3d(other_hip, hip), &leg_axis) {
        Some(medial) => medial,
        None => return 0.0,
    };

    (dot_product(&offset, &medial) / thigh_length * 100.0).max(0.0)
}

fn build_measurement(
    frame: &PoseFrame,
    movement: Movement,
    side: Side,
    joint: LandmarkIndex,
    angle: f64,
    compensations: Vec<Compensation>,
    secondary_joints: Vec<JointMeasurement>,
) -> ClinicalJointMeasurement {
    ClinicalJointMeasurement {
        movement,
        side,
        timestamp_ms: frame.timestamp_ms,
        primary_joint: JointMeasurement::new(
            joint.name().to_string(),
            angle,
            movement.target_angle(),
            compensations,
        ),
        secondary_joints,
    }
}
