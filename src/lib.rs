//! Biomechanical measurement core for a physiotherapy assistant.
//!
//! Landmark frames from a pose estimator go through:
//!
//! 1. [`joint_angles`] - clinical joint angles and raw compensation deviations
//! 2. [`classifier`] - deviations graded against the [`thresholds`] table
//! 3. [`persistence`] - errors confirmed only once they persist
//!
//! [`analysis::MovementAnalyzer`] runs the three per frame. [`adaptive`]
//! chooses detection sensitivity for a patient and environment.

pub mod adaptive;
pub mod analysis;
pub mod classifier;
pub mod config;
pub mod data;
pub mod error;
pub mod joint_angles;
pub mod landmarks;
pub mod persistence;
pub mod pose_source;
pub mod thresholds;
pub mod vector_math;

pub use analysis::{ConfirmedError, FrameReport, MovementAnalyzer};
pub use classifier::{classify, ErrorCandidate, Severity};
pub use config::CoreConfig;
pub use error::{ConfigError, PersistenceError, ThresholdError};
pub use joint_angles::{ClinicalGrade, ClinicalJointMeasurement, JointAngleCalculator, Movement};
pub use landmarks::{LandmarkIndex, PoseFrame, PoseLandmark, Side};
pub use persistence::{MultiThresholdPersistenceFilter, PersistenceBucket, PersistenceFilter};
pub use thresholds::{BodyRegion, ErrorType, ThresholdLevel, ThresholdStore, ThresholdTable};
