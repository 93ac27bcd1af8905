// src/analysis.rs - Per-frame pipeline: angles → graded deviations → confirmed errors
use std::collections::HashMap;

use serde::Serialize;
use tracing::info;

use crate::classifier::{classify_compensation, error_key, ErrorCandidate, Severity};
use crate::config::CoreConfig;
use crate::joint_angles::{ClinicalJointMeasurement, JointAngleCalculator, Movement};
use crate::landmarks::{PoseFrame, Side};
use crate::persistence::{MultiThresholdPersistenceFilter, PersistenceBucket};
use crate::thresholds::{ErrorType, ThresholdTable};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmedError {
    pub key: String,
    pub error_type: ErrorType,
    pub side: Side,
    pub severity: Severity,
    pub bucket: PersistenceBucket,
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameReport {
    pub timestamp_ms: u64,
    pub movement: Movement,
    pub side: Side,
    pub measurement: Option<ClinicalJointMeasurement>,
    pub candidates: Vec<ErrorCandidate>,
    pub confirmed: Vec<ConfirmedError>,
}

impl FrameReport {
    pub fn confirmed_keys(&self) -> Vec<&str> {
        self.confirmed.iter().map(|c| c.key.as_str()).collect()
    }
}

#[derive(Debug, Clone, Copy)]
struct LastSeen {
    error_type: ErrorType,
    severity: Severity,
}

pub struct MovementAnalyzer {
    calculator: JointAngleCalculator,
    persistence: MultiThresholdPersistenceFilter,
    last_seen: HashMap<String, LastSeen>,
    frames_processed: u32,
    prune_interval: u32,
}

impl Default for MovementAnalyzer {
    fn default() -> Self {
        Self::new(&CoreConfig::default())
    }
}

impl MovementAnalyzer {
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            calculator: JointAngleCalculator::new(config.min_landmark_visibility),
            persistence: MultiThresholdPersistenceFilter::new(&config.persistence),
            last_seen: HashMap::new(),
            frames_processed: 0,
            prune_interval: config.prune_interval_frames.max(1),
        }
    }

    pub fn calculator(&self) -> &JointAngleCalculator {
        &self.calculator
    }

    pub fn frames_processed(&self) -> u32 {
        self.frames_processed
    }

    /// Runs one frame. When no measurement is possible the persistence state is
    /// left alone and previously confirmed errors are still reported.
    pub fn analyze(
        &mut self,
        frame: &PoseFrame,
        movement: Movement,
        side: Side,
        thresholds: &ThresholdTable,
    ) -> FrameReport {
        self.frames_processed += 1;
        let now = frame.timestamp_ms;

        let measurement = self.calculator.measure(frame, movement, side);
        let mut candidates = Vec::new();

        if let Some(m) = &measurement {
            candidates = m
                .primary_joint
                .compensations
                .iter()
                .map(|c| classify_compensation(thresholds, c, side))
                .collect();

            for &error_type in movement.compensation_types() {
                self.observe(error_type, side, &candidates, now);
            }

            if self.frames_processed % self.prune_interval == 0 {
                self.prune(now);
            }
        }

        FrameReport {
            timestamp_ms: now,
            movement,
            side,
            measurement,
            candidates,
            confirmed: self.confirmed_for(movement, side),
        }
    }

    pub fn reset(&mut self) {
        self.persistence.reset();
        self.last_seen.clear();
        self.frames_processed = 0;
    }

    fn observe(&mut self, error_type: ErrorType, side: Side, candidates: &[ErrorCandidate], now: u64) {
        let key = error_key(error_type, side);
        let bucket = error_type.persistence_bucket();
        let severity = candidates
            .iter()
            .find(|c| c.error_type == error_type)
            .map(|c| c.severity)
            .unwrap_or(Severity::None);
        let present = severity.is_error();

        let was_confirmed = self.persistence.is_confirmed(bucket, &key);
        // A missing bucket is already reported by the filter; the frame carries on
        let Ok(confirmed) = self.persistence.update(bucket, &key, present, now) else {
            return;
        };

        if present {
            self.last_seen.insert(key.clone(), LastSeen { error_type, severity });
        }
        if confirmed && !was_confirmed {
            info!(key = key.as_str(), severity = severity.as_str(), ts = now, "compensatory error confirmed");
        }
    }

    fn prune(&mut self, now: u64) {
        self.persistence.prune(now);
        let persistence = &self.persistence;
        self.last_seen.retain(|key, seen| {
            persistence
                .filter(seen.error_type.persistence_bucket())
                .and_then(|f| f.state(key))
                .is_some()
        });
    }

    fn confirmed_for(&self, movement: Movement, side: Side) -> Vec<ConfirmedError> {
        movement
            .compensation_types()
            .iter()
            .filter_map(|&error_type| {
                let key = error_key(error_type, side);
                let bucket = error_type.persistence_bucket();
                if !self.persistence.is_confirmed(bucket, &key) {
                    return None;
                }
                let severity = self
                    .last_seen
                    .get(&key)
                    .map(|s| s.severity)
                    .unwrap_or(Severity::Warning);
                Some(ConfirmedError {
                    key,
                    error_type,
                    side,
                    severity,
                    bucket,
                })
            })
            .collect()
    }
}
