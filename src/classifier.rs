// src/classifier.rs - Grades raw deviations against the threshold table
use serde::{Deserialize, Serialize};

use crate::joint_angles::Compensation;
use crate::landmarks::Side;
use crate::thresholds::{BodyRegion, ErrorType, ThresholdTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    None,
    Warning,
    Critical,
}

impl Severity {
    pub fn is_error(self) -> bool {
        self != Severity::None
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

/// A graded deviation that has not yet passed the persistence filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorCandidate {
    pub region: BodyRegion,
    pub error_type: ErrorType,
    pub side: Side,
    pub deviation: f64,
    pub severity: Severity,
}

impl ErrorCandidate {
    /// Stable key for persistence tracking, e.g. `shoulder_hiking_left`.
    pub fn key(&self) -> String {
        error_key(self.error_type, self.side)
    }
}

pub fn error_key(error_type: ErrorType, side: Side) -> String {
    format!("{}_{}", error_type.as_str(), side.as_str())
}

/// Critical is checked first; both comparisons are inclusive.
pub fn classify(
    table: &ThresholdTable,
    region: BodyRegion,
    error_type: ErrorType,
    deviation: f64,
) -> Severity {
    if !deviation.is_finite() {
        return Severity::None;
    }

    let Some(pair) = table.get(region, error_type) else {
        return Severity::None;
    };

    if deviation >= pair.critical {
        Severity::Critical
    } else if deviation >= pair.warning {
        Severity::Warning
    } else {
        Severity::None
    }
}

pub fn classify_compensation(
    table: &ThresholdTable,
    compensation: &Compensation,
    side: Side,
) -> ErrorCandidate {
    let region = compensation.error_type.region();
    ErrorCandidate {
        region,
        error_type: compensation.error_type,
        side,
        deviation: compensation.deviation,
        severity: classify(table, region, compensation.error_type, compensation.deviation),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thresholds::ThresholdPair;

    fn table() -> ThresholdTable {
        let mut table = ThresholdTable::default();
        table.set(BodyRegion::Shoulder, ErrorType::TrunkLean, ThresholdPair::new(10.0, 20.0));
        table
    }

    #[test]
    fn test_bands() {
        let t = table();
        assert_eq!(classify(&t, BodyRegion::Shoulder, ErrorType::TrunkLean, 0.0), Severity::None);
        assert_eq!(classify(&t, BodyRegion::Shoulder, ErrorType::TrunkLean, 9.99), Severity::None);
        assert_eq!(classify(&t, BodyRegion::Shoulder, ErrorType::TrunkLean, 10.0), Severity::Warning);
        assert_eq!(classify(&t, BodyRegion::Shoulder, ErrorType::TrunkLean, 19.9), Severity::Warning);
        assert_eq!(classify(&t, BodyRegion::Shoulder, ErrorType::TrunkLean, 20.0), Severity::Critical);
        assert_eq!(classify(&t, BodyRegion::Shoulder, ErrorType::TrunkLean, 90.0), Severity::Critical);
    }

    #[test]
    fn test_missing_entry_and_nan() {
        let t = table();
        assert_eq!(classify(&t, BodyRegion::Knee, ErrorType::KneeValgus, 50.0), Severity::None);
        assert_eq!(classify(&t, BodyRegion::Shoulder, ErrorType::TrunkLean, f64::NAN), Severity::None);
    }

    #[test]
    fn test_candidate_key() {
        let t = ThresholdTable::clinical_defaults();
        let candidate = classify_compensation(
            &t,
            &Compensation {
                error_type: ErrorType::ShoulderHiking,
                deviation: 4.5,
            },
            Side::Left,
        );

        assert_eq!(candidate.key(), "shoulder_hiking_left");
        assert_eq!(candidate.region, BodyRegion::Shoulder);
        assert_eq!(candidate.severity, Severity::Critical);
    }
}
