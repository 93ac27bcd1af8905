// src/thresholds.rs - Clinician-tunable warning/critical thresholds per region
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ThresholdError;
use crate::persistence::PersistenceBucket;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyRegion {
    Shoulder,
    Elbow,
    Knee,
}

impl BodyRegion {
    pub const ALL: [BodyRegion; 3] = [BodyRegion::Shoulder, BodyRegion::Elbow, BodyRegion::Knee];

    pub fn as_str(self) -> &'static str {
        match self {
            BodyRegion::Shoulder => "shoulder",
            BodyRegion::Elbow => "elbow",
            BodyRegion::Knee => "knee",
        }
    }
}

/// Compensatory patterns the classifier knows how to grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    ShoulderHiking,
    TrunkLean,
    ElbowFlexionDrift,
    ShoulderCompensation,
    KneeValgus,
    TrunkFlexion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdUnit {
    Centimeters,
    Degrees,
    Percent,
}

impl ThresholdUnit {
    pub fn suffix(self) -> &'static str {
        match self {
            ThresholdUnit::Centimeters => "cm",
            ThresholdUnit::Degrees => "°",
            ThresholdUnit::Percent => "%",
        }
    }
}

impl ErrorType {
    pub const ALL: [ErrorType; 6] = [
        ErrorType::ShoulderHiking,
        ErrorType::TrunkLean,
        ErrorType::ElbowFlexionDrift,
        ErrorType::ShoulderCompensation,
        ErrorType::KneeValgus,
        ErrorType::TrunkFlexion,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorType::ShoulderHiking => "shoulder_hiking",
            ErrorType::TrunkLean => "trunk_lean",
            ErrorType::ElbowFlexionDrift => "elbow_flexion_drift",
            ErrorType::ShoulderCompensation => "shoulder_compensation",
            ErrorType::KneeValgus => "knee_valgus",
            ErrorType::TrunkFlexion => "trunk_flexion",
        }
    }

    /// Region whose table holds this error's thresholds.
    pub fn region(self) -> BodyRegion {
        match self {
            ErrorType::ShoulderHiking | ErrorType::TrunkLean | ErrorType::ElbowFlexionDrift => {
                BodyRegion::Shoulder
            }
            ErrorType::ShoulderCompensation => BodyRegion::Elbow,
            ErrorType::KneeValgus | ErrorType::TrunkFlexion => BodyRegion::Knee,
        }
    }

    pub fn unit(self) -> ThresholdUnit {
        match self {
            ErrorType::ShoulderHiking => ThresholdUnit::Centimeters,
            ErrorType::KneeValgus => ThresholdUnit::Percent,
            _ => ThresholdUnit::Degrees,
        }
    }

    /// Persistence window class. Injury-risk patterns confirm fastest.
    pub fn persistence_bucket(self) -> PersistenceBucket {
        match self {
            ErrorType::KneeValgus => PersistenceBucket::HighRisk,
            ErrorType::ElbowFlexionDrift | ErrorType::TrunkFlexion => PersistenceBucket::Subtle,
            _ => PersistenceBucket::Compensatory,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdLevel {
    Warning,
    Critical,
}

macro_rules! display_via_as_str {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }
        )*
    };
}

impl ThresholdLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            ThresholdLevel::Warning => "warning",
            ThresholdLevel::Critical => "critical",
        }
    }
}

display_via_as_str!(BodyRegion, ErrorType, ThresholdLevel);

impl FromStr for BodyRegion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BodyRegion::ALL
            .into_iter()
            .find(|r| r.as_str() == s.to_ascii_lowercase())
            .ok_or_else(|| format!("unknown region '{}'", s))
    }
}

impl FromStr for ErrorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorType::ALL
            .into_iter()
            .find(|e| e.as_str() == s.to_ascii_lowercase())
            .ok_or_else(|| format!("unknown error type '{}'", s))
    }
}

impl FromStr for ThresholdLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "warning" | "warn" => Ok(ThresholdLevel::Warning),
            "critical" | "crit" => Ok(ThresholdLevel::Critical),
            other => Err(format!("unknown threshold level '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPair {
    pub warning: f64,
    pub critical: f64,
}

impl ThresholdPair {
    pub fn new(warning: f64, critical: f64) -> Self {
        Self { warning, critical }
    }

    pub fn get(&self, level: ThresholdLevel) -> f64 {
        match level {
            ThresholdLevel::Warning => self.warning,
            ThresholdLevel::Critical => self.critical,
        }
    }

    pub fn with(mut self, level: ThresholdLevel, value: f64) -> Self {
        match level {
            ThresholdLevel::Warning => self.warning = value,
            ThresholdLevel::Critical => self.critical = value,
        }
        self
    }

    pub fn is_valid(&self) -> bool {
        value_is_valid(self.warning) && value_is_valid(self.critical) && self.critical > self.warning
    }
}

fn value_is_valid(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

/// Something in a threshold table that would misgrade or silently skip an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThresholdViolation {
    /// Non-finite, negative, or `critical <= warning`
    InvalidPair {
        region: BodyRegion,
        error_type: ErrorType,
        warning: f64,
        critical: f64,
    },
    /// No entry under the region the classifier reads
    Missing { region: BodyRegion, error_type: ErrorType },
    /// Entry filed under a region the classifier never reads for this error
    Misfiled { region: BodyRegion, error_type: ErrorType },
}

impl ThresholdViolation {
    pub fn region(&self) -> BodyRegion {
        match self {
            ThresholdViolation::InvalidPair { region, .. }
            | ThresholdViolation::Missing { region, .. }
            | ThresholdViolation::Misfiled { region, .. } => *region,
        }
    }

    pub fn error_type(&self) -> ErrorType {
        match self {
            ThresholdViolation::InvalidPair { error_type, .. }
            | ThresholdViolation::Missing { error_type, .. }
            | ThresholdViolation::Misfiled { error_type, .. } => *error_type,
        }
    }
}

impl fmt::Display for ThresholdViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdViolation::InvalidPair {
                region,
                error_type,
                warning,
                critical,
            } => write!(
                f,
                "{}/{}: warning {} must be below critical {}",
                region, error_type, warning, critical
            ),
            ThresholdViolation::Missing { region, error_type } => {
                write!(f, "{}/{}: missing", region, error_type)
            }
            ThresholdViolation::Misfiled { region, error_type } => write!(
                f,
                "{}/{}: belongs under {}",
                region,
                error_type,
                error_type.region()
            ),
        }
    }
}

/// region → error type → thresholds. Serializes to the on-disk JSON layout.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThresholdTable {
    regions: BTreeMap<BodyRegion, BTreeMap<ErrorType, ThresholdPair>>,
}

static CLINICAL_DEFAULTS: Lazy<ThresholdTable> = Lazy::new(|| {
    let mut table = ThresholdTable::default();
    table.set(BodyRegion::Shoulder, ErrorType::ShoulderHiking, ThresholdPair::new(2.0, 4.0));
    table.set(BodyRegion::Shoulder, ErrorType::TrunkLean, ThresholdPair::new(10.0, 20.0));
    table.set(BodyRegion::Shoulder, ErrorType::ElbowFlexionDrift, ThresholdPair::new(15.0, 30.0));
    table.set(BodyRegion::Elbow, ErrorType::ShoulderCompensation, ThresholdPair::new(15.0, 30.0));
    table.set(BodyRegion::Knee, ErrorType::KneeValgus, ThresholdPair::new(10.0, 20.0));
    table.set(BodyRegion::Knee, ErrorType::TrunkFlexion, ThresholdPair::new(20.0, 35.0));
    table
});

impl ThresholdTable {
    pub fn clinical_defaults() -> Self {
        CLINICAL_DEFAULTS.clone()
    }

    pub fn get(&self, region: BodyRegion, error_type: ErrorType) -> Option<ThresholdPair> {
        self.regions.get(&region)?.get(&error_type).copied()
    }

    /// Unchecked write. Use `ThresholdStore::update_threshold` for validated edits.
    pub fn set(&mut self, region: BodyRegion, error_type: ErrorType, pair: ThresholdPair) {
        self.regions.entry(region).or_default().insert(error_type, pair);
    }

    pub fn entries(&self) -> impl Iterator<Item = (BodyRegion, ErrorType, ThresholdPair)> + '_ {
        self.regions.iter().flat_map(|(region, errors)| {
            errors.iter().map(move |(error_type, pair)| (*region, *error_type, *pair))
        })
    }

    pub fn len(&self) -> usize {
        self.regions.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every invalid pair, every entry filed under the wrong region, and every
    /// error type with no entry under its own region.
    pub fn validate(&self) -> Vec<ThresholdViolation> {
        let mut violations: Vec<ThresholdViolation> = self
            .entries()
            .filter_map(|(region, error_type, pair)| {
                if region != error_type.region() {
                    Some(ThresholdViolation::Misfiled { region, error_type })
                } else if !pair.is_valid() {
                    Some(ThresholdViolation::InvalidPair {
                        region,
                        error_type,
                        warning: pair.warning,
                        critical: pair.critical,
                    })
                } else {
                    None
                }
            })
            .collect();

        violations.extend(
            ErrorType::ALL
                .into_iter()
                .filter(|error_type| self.get(error_type.region(), *error_type).is_none())
                .map(|error_type| ThresholdViolation::Missing {
                    region: error_type.region(),
                    error_type,
                }),
        );
        violations
    }
}

/// Owner of the live threshold table.
///
/// Readers take an `Arc` snapshot per frame; edits clone-on-write so a frame
/// never observes a half-applied change.
#[derive(Debug, Clone)]
pub struct ThresholdStore {
    table: Arc<ThresholdTable>,
}

impl Default for ThresholdStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ThresholdStore {
    pub fn new() -> Self {
        Self {
            table: Arc::new(ThresholdTable::clinical_defaults()),
        }
    }

    pub fn from_table(table: ThresholdTable) -> Result<Self, ThresholdError> {
        let violations = table.validate();
        if !violations.is_empty() {
            return Err(ThresholdError::Invalid(violations));
        }
        Ok(Self {
            table: Arc::new(table),
        })
    }

    pub fn snapshot(&self) -> Arc<ThresholdTable> {
        Arc::clone(&self.table)
    }

    pub fn table(&self) -> &ThresholdTable {
        &self.table
    }

    pub fn get_threshold(
        &self,
        region: BodyRegion,
        error_type: ErrorType,
        level: ThresholdLevel,
    ) -> Option<f64> {
        self.table.get(region, error_type).map(|pair| pair.get(level))
    }

    /// Sets one level of one pair. Rejected edits leave the table untouched.
    pub fn update_threshold(
        &mut self,
        region: BodyRegion,
        error_type: ErrorType,
        level: ThresholdLevel,
        value: f64,
    ) -> Result<(), ThresholdError> {
        let current = self
            .table
            .get(region, error_type)
            .ok_or(ThresholdError::UnknownEntry { region, error_type })?;

        if !value_is_valid(value) {
            warn!(%region, %error_type, %level, value, "rejected non-numeric threshold");
            return Err(ThresholdError::InvalidValue {
                region,
                error_type,
                level,
                value,
            });
        }

        let updated = current.with(level, value);
        if updated.critical <= updated.warning {
            warn!(
                %region,
                %error_type,
                warning = updated.warning,
                critical = updated.critical,
                "rejected threshold edit: critical must exceed warning"
            );
            return Err(ThresholdError::CriticalNotAboveWarning {
                region,
                error_type,
                warning: updated.warning,
                critical: updated.critical,
            });
        }

        Arc::make_mut(&mut self.table).set(region, error_type, updated);
        debug!(%region, %error_type, %level, value, "threshold updated");
        Ok(())
    }

    pub fn validate_config(&self) -> Vec<ThresholdViolation> {
        self.table.validate()
    }

    pub fn export_config(&self) -> Result<String, ThresholdError> {
        Ok(serde_json::to_string_pretty(self.table.as_ref())?)
    }

    /// Replaces the whole table. A document that fails to parse or validate
    /// changes nothing.
    pub fn import_config(&mut self, serialized: &str) -> Result<(), ThresholdError> {
        let table: ThresholdTable = serde_json::from_str(serialized)?;

        let violations = table.validate();
        if !violations.is_empty() {
            warn!(count = violations.len(), "rejected threshold import");
            return Err(ThresholdError::Invalid(violations));
        }

        info!(entries = table.len(), "imported threshold table");
        self.table = Arc::new(table);
        Ok(())
    }

    pub fn reset_to_defaults(&mut self) {
        self.table = Arc::new(ThresholdTable::clinical_defaults());
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ThresholdError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut store = Self::new();
        store.import_config(&content)?;
        Ok(store)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ThresholdError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.export_config()?)?;
        Ok(())
    }
}
