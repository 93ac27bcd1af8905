// src/adaptive.rs - Picks detection sensitivity from patient and environment
use serde::{Deserialize, Serialize};
use tracing::debug;

const MIN_CONFIDENCE_FLOOR: f64 = 0.3;
const MIN_CONFIDENCE_CEILING: f64 = 0.95;
const MAX_SMOOTHING: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatientRole {
    Patient,
    Caregiver,
    Physiotherapist,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MobilityLevel {
    Full,
    Limited,
    Assisted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechComfort {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientProfile {
    pub age: u32,
    pub sessions_completed: u32,
    #[serde(default)]
    pub role: Option<PatientRole>,
    pub mobility: MobilityLevel,
    pub tech_comfort: TechComfort,
    #[serde(default)]
    pub has_assistance: bool,
    #[serde(default)]
    pub has_tremor: bool,
}

impl Default for PatientProfile {
    fn default() -> Self {
        Self {
            age: 40,
            sessions_completed: 5,
            role: None,
            mobility: MobilityLevel::Full,
            tech_comfort: TechComfort::Medium,
            has_assistance: false,
            has_tremor: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightingQuality {
    Excellent,
    Good,
    Fair,
    Poor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceAvailability {
    Ample,
    Adequate,
    Limited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundComplexity {
    Plain,
    Moderate,
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStability {
    Stable,
    Handheld,
    Unstable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConditions {
    pub lighting: LightingQuality,
    pub space: SpaceAvailability,
    pub background: BackgroundComplexity,
    pub stability: DeviceStability,
}

impl Default for EnvironmentConditions {
    fn default() -> Self {
        Self {
            lighting: LightingQuality::Good,
            space: SpaceAvailability::Adequate,
            background: BackgroundComplexity::Plain,
            stability: DeviceStability::Stable,
        }
    }
}

/// Measured camera-side lighting signals, all normalised to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightingAssessment {
    pub brightness: f64,
    pub contrast: f64,
    pub backlit: bool,
}

impl Default for LightingAssessment {
    fn default() -> Self {
        Self {
            brightness: 0.6,
            contrast: 0.5,
            backlit: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccuracyTier {
    Simple,
    Standard,
    Professional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuidanceLevel {
    Detailed,
    Standard,
    Minimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierSettings {
    pub min_confidence: f64,
    pub smoothing: f64,
    pub guidance: GuidanceLevel,
    pub auto_recovery: bool,
    pub simplified_ui: bool,
    pub accuracy_target: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOfView {
    Standard,
    Wide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropMode {
    FullBody,
    UpperBody,
}

/// Concrete parameters handed back to pose acquisition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveSettings {
    pub tier: AccuracyTier,
    pub min_confidence: f64,
    pub smoothing: f64,
    pub exposure_compensation: f64,
    pub guidance: GuidanceLevel,
    pub auto_recovery: bool,
    pub simplified_ui: bool,
    pub accuracy_target: f64,
    pub min_distance_m: Option<f64>,
    pub fov: Option<FieldOfView>,
    pub crop_mode: Option<CropMode>,
}

impl AdaptiveSettings {
    fn from_tier(tier: AccuracyTier) -> Self {
        let base = get_tier_settings(tier);
        Self {
            tier,
            min_confidence: base.min_confidence,
            smoothing: base.smoothing,
            exposure_compensation: 0.0,
            guidance: base.guidance,
            auto_recovery: base.auto_recovery,
            simplified_ui: base.simplified_ui,
            accuracy_target: base.accuracy_target,
            min_distance_m: None,
            fov: None,
            crop_mode: None,
        }
    }
}

pub type TierPredicate = fn(&PatientProfile, &EnvironmentConditions) -> bool;

/// A named step of the tier cascade.
pub struct TierRule {
    pub name: &'static str,
    pub predicate: TierPredicate,
    pub tier: AccuracyTier,
}

/// Evaluated in order, first match wins.
pub const TIER_RULES: &[TierRule] = &[
    TierRule {
        name: "elderly_or_new_patient",
        predicate: |p, _| p.age > 65 || p.sessions_completed < 3,
        tier: AccuracyTier::Simple,
    },
    TierRule {
        name: "poor_lighting_or_limited_space",
        predicate: |_, e| e.lighting == LightingQuality::Poor || e.space == SpaceAvailability::Limited,
        tier: AccuracyTier::Simple,
    },
    TierRule {
        name: "low_tech_comfort",
        predicate: |p, _| p.tech_comfort == TechComfort::Low,
        tier: AccuracyTier::Simple,
    },
    TierRule {
        name: "professional_role",
        predicate: |p, _| p.role == Some(PatientRole::Physiotherapist),
        tier: AccuracyTier::Professional,
    },
];

pub fn select_optimal_tier(profile: &PatientProfile, environment: &EnvironmentConditions) -> AccuracyTier {
    TIER_RULES
        .iter()
        .find(|rule| (rule.predicate)(profile, environment))
        .map(|rule| {
            debug!(rule = rule.name, tier = ?rule.tier, "tier rule matched");
            rule.tier
        })
        .unwrap_or(AccuracyTier::Standard)
}

pub fn get_tier_settings(tier: AccuracyTier) -> TierSettings {
    match tier {
        AccuracyTier::Simple => TierSettings {
            min_confidence: 0.5,
            smoothing: 0.8,
            guidance: GuidanceLevel::Detailed,
            auto_recovery: true,
            simplified_ui: true,
            accuracy_target: 0.85,
        },
        AccuracyTier::Standard => TierSettings {
            min_confidence: 0.6,
            smoothing: 0.6,
            guidance: GuidanceLevel::Standard,
            auto_recovery: true,
            simplified_ui: false,
            accuracy_target: 0.9,
        },
        AccuracyTier::Professional => TierSettings {
            min_confidence: 0.7,
            smoothing: 0.4,
            guidance: GuidanceLevel::Minimal,
            auto_recovery: false,
            simplified_ui: false,
            accuracy_target: 0.95,
        },
    }
}

/// Tier baseline, then lighting, space and patient passes. The patient pass
/// runs last so its adjustments win.
pub fn get_comprehensive_adaptive_settings(
    profile: &PatientProfile,
    environment: &EnvironmentConditions,
    lighting: &LightingAssessment,
) -> AdaptiveSettings {
    let tier = select_optimal_tier(profile, environment);
    let mut settings = AdaptiveSettings::from_tier(tier);

    apply_lighting(&mut settings, environment, lighting);
    apply_space(&mut settings, environment);
    apply_patient(&mut settings, profile);

    settings.min_confidence = settings
        .min_confidence
        .clamp(MIN_CONFIDENCE_FLOOR, MIN_CONFIDENCE_CEILING);
    settings.smoothing = settings.smoothing.clamp(0.0, MAX_SMOOTHING);
    settings
}

fn apply_lighting(settings: &mut AdaptiveSettings, environment: &EnvironmentConditions, lighting: &LightingAssessment) {
    match environment.lighting {
        LightingQuality::Poor => {
            settings.exposure_compensation += 1.0;
            settings.min_confidence -= 0.1;
        }
        LightingQuality::Fair => settings.exposure_compensation += 0.5,
        LightingQuality::Good | LightingQuality::Excellent => {}
    }

    if lighting.backlit {
        settings.exposure_compensation += 0.7;
    }
    if lighting.contrast < 0.3 {
        settings.min_confidence -= 0.05;
    }
}

fn apply_space(settings: &mut AdaptiveSettings, environment: &EnvironmentConditions) {
    let (distance, fov, crop) = match environment.space {
        SpaceAvailability::Limited => (1.2, FieldOfView::Wide, CropMode::UpperBody),
        SpaceAvailability::Adequate => (1.8, FieldOfView::Standard, CropMode::FullBody),
        SpaceAvailability::Ample => (2.5, FieldOfView::Standard, CropMode::FullBody),
    };
    settings.min_distance_m = Some(distance);
    settings.fov = Some(fov);
    settings.crop_mode = Some(crop);
}

fn apply_patient(settings: &mut AdaptiveSettings, profile: &PatientProfile) {
    if profile.has_tremor {
        settings.smoothing = settings.smoothing.max(0.85);
    }
    if profile.mobility != MobilityLevel::Full {
        settings.min_confidence -= 0.1;
    }
    if profile.has_assistance {
        settings.guidance = GuidanceLevel::Detailed;
    }
}
