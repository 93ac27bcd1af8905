// src/config.rs - Runtime settings for the analysis core
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::joint_angles::DEFAULT_MIN_VISIBILITY;
use crate::persistence::PersistenceConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Landmarks below this visibility are treated as absent
    #[serde(default = "default_min_visibility")]
    pub min_landmark_visibility: f64,
    /// Persistence windows per bucket. Clinician-tunable like the angle thresholds.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Confirmed-error entries are pruned this often (frames)
    #[serde(default = "default_prune_interval")]
    pub prune_interval_frames: u32,
}

fn default_min_visibility() -> f64 {
    DEFAULT_MIN_VISIBILITY
}

fn default_prune_interval() -> u32 {
    30
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            min_landmark_visibility: default_min_visibility(),
            persistence: PersistenceConfig::default(),
            prune_interval_frames: default_prune_interval(),
        }
    }
}

impl CoreConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: CoreConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.min_landmark_visibility) {
            return Err(ConfigError::Visibility(self.min_landmark_visibility));
        }
        if let Some((bucket, _)) = self.persistence.windows_ms.iter().find(|(_, ms)| **ms == 0) {
            return Err(ConfigError::PersistenceWindow { bucket: *bucket });
        }
        if self.persistence.reset_timeout_ms == 0 {
            return Err(ConfigError::ResetTimeout);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::PersistenceBucket;

    #[test]
    fn test_default_is_valid() {
        assert!(CoreConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let config: CoreConfig = serde_json::from_str(r#"{"min_landmark_visibility": 0.7}"#).unwrap();
        assert_eq!(config.min_landmark_visibility, 0.7);
        assert_eq!(config.persistence, PersistenceConfig::default());
        assert_eq!(config.prune_interval_frames, 30);
    }

    #[test]
    fn test_tuned_persistence_windows() {
        let config: CoreConfig = serde_json::from_str(
            r#"{"persistence": {"windows_ms": {"high_risk": 200, "compensatory": 450}}}"#,
        )
        .unwrap();

        assert_eq!(config.persistence.windows_ms[&PersistenceBucket::HighRisk], 200);
        assert!(!config.persistence.windows_ms.contains_key(&PersistenceBucket::Subtle));
        assert_eq!(config.persistence.reset_timeout_ms, 1000);
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = CoreConfig {
            min_landmark_visibility: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Visibility(_))));

        config.min_landmark_visibility = 0.5;
        config.persistence.windows_ms.insert(PersistenceBucket::Subtle, 0);
        assert!(matches!(config.validate(), Err(ConfigError::PersistenceWindow { .. })));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("core.json");
        std::fs::write(&path, r#"{"min_landmark_visibility": 0.6}"#).unwrap();

        let config = CoreConfig::load(&path).unwrap();
        assert_eq!(config.min_landmark_visibility, 0.6);

        std::fs::write(&path, r#"{"min_landmark_visibility": -1}"#).unwrap();
        assert!(CoreConfig::load(&path).is_err());
    }
}
