// src/persistence.rs - Temporal confirmation of detected errors
//
// An error candidate is only reported once it has been seen continuously for
// a minimum window. Single-frame dropouts inside the reset window are ignored.
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PersistenceError;

pub const DEFAULT_RESET_TIMEOUT_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceState {
    pub first_detected_at: u64,
    pub last_seen_at: u64,
    pub consecutive_frames: u32,
    pub is_confirmed: bool,
}

pub struct PersistenceFilter {
    persistence_ms: u64,
    reset_timeout_ms: u64,
    states: HashMap<String, PersistenceState>,
}

impl PersistenceFilter {
    pub fn new(persistence_ms: u64, reset_timeout_ms: u64) -> Self {
        Self {
            persistence_ms,
            reset_timeout_ms,
            states: HashMap::new(),
        }
    }

    pub fn persistence_ms(&self) -> u64 {
        self.persistence_ms
    }

    pub fn reset_timeout_ms(&self) -> u64 {
        self.reset_timeout_ms
    }

    /// Feeds one observation for `key` and returns whether the error is confirmed.
    pub fn update(&mut self, key: &str, is_present: bool, now_ms: u64) -> bool {
        // Stale entries restart from zero
        if let Some(state) = self.states.get(key) {
            if now_ms.saturating_sub(state.last_seen_at) > self.reset_timeout_ms {
                debug!(key, "persistence state expired");
                self.states.remove(key);
            }
        }

        if !is_present {
            // Grace period: keep the entry as-is, lastSeen does not move
            return self.states.get(key).map(|s| s.is_confirmed).unwrap_or(false);
        }

        let persistence_ms = self.persistence_ms;
        let state = self
            .states
            .entry(key.to_string())
            .and_modify(|s| {
                s.last_seen_at = now_ms;
                s.consecutive_frames += 1;
            })
            .or_insert(PersistenceState {
                first_detected_at: now_ms,
                last_seen_at: now_ms,
                consecutive_frames: 1,
                is_confirmed: false,
            });

        let elapsed_ms = now_ms.saturating_sub(state.first_detected_at);
        if !state.is_confirmed && elapsed_ms >= persistence_ms {
            state.is_confirmed = true;
            debug!(
                key,
                frames = state.consecutive_frames,
                elapsed_ms,
                "error confirmed"
            );
        }

        state.is_confirmed
    }

    pub fn state(&self, key: &str) -> Option<&PersistenceState> {
        self.states.get(key)
    }

    pub fn is_confirmed(&self, key: &str) -> bool {
        self.states.get(key).map(|s| s.is_confirmed).unwrap_or(false)
    }

    pub fn confirmed_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .states
            .iter()
            .filter(|(_, s)| s.is_confirmed)
            .map(|(k, _)| k.as_str())
            .collect();
        keys.sort_unstable();
        keys
    }

    /// Drops every entry not seen within the reset timeout.
    pub fn prune(&mut self, now_ms: u64) -> usize {
        let before = self.states.len();
        let timeout = self.reset_timeout_ms;
        self.states
            .retain(|_, s| now_ms.saturating_sub(s.last_seen_at) <= timeout);
        before - self.states.len()
    }

    pub fn reset_key(&mut self, key: &str) -> bool {
        self.states.remove(key).is_some()
    }

    pub fn reset(&mut self) {
        self.states.clear();
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Severity class selecting the persistence window for an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceBucket {
    Compensatory,
    HighRisk,
    Subtle,
}

impl PersistenceBucket {
    pub const ALL: [PersistenceBucket; 3] = [
        PersistenceBucket::Compensatory,
        PersistenceBucket::HighRisk,
        PersistenceBucket::Subtle,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PersistenceBucket::Compensatory => "compensatory",
            PersistenceBucket::HighRisk => "high_risk",
            PersistenceBucket::Subtle => "subtle",
        }
    }

    pub fn default_window_ms(self) -> u64 {
        match self {
            PersistenceBucket::Compensatory => 400,
            PersistenceBucket::HighRisk => 300,
            PersistenceBucket::Subtle => 500,
        }
    }
}

impl fmt::Display for PersistenceBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PersistenceBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PersistenceBucket::ALL
            .into_iter()
            .find(|b| b.as_str() == s.to_ascii_lowercase())
            .ok_or_else(|| format!("unknown persistence bucket '{}'", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_windows")]
    pub windows_ms: BTreeMap<PersistenceBucket, u64>,
    #[serde(default = "default_reset_timeout")]
    pub reset_timeout_ms: u64,
}

fn default_windows() -> BTreeMap<PersistenceBucket, u64> {
    PersistenceBucket::ALL
        .into_iter()
        .map(|b| (b, b.default_window_ms()))
        .collect()
}

fn default_reset_timeout() -> u64 {
    DEFAULT_RESET_TIMEOUT_MS
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            windows_ms: default_windows(),
            reset_timeout_ms: default_reset_timeout(),
        }
    }
}

/// One independent filter per severity bucket so high-risk patterns confirm
/// faster than subtle drift.
pub struct MultiThresholdPersistenceFilter {
    filters: BTreeMap<PersistenceBucket, PersistenceFilter>,
}

impl Default for MultiThresholdPersistenceFilter {
    fn default() -> Self {
        Self::new(&PersistenceConfig::default())
    }
}

impl MultiThresholdPersistenceFilter {
    pub fn new(config: &PersistenceConfig) -> Self {
        let filters = config
            .windows_ms
            .iter()
            .map(|(bucket, window)| (*bucket, PersistenceFilter::new(*window, config.reset_timeout_ms)))
            .collect();
        Self { filters }
    }

    /// A bucket with no configured window is reported and leaves all state untouched.
    pub fn update(
        &mut self,
        bucket: PersistenceBucket,
        key: &str,
        is_present: bool,
        now_ms: u64,
    ) -> Result<bool, PersistenceError> {
        match self.filters.get_mut(&bucket) {
            Some(filter) => Ok(filter.update(key, is_present, now_ms)),
            None => {
                warn!(%bucket, key, "no persistence window configured; update ignored");
                Err(PersistenceError::UnknownBucket(bucket))
            }
        }
    }

    pub fn filter(&self, bucket: PersistenceBucket) -> Option<&PersistenceFilter> {
        self.filters.get(&bucket)
    }

    pub fn is_confirmed(&self, bucket: PersistenceBucket, key: &str) -> bool {
        self.filters
            .get(&bucket)
            .map(|f| f.is_confirmed(key))
            .unwrap_or(false)
    }

    pub fn confirmed_keys(&self) -> Vec<(PersistenceBucket, &str)> {
        self.filters
            .iter()
            .flat_map(|(bucket, f)| f.confirmed_keys().into_iter().map(move |k| (*bucket, k)))
            .collect()
    }

    pub fn prune(&mut self, now_ms: u64) -> usize {
        self.filters.values_mut().map(|f| f.prune(now_ms)).sum()
    }

    pub fn reset(&mut self) {
        for filter in self.filters.values_mut() {
            filter.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirms_at_persistence_window() {
        let mut filter = PersistenceFilter::new(400, 1000);
        let results: Vec<bool> = [0, 100, 200, 300, 400]
            .iter()
            .map(|&t| filter.update("shoulder_hiking_left", true, t))
            .collect();

        assert_eq!(results, vec![false, false, false, false, true]);
        let state = filter.state("shoulder_hiking_left").unwrap();
        assert_eq!(state.consecutive_frames, 5);
        assert_eq!(state.first_detected_at, 0);
        assert_eq!(state.last_seen_at, 400);
    }

    #[test]
    fn test_restarts_after_reset_timeout() {
        let mut filter = PersistenceFilter::new(400, 1000);
        for t in [0, 100, 200, 300, 400] {
            filter.update("k", true, t);
        }

        // absent inside the window: untouched, still confirmed
        assert!(filter.update("k", false, 401));
        assert_eq!(filter.state("k").unwrap().last_seen_at, 400);

        // back after the timeout: the clock starts over
        assert!(!filter.update("k", true, 1500));
        let state = filter.state("k").unwrap();
        assert_eq!(state.first_detected_at, 1500);
        assert_eq!(state.consecutive_frames, 1);
        assert!(!state.is_confirmed);
    }

    #[test]
    fn test_confirmation_is_sticky_across_dropout() {
        let mut filter = PersistenceFilter::new(300, 1000);
        filter.update("k", true, 0);
        assert!(filter.update("k", true, 300));
        assert!(filter.update("k", false, 350));
        assert!(filter.update("k", false, 800));
        assert!(filter.update("k", true, 900));
        assert!(filter.is_confirmed("k"));
    }

    #[test]
    fn test_dropout_does_not_reset_clock() {
        let mut filter = PersistenceFilter::new(400, 1000);
        filter.update("k", true, 0);
        filter.update("k", false, 100);
        filter.update("k", true, 200);
        assert!(filter.update("k", true, 400));
        assert_eq!(filter.state("k").unwrap().consecutive_frames, 3);
    }

    #[test]
    fn test_absent_key_never_created() {
        let mut filter = PersistenceFilter::new(400, 1000);
        assert!(!filter.update("k", false, 0));
        assert!(filter.is_empty());
    }

    #[test]
    fn test_expired_absent_update_deletes_entry() {
        let mut filter = PersistenceFilter::new(400, 1000);
        filter.update("k", true, 0);
        assert!(!filter.update("k", false, 1001));
        assert!(filter.state("k").is_none());
    }

    #[test]
    fn test_out_of_order_timestamps() {
        let mut filter = PersistenceFilter::new(0, 1000);
        assert!(filter.update("k", true, 500));
        assert!(filter.update("k", true, 200));

        let mut filter = PersistenceFilter::new(400, 1000);
        assert!(!filter.update("k", true, 500));
        assert!(!filter.update("k", true, 100));
        assert!(filter.update("k", true, 900));
        assert_eq!(filter.state("k").unwrap().first_detected_at, 500);
    }

    #[test]
    fn test_keys_are_independent() {
        let mut filter = PersistenceFilter::new(200, 1000);
        filter.update("a", true, 0);
        filter.update("b", true, 100);
        filter.update("a", true, 200);
        filter.update("b", true, 200);

        assert_eq!(filter.confirmed_keys(), vec!["a"]);
    }

    #[test]
    fn test_prune_and_reset() {
        let mut filter = PersistenceFilter::new(200, 500);
        filter.update("old", true, 0);
        filter.update("fresh", true, 900);

        assert_eq!(filter.prune(1000), 1);
        assert!(filter.state("old").is_none());
        assert!(filter.reset_key("fresh"));
        assert!(filter.is_empty());

        filter.update("x", true, 0);
        filter.reset();
        assert_eq!(filter.len(), 0);
    }

    #[test]
    fn test_buckets_confirm_at_their_own_window() {
        let mut multi = MultiThresholdPersistenceFilter::default();
        for t in [0, 100, 200] {
            multi.update(PersistenceBucket::HighRisk, "knee_valgus_left", true, t).unwrap();
            multi.update(PersistenceBucket::Compensatory, "trunk_lean_left", true, t).unwrap();
            multi.update(PersistenceBucket::Subtle, "trunk_flexion_left", true, t).unwrap();
        }

        assert!(multi.update(PersistenceBucket::HighRisk, "knee_valgus_left", true, 300).unwrap());
        assert!(!multi.update(PersistenceBucket::Compensatory, "trunk_lean_left", true, 300).unwrap());
        assert!(multi.update(PersistenceBucket::Compensatory, "trunk_lean_left", true, 400).unwrap());
        assert!(!multi.update(PersistenceBucket::Subtle, "trunk_flexion_left", true, 400).unwrap());
        assert!(multi.update(PersistenceBucket::Subtle, "trunk_flexion_left", true, 500).unwrap());
    }

    #[test]
    fn test_missing_bucket_is_noop() {
        let mut config = PersistenceConfig::default();
        config.windows_ms.remove(&PersistenceBucket::Subtle);
        let mut multi = MultiThresholdPersistenceFilter::new(&config);

        let result = multi.update(PersistenceBucket::Subtle, "trunk_flexion_left", true, 0);
        assert_eq!(result, Err(PersistenceError::UnknownBucket(PersistenceBucket::Subtle)));
        assert!(multi.filter(PersistenceBucket::Subtle).is_none());
        assert!(multi.confirmed_keys().is_empty());
        assert!(multi.update(PersistenceBucket::Compensatory, "k", true, 0).is_ok());
    }

    #[test]
    fn test_default_windows() {
        let config = PersistenceConfig::default();
        assert_eq!(config.windows_ms[&PersistenceBucket::Compensatory], 400);
        assert_eq!(config.windows_ms[&PersistenceBucket::HighRisk], 300);
        assert_eq!(config.windows_ms[&PersistenceBucket::Subtle], 500);
        assert_eq!(config.reset_timeout_ms, 1000);
    }
}
