//! Pipeline configuration
//!
//! Every tunable of the simulator, history buffer and analyzer lives here with
//! its default. Configurations round-trip through JSON so a monitor can be
//! started from a file.

use crate::error::PulseError;
use crate::window::DEFAULT_WINDOW_MS;
use serde::{Deserialize, Serialize};

/// Default history capacity (readings)
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Default alert log capacity
pub const DEFAULT_ALERT_LOG_CAPACITY: usize = 50;

/// Default number of consecutive readings a pattern must hold for
pub const DEFAULT_CONDITION_POINTS: usize = 8;

/// Largest accepted interval window (ms)
pub const MAX_IBI_WINDOW_MS: f64 = 600_000.0;

/// Largest accepted state dwell (seconds)
pub const MAX_STATE_DWELL_SECS: u64 = 86_400;

/// Largest accepted history or alert log capacity
pub const MAX_CAPACITY: usize = 100_000;

/// Largest accepted cooldown or dedup window (seconds)
pub const MAX_ANALYZER_WINDOW_SECS: i64 = 86_400;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub simulator: SimulatorConfig,
    pub history: HistoryConfig,
    pub analyzer: AnalyzerConfig,
}

/// Signal simulator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Time span of the interval window used for HR and SDNN (ms)
    pub ibi_window_ms: f64,
    /// Shortest dwell in one hidden state (seconds)
    pub min_state_dwell_secs: u64,
    /// Longest dwell in one hidden state (seconds)
    pub max_state_dwell_secs: u64,
    /// Pause after a failed beat before retrying (ms)
    pub beat_retry_backoff_ms: u64,
    /// Pause after a failed state transition before retrying (seconds)
    pub state_retry_backoff_secs: u64,
    /// Fixed RNG seed for reproducible runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            ibi_window_ms: DEFAULT_WINDOW_MS,
            min_state_dwell_secs: 30,
            max_state_dwell_secs: 90,
            beat_retry_backoff_ms: 1_000,
            state_retry_backoff_secs: 10,
            seed: None,
        }
    }
}

/// History buffer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum number of readings retained
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// Thresholds for the high-stress pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighStressThresholds {
    /// Heart rate must be above this (bpm)
    pub min_heart_rate: f64,
    /// SDNN must be below this (ms)
    pub max_hrv: f64,
    /// EDA must be above this (µS)
    pub min_eda: f64,
}

impl Default for HighStressThresholds {
    fn default() -> Self {
        Self {
            min_heart_rate: 95.0,
            max_hrv: 30.0,
            min_eda: 7.0,
        }
    }
}

/// Thresholds for the low heart rate pattern. Disabled while unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LowHeartRateThresholds {
    /// Heart rate must be below this (bpm)
    pub max_heart_rate: Option<f64>,
}

/// Thresholds for the calm recovery pattern. Disabled unless both are set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalmRecoveryThresholds {
    /// Heart rate must be below this (bpm)
    pub max_heart_rate: Option<f64>,
    /// SDNN must be above this (ms)
    pub min_hrv: Option<f64>,
}

/// Alert analyzer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Number of most recent readings a pattern must hold for
    pub condition_points: usize,
    /// Minimum spacing between two alerts of the same type (seconds)
    pub cooldown_secs: i64,
    /// Same-title alerts younger than this suppress a new one (seconds)
    pub dedup_window_secs: i64,
    /// Maximum number of alerts retained
    pub log_capacity: usize,
    pub high_stress: HighStressThresholds,
    pub low_heart_rate: LowHeartRateThresholds,
    pub calm_recovery: CalmRecoveryThresholds,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            condition_points: DEFAULT_CONDITION_POINTS,
            cooldown_secs: 120,
            dedup_window_secs: 10,
            log_capacity: DEFAULT_ALERT_LOG_CAPACITY,
            high_stress: HighStressThresholds::default(),
            low_heart_rate: LowHeartRateThresholds::default(),
            calm_recovery: CalmRecoveryThresholds::default(),
        }
    }
}

impl MonitorConfig {
    /// Load and validate a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, PulseError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to pretty JSON
    pub fn to_json(&self) -> Result<String, PulseError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), PulseError> {
        let sim = &self.simulator;
        if !(sim.ibi_window_ms > 0.0 && sim.ibi_window_ms <= MAX_IBI_WINDOW_MS) {
            return Err(PulseError::InvalidConfig(format!(
                "simulator.ibi_window_ms must be in (0, {}]",
                MAX_IBI_WINDOW_MS
            )));
        }
        if sim.min_state_dwell_secs == 0 || sim.min_state_dwell_secs > sim.max_state_dwell_secs {
            return Err(PulseError::InvalidConfig(format!(
                "state dwell range {}..={} s is empty",
                sim.min_state_dwell_secs, sim.max_state_dwell_secs
            )));
        }
        if sim.max_state_dwell_secs > MAX_STATE_DWELL_SECS {
            return Err(PulseError::InvalidConfig(format!(
                "simulator.max_state_dwell_secs must be at most {}",
                MAX_STATE_DWELL_SECS
            )));
        }

        if !(1..=MAX_CAPACITY).contains(&self.history.capacity) {
            return Err(PulseError::InvalidConfig(format!(
                "history.capacity must be in 1..={}",
                MAX_CAPACITY
            )));
        }

        let analyzer = &self.analyzer;
        if analyzer.condition_points == 0 {
            return Err(PulseError::InvalidConfig(
                "analyzer.condition_points must be at least 1".to_string(),
            ));
        }
        if analyzer.condition_points > self.history.capacity {
            return Err(PulseError::InvalidConfig(format!(
                "analyzer.condition_points ({}) exceeds history.capacity ({})",
                analyzer.condition_points, self.history.capacity
            )));
        }
        if !(1..=MAX_CAPACITY).contains(&analyzer.log_capacity) {
            return Err(PulseError::InvalidConfig(format!(
                "analyzer.log_capacity must be in 1..={}",
                MAX_CAPACITY
            )));
        }
        let windows = 0..=MAX_ANALYZER_WINDOW_SECS;
        if !windows.contains(&analyzer.cooldown_secs)
            || !windows.contains(&analyzer.dedup_window_secs)
        {
            return Err(PulseError::InvalidConfig(format!(
                "analyzer time windows must be in 0..={} s",
                MAX_ANALYZER_WINDOW_SECS
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_are_valid() {
        let config = MonitorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.history.capacity, 100);
        assert_eq!(config.analyzer.log_capacity, 50);
        assert_eq!(config.analyzer.condition_points, 8);
        assert_eq!(config.analyzer.cooldown_secs, 120);
        assert_eq!(config.analyzer.low_heart_rate.max_heart_rate, None);
    }

    #[test]
    fn test_json_roundtrip() {
        let mut config = MonitorConfig::default();
        config.simulator.seed = Some(7);
        config.analyzer.low_heart_rate.max_heart_rate = Some(50.0);

        let json = config.to_json().unwrap();
        let loaded = MonitorConfig::from_json(&json).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = MonitorConfig::from_json(r#"{"analyzer": {"cooldown_secs": 30}}"#).unwrap();
        assert_eq!(config.analyzer.cooldown_secs, 30);
        assert_eq!(config.analyzer.dedup_window_secs, 10);
        assert_eq!(config.history, HistoryConfig::default());
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let mut config = MonitorConfig::default();
        config.simulator.min_state_dwell_secs = 100;
        assert!(matches!(config.validate(), Err(PulseError::InvalidConfig(_))));

        let mut config = MonitorConfig::default();
        config.history.capacity = 4;
        assert!(config.validate().is_err());

        assert!(matches!(
            MonitorConfig::from_json("not json"),
            Err(PulseError::JsonError(_))
        ));
    }

    #[test]
    fn test_out_of_range_windows_rejected() {
        let mut config = MonitorConfig::default();
        config.analyzer.cooldown_secs = i64::MAX;
        assert!(matches!(config.validate(), Err(PulseError::InvalidConfig(_))));

        let mut config = MonitorConfig::default();
        config.analyzer.dedup_window_secs = MAX_ANALYZER_WINDOW_SECS + 1;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.analyzer.cooldown_secs = MAX_ANALYZER_WINDOW_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_out_of_range_sizes_rejected() {
        let mut config = MonitorConfig::default();
        config.simulator.max_state_dwell_secs = u64::MAX;
        assert!(matches!(config.validate(), Err(PulseError::InvalidConfig(_))));

        let mut config = MonitorConfig::default();
        config.simulator.ibi_window_ms = f64::INFINITY;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.simulator.ibi_window_ms = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.history.capacity = usize::MAX;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.analyzer.log_capacity = MAX_CAPACITY + 1;
        assert!(config.validate().is_err());
    }
}
