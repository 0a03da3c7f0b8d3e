//! Monitor orchestration
//!
//! This module provides the public entry point for Synheart Pulse. It wires
//! the simulator, history buffer and alert analyzer into one pipeline and
//! exposes the views a presentation layer consumes.

use crate::analyzer::AlertAnalyzer;
use crate::config::MonitorConfig;
use crate::error::PulseError;
use crate::history::{HistoryBuffer, Snapshot};
use crate::simulator::SignalSimulator;
use crate::types::{Alert, SensorReading, SimulationState};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Sensor and alert pipelines driven together.
///
/// # Example
/// ```ignore
/// let monitor = Monitor::new(MonitorConfig::default())?;
/// monitor.start_monitoring();
/// let mut alerts = monitor.subscribe_alerts();
/// alerts.changed().await?;
/// monitor.stop_monitoring().await;
/// ```
pub struct Monitor {
    sensors: HistoryBuffer,
    alerts: AlertAnalyzer,
}

impl Monitor {
    /// Build the pipeline from a validated configuration. Must be called
    /// inside a tokio runtime.
    pub fn new(config: MonitorConfig) -> Result<Self, PulseError> {
        config.validate()?;

        let simulator = Arc::new(SignalSimulator::new(config.simulator));
        let sensors = HistoryBuffer::new(simulator, config.history);
        let alerts = AlertAnalyzer::for_history(&sensors, &config.analyzer);

        Ok(Self { sensors, alerts })
    }

    /// Sensor pipeline (simulator and history)
    pub fn sensors(&self) -> &HistoryBuffer {
        &self.sensors
    }

    /// Alert pipeline
    pub fn alerts(&self) -> &AlertAnalyzer {
        &self.alerts
    }

    /// Start the analyzer, then the simulator. Idempotent.
    pub fn start_monitoring(&self) {
        self.alerts.start_monitoring();
        self.sensors.start_monitoring();
        info!("Monitoring started");
    }

    /// Stop the simulator, then the analyzer. History and alerts are kept.
    pub async fn stop_monitoring(&self) {
        self.sensors.stop_monitoring().await;
        self.alerts.stop_monitoring().await;
        info!("Monitoring stopped");
    }

    pub fn is_running(&self) -> bool {
        self.sensors.simulator().is_running() || self.alerts.is_running()
    }

    /// Latest reading, `None` before the first beat
    pub fn current_reading(&self) -> Option<SensorReading> {
        self.sensors.current_reading()
    }

    /// Hidden state currently driving the simulator
    pub fn simulation_state(&self) -> SimulationState {
        self.sensors.simulator().current_state()
    }

    /// Bounded reading history, oldest first
    pub fn history(&self) -> Snapshot<SensorReading> {
        self.sensors.snapshot()
    }

    /// Bounded alert log, oldest first
    pub fn alert_log(&self) -> Snapshot<Alert> {
        self.alerts.alerts()
    }

    pub fn subscribe_current(&self) -> watch::Receiver<Option<SensorReading>> {
        self.sensors.subscribe_current()
    }

    pub fn subscribe_history(&self) -> watch::Receiver<Snapshot<SensorReading>> {
        self.sensors.subscribe()
    }

    pub fn subscribe_alerts(&self) -> watch::Receiver<Snapshot<Alert>> {
        self.alerts.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = MonitorConfig::default();
        config.analyzer.log_capacity = 0;
        assert!(matches!(
            Monitor::new(config),
            Err(PulseError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_unbounded_durations_rejected() {
        let mut config = MonitorConfig::default();
        config.analyzer.cooldown_secs = i64::MAX;
        assert!(matches!(
            Monitor::new(config),
            Err(PulseError::InvalidConfig(_))
        ));

        let mut config = MonitorConfig::default();
        config.simulator.max_state_dwell_secs = u64::MAX;
        assert!(matches!(
            Monitor::new(config),
            Err(PulseError::InvalidConfig(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stop_is_idempotent() {
        let monitor = Monitor::new(MonitorConfig::default()).unwrap();
        assert!(!monitor.is_running());
        assert!(monitor.current_reading().is_none());

        monitor.start_monitoring();
        monitor.start_monitoring();
        assert!(monitor.is_running());

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert!(monitor.current_reading().is_some());
        assert!(!monitor.history().is_empty());

        monitor.stop_monitoring().await;
        monitor.stop_monitoring().await;
        assert!(!monitor.is_running());
        assert_eq!(monitor.simulation_state(), SimulationState::Calm);
    }
}
