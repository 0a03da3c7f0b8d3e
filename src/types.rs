//! Core types for the Synheart Pulse pipeline
//!
//! This module defines the values that flow between the pipeline stages:
//! simulated sensor readings, the hidden physiological state that drives the
//! simulator, and the alerts raised by the analyzer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Three-axis motion drift (arbitrary units)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Immutable snapshot emitted once per simulated beat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// When the reading was emitted (UTC)
    pub timestamp: DateTime<Utc>,
    /// Heart rate derived from the mean inter-beat interval (bpm)
    pub heart_rate: f64,
    /// Heart rate variability, SDNN over the interval window (ms)
    pub hrv: f64,
    /// Electrodermal activity (µS)
    pub eda: f64,
    /// Skin temperature (°C)
    pub skin_temp: f64,
    /// Motion drift
    pub movement: Movement,
}

/// Hidden physiological state driving the simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationState {
    Calm,
    MildStress,
    HighStress,
}

impl SimulationState {
    pub const ALL: [SimulationState; 3] = [
        SimulationState::Calm,
        SimulationState::MildStress,
        SimulationState::HighStress,
    ];

    /// Mean inter-beat interval the simulator is pulled toward (ms)
    pub fn target_ibi_ms(&self) -> f64 {
        match self {
            SimulationState::Calm => 850.0,
            SimulationState::MildStress => 700.0,
            SimulationState::HighStress => 560.0,
        }
    }

    /// Half-width of the uniform noise added to each interval (ms)
    pub fn ibi_variation_ms(&self) -> f64 {
        match self {
            SimulationState::Calm => 60.0,
            SimulationState::MildStress => 25.0,
            SimulationState::HighStress => 8.0,
        }
    }

    /// Electrodermal activity the simulator is pulled toward (µS)
    pub fn target_eda(&self) -> f64 {
        match self {
            SimulationState::Calm => 2.5,
            SimulationState::MildStress => 5.0,
            SimulationState::HighStress => 9.0,
        }
    }

    /// The two states a transition may move to
    pub fn others(&self) -> [SimulationState; 2] {
        match self {
            SimulationState::Calm => [SimulationState::MildStress, SimulationState::HighStress],
            SimulationState::MildStress => [SimulationState::Calm, SimulationState::HighStress],
            SimulationState::HighStress => [SimulationState::Calm, SimulationState::MildStress],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SimulationState::Calm => "calm",
            SimulationState::MildStress => "mild_stress",
            SimulationState::HighStress => "high_stress",
        }
    }
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Pattern type an alert was raised for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    HighStress,
    LowHeartRate,
    CalmRecovery,
}

impl AlertKind {
    pub fn severity(&self) -> Severity {
        match self {
            AlertKind::HighStress => Severity::High,
            AlertKind::LowHeartRate => Severity::Medium,
            AlertKind::CalmRecovery => Severity::Low,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            AlertKind::HighStress => "Elevated Stress Pattern",
            AlertKind::LowHeartRate => "Low Heart Rate",
            AlertKind::CalmRecovery => "Calm Period Detected",
        }
    }

    fn describe(&self, reading: &SensorReading) -> String {
        match self {
            AlertKind::HighStress => format!(
                "We noticed a combination of high heart rate ({} bpm), low variability \
                 (SDNN {:.1} ms) and high electrodermal activity (EDA {:.1} µS) recently. \
                 Take a deep breath.",
                reading.heart_rate.round() as i64,
                reading.hrv,
                reading.eda
            ),
            AlertKind::LowHeartRate => format!(
                "Your heart rate has stayed consistently below normal ({} bpm). \
                 Check in on how you are feeling.",
                reading.heart_rate.round() as i64
            ),
            AlertKind::CalmRecovery => format!(
                "Your indicators (HR {} bpm, SDNN {:.1} ms) suggest a period of \
                 relaxation or recovery. Great!",
                reading.heart_rate.round() as i64,
                reading.hrv
            ),
        }
    }
}

/// Immutable alert record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: AlertKind,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    /// Copy of the reading that completed the pattern
    pub reading: SensorReading,
}

impl Alert {
    /// Build an alert for `kind` from its triggering reading
    pub fn new(kind: AlertKind, reading: &SensorReading, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            kind,
            title: kind.title().to_string(),
            description: kind.describe(reading),
            severity: kind.severity(),
            reading: reading.clone(),
        }
    }
}
