//! Synheart Pulse - Simulated physiological signal engine for wellness monitoring
//!
//! Pulse synthesizes a wearable-style signal stream when no hardware is
//! attached, summarizes it into heart rate and HRV (SDNN), and raises
//! debounced alerts for sustained abnormal patterns:
//! signal simulation → bounded history → alert analysis → alert log.
//!
//! ## Modules
//!
//! - **Simulator**: hidden-state driven, self-paced beat generation
//! - **History**: bounded reading history published as snapshots
//! - **Analyzer**: edge-triggered pattern alerts with cooldown and dedup
//! - **Monitor**: the combined pipeline

pub mod analyzer;
pub mod config;
pub mod error;
pub mod history;
pub mod monitor;
pub mod simulator;
pub mod stats;
pub mod task;
pub mod types;
pub mod window;

pub use analyzer::{AlertAnalyzer, AlertEngine, AlertLog, PatternRule};
pub use config::MonitorConfig;
pub use error::PulseError;
pub use history::HistoryBuffer;
pub use monitor::Monitor;
pub use simulator::{SignalModel, SignalSimulator};
pub use types::{Alert, AlertKind, Movement, SensorReading, Severity, SimulationState};

/// Pulse version
pub const PULSE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "synheart-pulse";
