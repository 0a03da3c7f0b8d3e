//! Error types for Synheart Pulse

use thiserror::Error;

/// Errors that can occur while configuring or stepping the pipeline
#[derive(Debug, Error)]
pub enum PulseError {
    #[error("Non-finite {0} produced by the signal model")]
    NonFiniteSignal(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}
