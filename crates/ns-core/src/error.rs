//! Error types for the NextStudio DSP core
//!
//! Only control-plane boundaries return errors; the audio thread resolves all
//! failure modes locally (clamping, voice stealing, denormal flushing).

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(f64),

    #[error("Preset type mismatch: expected `{expected}`, found `{found}`")]
    PresetTypeMismatch { expected: String, found: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("State error: {0}")]
    State(String),
}

/// Result type alias
pub type EngineResult<T> = Result<T, EngineError>;
