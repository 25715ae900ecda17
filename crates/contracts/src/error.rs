//! Layered error definitions
//!
//! Categorized by source: config / input / collaborator / replay

use thiserror::Error;

use crate::Time;

/// Unified error type
#[derive(Debug, Error)]
pub enum FusionError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Input Errors =====
    /// Timestamp is NaN or infinite
    #[error("invalid timestamp {timestamp} from sensor '{sensor}'")]
    InvalidTimestamp { sensor: String, timestamp: f64 },

    /// Timestamp is older than every retained state and cannot be replayed
    #[error(
        "timestamp {timestamp} from sensor '{sensor}' is older than the oldest retained state at {oldest}"
    )]
    UnreplayableTimestamp {
        sensor: String,
        timestamp: Time,
        oldest: Time,
    },

    /// An operation that needs at least one element got none
    #[error("empty input for '{label}'")]
    EmptyInput { label: String },

    /// Sensor handle is not present in the registry
    #[error("unknown sensor handle #{handle}")]
    UnknownSensor { handle: usize },

    /// Sensor name registered twice
    #[error("sensor '{name}' is already registered")]
    DuplicateSensor { name: String },

    /// Payload variant does not match what the collaborator expects
    #[error("sensor '{sensor}' expected a {expected} payload, got {actual}")]
    PayloadMismatch {
        sensor: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// Matrix dimensions do not match the model
    #[error("dimension mismatch for '{label}': expected {expected}, got {actual}")]
    DimensionMismatch {
        label: String,
        expected: usize,
        actual: usize,
    },

    /// Measurement arrived before the filter was initialized
    #[error("filter not initialized, measurement from sensor '{sensor}' rejected")]
    NotInitialized { sensor: String },

    // ===== Collaborator / Replay Errors =====
    /// Propagation or update collaborator failed
    #[error("collaborator for sensor '{sensor}' failed: {message}")]
    Collaborator { sensor: String, message: String },

    /// Replay could not be completed, the buffer was left untouched
    #[error("replay from index {from_index} aborted: {message}")]
    ReplayInconsistency { from_index: usize, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl FusionError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create collaborator error
    pub fn collaborator(sensor: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Collaborator {
            sensor: sensor.into(),
            message: message.into(),
        }
    }

    /// Create dimension mismatch error
    pub fn dimension_mismatch(label: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            label: label.into(),
            expected,
            actual,
        }
    }

    /// Short stable label, used as a metrics dimension
    pub fn reason(&self) -> &'static str {
        match self {
            Self::ConfigParse { .. } => "config_parse",
            Self::ConfigValidation { .. } => "config_validation",
            Self::InvalidTimestamp { .. } => "invalid_timestamp",
            Self::UnreplayableTimestamp { .. } => "unreplayable",
            Self::EmptyInput { .. } => "empty_input",
            Self::UnknownSensor { .. } => "unknown_sensor",
            Self::DuplicateSensor { .. } => "duplicate_sensor",
            Self::PayloadMismatch { .. } => "payload_mismatch",
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::NotInitialized { .. } => "not_initialized",
            Self::Collaborator { .. } => "collaborator",
            Self::ReplayInconsistency { .. } => "replay_aborted",
            Self::Io(_) => "io",
            Self::Other(_) => "other",
        }
    }

    /// Whether the error was caused by the caller's input rather than the filter
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidTimestamp { .. }
                | Self::UnreplayableTimestamp { .. }
                | Self::EmptyInput { .. }
                | Self::UnknownSensor { .. }
                | Self::PayloadMismatch { .. }
                | Self::NotInitialized { .. }
        )
    }
}
