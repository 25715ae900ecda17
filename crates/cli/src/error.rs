//! Error types for the replay pipeline.

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Measurement log not found
    #[error("Input log not found: {path}")]
    InputNotFound { path: String },

    /// A log line could not be decoded
    #[error("Malformed record at line {line}: {message}")]
    MalformedRecord { line: usize, message: String },

    /// A record names a sensor missing from the configuration
    #[error("Record at line {line} names unknown sensor '{sensor}'")]
    UnknownSensor { line: usize, sensor: String },

    /// The filter could not be built from the configuration
    #[error("Failed to build fusion core: {0}")]
    Core(#[from] contracts::FusionError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn input_not_found(path: impl Into<String>) -> Self {
        Self::InputNotFound { path: path.into() }
    }

    pub fn malformed_record(line: usize, message: impl Into<String>) -> Self {
        Self::MalformedRecord {
            line,
            message: message.into(),
        }
    }

    /// Whether the pipeline may skip the offending record and continue
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MalformedRecord { .. } | Self::UnknownSensor { .. })
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        assert!(CliError::malformed_record(3, "bad json").is_recoverable());
        assert!(!CliError::input_not_found("log.jsonl").is_recoverable());
        let text = CliError::malformed_record(3, "bad json").to_string();
        assert!(text.contains("line 3"));
    }
}
