//! # Config Loader
//!
//! Loads the session configuration of the fusion core.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Validate field ranges and cross-sensor rules
//! - Produce a [`FusionConfig`]
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let config = ConfigLoader::load_from_path(Path::new("fusion.toml")).unwrap();
//! println!("propagation sensor: {}", config.core.propagation_sensor);
//! ```

mod parser;
mod validator;

pub use contracts::FusionConfig;
pub use parser::ConfigFormat;

use contracts::FusionError;
use std::path::Path;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file path
    ///
    /// The format is taken from the file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<FusionConfig, FusionError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load configuration from a string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<FusionConfig, FusionError> {
        Self::parse_and_validate(content, format)
    }

    /// Validate an already built configuration
    pub fn validate(config: &FusionConfig) -> Result<(), FusionError> {
        validator::validate(config)
    }

    pub fn to_toml(config: &FusionConfig) -> Result<String, FusionError> {
        toml::to_string_pretty(config)
            .map_err(|e| FusionError::config_parse(format!("TOML serialize error: {e}")))
    }

    pub fn to_json(config: &FusionConfig) -> Result<String, FusionError> {
        serde_json::to_string_pretty(config)
            .map_err(|e| FusionError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    fn detect_format(path: &Path) -> Result<ConfigFormat, FusionError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            FusionError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            FusionError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    fn read_file(path: &Path) -> Result<String, FusionError> {
        Ok(std::fs::read_to_string(path)?)
    }

    fn parse_and_validate(content: &str, format: ConfigFormat) -> Result<FusionConfig, FusionError> {
        let config = parser::parse(content, format)?;
        validator::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL_TOML: &str = r#"
[buffer]
max_entries = 200
max_span_s = 5.0

[core]
propagation_sensor = "imu"
matexp_order = 6

[core.imu_noise]
gyro_noise = 0.01
accel_noise = 0.05
gyro_bias_walk = 0.001
accel_bias_walk = 0.005

[init]
static_samples = 20
position = [1.0, 2.0, 0.0]

[[sensors]]
name = "imu"
kind = "imu"
[sensors.mounting]
translation = [0.0, 0.0, 0.1]

[[sensors]]
name = "gps"
kind = "position"
noise_std = [0.5, 0.5, 1.5]
"#;

    #[test]
    fn test_load_from_str_toml() {
        let config = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        assert_eq!(config.buffer.max_entries, 200);
        assert_eq!(config.buffer.max_span_s, Some(5.0));
        assert_eq!(config.core.matexp_order, 6);
        assert_eq!(config.init.static_samples, 20);
        assert_eq!(config.sensors.len(), 2);
    }

    #[test]
    fn test_round_trip_toml() {
        let config = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&config).unwrap();
        let again = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(config.core.propagation_sensor, again.core.propagation_sensor);
        assert_eq!(config.sensors[1].noise_std, again.sensors[1].noise_std);
    }

    #[test]
    fn test_round_trip_json() {
        let config = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&config).unwrap();
        let again = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(config.init.position, again.init.position);
    }

    #[test]
    fn test_validation_runs_after_parse() {
        // gps is missing its noise model
        let content = r#"
[core]
propagation_sensor = "imu"

[[sensors]]
name = "imu"
kind = "imu"

[[sensors]]
name = "gps"
kind = "position"
"#;
        let err = ConfigLoader::load_from_str(content, ConfigFormat::Toml).unwrap_err();
        assert!(matches!(err, FusionError::ConfigValidation { .. }));
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(MINIMAL_TOML.as_bytes()).unwrap();

        let config = ConfigLoader::load_from_path(file.path()).unwrap();
        assert_eq!(config.core.propagation_sensor, "imu");
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        assert!(matches!(
            ConfigLoader::load_from_path(file.path()),
            Err(FusionError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            ConfigLoader::load_from_path(&missing),
            Err(FusionError::Io(_))
        ));
    }
}
