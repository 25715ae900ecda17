//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{FusionConfig, SensorKind};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    propagation_sensor: String,
    sensor_count: usize,
    max_entries: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    version: format!("{:?}", config.version),
                    propagation_sensor: config.core.propagation_sensor.to_string(),
                    sensor_count: config.sensors.len(),
                    max_entries: config.buffer.max_entries,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Non-fatal configuration issues
fn collect_warnings(config: &FusionConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.update_sensors().next().is_none() {
        warnings.push("No update sensors configured - the filter will dead-reckon".to_string());
    }

    for sensor in config.update_sensors() {
        if sensor.mounting.is_some() && sensor.kind == SensorKind::Position {
            warnings.push(format!(
                "Mounting of position sensor '{}' is ignored",
                sensor.name
            ));
        }
    }

    if config.buffer.max_span_s.is_none() {
        warnings.push("buffer.max_span_s is unset - only the entry count bounds the buffer".to_string());
    }

    if config.covariance.check_condition && !config.core.reject_invalid_updates {
        warnings.push(
            "covariance.check_condition is on but core.reject_invalid_updates is off - \
             ill-conditioned updates are only reported"
                .to_string(),
        );
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Propagation sensor: {}", summary.propagation_sensor);
            println!("  Sensors: {}", summary.sensor_count);
            println!("  Buffer entries: {}", summary.max_entries);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
