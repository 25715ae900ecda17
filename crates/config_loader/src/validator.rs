//! Config validation
//!
//! Rules:
//! - field ranges declared on the config types
//! - sensor names are non-empty and unique
//! - the propagation sensor exists and is the only IMU
//! - position sensors carry a positive noise_std
//! - mounting rotations are finite and non-zero

use std::collections::HashSet;

use contracts::{FusionConfig, FusionError, SensorKind};
use validator::Validate;

/// Validate a parsed config
///
/// Returns the first error encountered.
pub fn validate(config: &FusionConfig) -> Result<(), FusionError> {
    validate_ranges(config)?;
    validate_sensor_names(config)?;
    validate_propagation_sensor(config)?;
    validate_noise(config)?;
    validate_mountings(config)?;
    Ok(())
}

fn validate_ranges(config: &FusionConfig) -> Result<(), FusionError> {
    config
        .validate()
        .map_err(|errors| FusionError::config_validation("config", errors.to_string()))
}

fn validate_sensor_names(config: &FusionConfig) -> Result<(), FusionError> {
    if config.sensors.is_empty() {
        return Err(FusionError::config_validation(
            "sensors",
            "at least one sensor is required",
        ));
    }

    let mut seen = HashSet::new();
    for (idx, sensor) in config.sensors.iter().enumerate() {
        if sensor.name.is_empty() {
            return Err(FusionError::config_validation(
                format!("sensors[{idx}].name"),
                "sensor name cannot be empty",
            ));
        }
        if !seen.insert(sensor.name.as_str()) {
            return Err(FusionError::config_validation(
                format!("sensors[name={}]", sensor.name),
                "duplicate sensor name",
            ));
        }
    }
    Ok(())
}

fn validate_propagation_sensor(config: &FusionConfig) -> Result<(), FusionError> {
    let name = &config.core.propagation_sensor;
    let sensor = config.propagation_sensor().ok_or_else(|| {
        FusionError::config_validation(
            "core.propagation_sensor",
            format!("propagation sensor '{name}' not found in sensors"),
        )
    })?;

    if sensor.kind != SensorKind::Imu {
        return Err(FusionError::config_validation(
            "core.propagation_sensor",
            format!("propagation sensor '{name}' must be of kind imu"),
        ));
    }

    if let Some(extra) = config
        .update_sensors()
        .find(|s| s.kind == SensorKind::Imu)
    {
        return Err(FusionError::config_validation(
            format!("sensors[name={}].kind", extra.name),
            "only the propagation sensor may be an imu",
        ));
    }
    Ok(())
}

fn validate_noise(config: &FusionConfig) -> Result<(), FusionError> {
    for sensor in config.update_sensors() {
        let field = format!("sensors[name={}].noise_std", sensor.name);
        let std = sensor
            .noise_std
            .ok_or_else(|| FusionError::config_validation(&field, "required for position sensors"))?;
        if std.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(FusionError::config_validation(
                field,
                format!("every axis must be finite and > 0, got {std:?}"),
            ));
        }
    }
    Ok(())
}

fn validate_mountings(config: &FusionConfig) -> Result<(), FusionError> {
    for sensor in &config.sensors {
        let Some(mounting) = &sensor.mounting else {
            continue;
        };
        let finite = mounting
            .translation
            .iter()
            .chain(mounting.rotation.iter())
            .all(|v| v.is_finite());
        let norm = mounting.rotation.iter().map(|v| v * v).sum::<f64>().sqrt();
        if !finite || norm < 1e-9 {
            return Err(FusionError::config_validation(
                format!("sensors[name={}].mounting", sensor.name),
                "mounting must be finite with a non-zero rotation quaternion",
            ));
        }
    }
    Ok(())
}
