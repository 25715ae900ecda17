//! Reference collaborators: strapdown IMU propagation, direct position
//! updates and static initialization.
//!
//! They share the 15-state core error layout from [`contracts::error_state`].

mod imu;
mod init;
mod position;

pub use imu::ImuPropagator;
pub use init::StaticInitializer;
pub use position::PositionUpdater;

use contracts::{FusionConfig, FusionError, SensorKind};

use crate::{EngineConfig, FusionCore};

/// Build a fusion core with the reference models for every configured sensor.
///
/// # Errors
/// `ConfigValidation` when the propagation sensor is missing or is not an
/// IMU, or a position sensor has no noise; `DuplicateSensor` for repeated names.
pub fn build_core(config: &FusionConfig) -> Result<FusionCore, FusionError> {
    let propagation = config.propagation_sensor().ok_or_else(|| {
        FusionError::config_validation(
            "core.propagation_sensor",
            format!("sensor '{}' is not configured", config.core.propagation_sensor),
        )
    })?;
    if propagation.kind != SensorKind::Imu {
        return Err(FusionError::config_validation(
            "core.propagation_sensor",
            format!("sensor '{}' must be an imu", propagation.name),
        ));
    }

    let mut core = FusionCore::new(EngineConfig::from(config));
    core.register_propagation_sensor(
        propagation.name.clone(),
        Box::new(ImuPropagator::new(propagation.name.clone(), &config.core)),
    )?;

    for sensor in config.update_sensors() {
        match sensor.kind {
            SensorKind::Position => {
                let noise_std = sensor.noise_std.ok_or_else(|| {
                    FusionError::config_validation(
                        format!("sensors.{}.noise_std", sensor.name),
                        "position sensors need a noise standard deviation",
                    )
                })?;
                let updater =
                    PositionUpdater::new(sensor.name.clone(), noise_std, config.covariance.clone());
                core.register_update_sensor(sensor.name.clone(), Box::new(updater))?;
            }
            SensorKind::Imu => {
                return Err(FusionError::config_validation(
                    format!("sensors.{}.kind", sensor.name),
                    "only one imu can drive propagation",
                ));
            }
        }
    }

    tracing::info!(
        sensors = core.registry().len(),
        propagation = %propagation.name,
        max_entries = config.buffer.max_entries,
        "Fusion core built"
    );
    Ok(core)
}
