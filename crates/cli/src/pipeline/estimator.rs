//! Estimation loop state: owns the fusion core and turns log records into inserts.

use std::collections::HashMap;
use std::time::Instant;

use contracts::{
    FusionConfig, FusionError, ImuMeasurement, MeasurementPayload, MountingConfig, SensorHandle,
    StateSnapshot, Time,
};
use fusion_core::models::{build_core, StaticInitializer};
use fusion_core::FusionCore;
use nalgebra::{Quaternion, UnitQuaternion, Vector3, Vector4};
use numeric_kernel::{euler_from_rotation, quaternion_from_wxyz, transform_imu, transform_imu_with_history};
use observability::{record_insert, record_insert_latency_us, record_rejection, FusionMetricsAggregator};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::record::InputRecord;
use crate::error::{CliError, Result};

/// Moves IMU readings from the sensor frame into the body frame
#[derive(Debug, Clone)]
struct ImuMounting {
    /// Body origin in the sensor frame
    p_sb: Vector3<f64>,
    /// Body frame relative to the sensor frame
    q_sb: UnitQuaternion<f64>,
    previous: Option<(f64, ImuMeasurement)>,
}

impl ImuMounting {
    fn from_config(mounting: &MountingConfig) -> Self {
        let q_bs = quaternion_from_wxyz(&Vector4::from(mounting.rotation));
        let q_sb = q_bs.inverse();
        Self {
            p_sb: -(q_sb * Vector3::from(mounting.translation)),
            q_sb,
            previous: None,
        }
    }

    fn apply(&mut self, t: f64, reading: &ImuMeasurement) -> ImuMeasurement {
        let body = match &self.previous {
            Some((t_prev, prev)) => {
                transform_imu_with_history(prev, reading, t - t_prev, &self.p_sb, &self.q_sb)
            }
            None => transform_imu(reading, &self.p_sb, &self.q_sb),
        };
        if self.previous.as_ref().is_none_or(|(t_prev, _)| t > *t_prev) {
            self.previous = Some((t, *reading));
        }
        body
    }
}

/// One estimated pose
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrajectoryPoint {
    pub t: f64,
    pub position: [f64; 3],
    pub velocity: [f64; 3],
    /// Roll, pitch, yaw (rad)
    pub euler: [f64; 3],
    /// Orientation `[w, x, y, z]`
    pub orientation: [f64; 4],
    /// Position standard deviation (m)
    pub position_std: [f64; 3],
}

impl TrajectoryPoint {
    fn from_snapshot(t: Time, snapshot: &StateSnapshot) -> Self {
        let core = &snapshot.core;
        let euler = euler_from_rotation(core.orientation.to_rotation_matrix().matrix());
        let q: &Quaternion<f64> = core.orientation.quaternion();
        let std = |i: usize| snapshot.covariance[(i, i)].max(0.0).sqrt();
        Self {
            t: t.as_secs(),
            position: core.position.into(),
            velocity: core.velocity.into(),
            euler: euler.into(),
            orientation: [q.w, q.i, q.j, q.k],
            position_std: [std(0), std(1), std(2)],
        }
    }
}

/// Estimation loop state
pub struct Estimator {
    core: FusionCore,
    propagation: SensorHandle,
    initializer: StaticInitializer,
    mountings: HashMap<SensorHandle, ImuMounting>,
    trajectory: Vec<TrajectoryPoint>,
    metrics: FusionMetricsAggregator,
}

impl Estimator {
    pub fn new(config: &FusionConfig) -> Result<Self> {
        let core = build_core(config)?;
        let propagation = core
            .sensor(config.core.propagation_sensor.as_str())
            .ok_or_else(|| {
                FusionError::config_validation(
                    "core.propagation_sensor",
                    "propagation sensor was not registered",
                )
            })?;

        let mut mountings = HashMap::new();
        for sensor in &config.sensors {
            let Some(mounting) = &sensor.mounting else {
                continue;
            };
            if sensor.name == config.core.propagation_sensor {
                mountings.insert(propagation, ImuMounting::from_config(mounting));
            } else {
                warn!(sensor = %sensor.name, "Mounting is only applied to the propagation IMU, ignoring");
            }
        }

        Ok(Self {
            core,
            propagation,
            initializer: StaticInitializer::new(config.init.clone()),
            mountings,
            trajectory: Vec::new(),
            metrics: FusionMetricsAggregator::new(),
        })
    }

    /// Feed one record.
    ///
    /// Insert failures are counted and logged, never returned; only records
    /// that cannot be mapped onto a sensor are errors.
    pub fn process(&mut self, record: InputRecord) -> Result<()> {
        let handle = self
            .core
            .sensor(&record.sensor)
            .ok_or_else(|| CliError::UnknownSensor {
                line: record.line,
                sensor: record.sensor.clone(),
            })?;
        observability::record_record_received(&record.sensor);

        let payload = match (record.data.into_payload(), self.mountings.get_mut(&handle)) {
            (MeasurementPayload::Imu(reading), Some(mounting)) => {
                MeasurementPayload::Imu(mounting.apply(record.t, &reading))
            }
            (payload, _) => payload,
        };

        if !self.core.is_initialized() && handle == self.propagation {
            return self.collect_init_sample(record.t, &payload);
        }

        let t = Time::from_secs(record.t);
        let started = Instant::now();
        let result = self.core.insert(handle, t, payload);
        record_insert_latency_us(started.elapsed().as_secs_f64() * 1e6);

        match result {
            Ok(outcome) => {
                record_insert(&outcome);
                self.metrics.update(&outcome);
                if let Some(replay) = &outcome.replay {
                    debug!(
                        line = record.line,
                        sensor = %record.sensor,
                        from_index = replay.from_index,
                        superseded = replay.superseded_states,
                        "Late measurement replayed"
                    );
                }
                if handle == self.propagation {
                    if let Some((t, snapshot)) = self.core.latest_snapshot() {
                        self.trajectory.push(TrajectoryPoint::from_snapshot(t, snapshot));
                    }
                }
            }
            Err(err) => {
                record_rejection(&record.sensor, &err);
                self.metrics.record_rejection(&err);
                debug!(line = record.line, error = %err, "Record rejected");
            }
        }
        Ok(())
    }

    fn collect_init_sample(&mut self, t: f64, payload: &MeasurementPayload) -> Result<()> {
        let Some(reading) = payload.as_imu() else {
            return Ok(());
        };
        if !self.initializer.push(*reading) {
            return Ok(());
        }

        let snapshot = self.initializer.snapshot()?;
        self.core.initialize(Time::from_secs(t), snapshot.clone())?;
        self.trajectory
            .push(TrajectoryPoint::from_snapshot(Time::from_secs(t), &snapshot));
        info!(
            samples = self.initializer.sample_count(),
            timestamp = t,
            "Filter initialized from static IMU readings"
        );
        Ok(())
    }

    pub fn core(&self) -> &FusionCore {
        &self.core
    }

    pub fn trajectory(&self) -> &[TrajectoryPoint] {
        &self.trajectory
    }

    pub fn metrics(&self) -> &FusionMetricsAggregator {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::record::RecordData;
    use approx::assert_relative_eq;
    use contracts::{
        BufferConfig, ConfigVersion, CoreConfig, CovarianceConfig, ImuNoiseConfig, InitConfig,
        SensorConfig, SensorKind,
    };

    fn config(static_samples: usize) -> FusionConfig {
        FusionConfig {
            version: ConfigVersion::V1,
            buffer: BufferConfig::default(),
            covariance: CovarianceConfig::default(),
            core: CoreConfig {
                propagation_sensor: "imu".into(),
                gravity: 9.81,
                matexp_order: 4,
                reject_invalid_updates: false,
                imu_noise: ImuNoiseConfig::default(),
            },
            init: InitConfig {
                static_samples,
                ..InitConfig::default()
            },
            sensors: vec![
                SensorConfig {
                    name: "imu".into(),
                    kind: SensorKind::Imu,
                    noise_std: None,
                    mounting: None,
                },
                SensorConfig {
                    name: "gps".into(),
                    kind: SensorKind::Position,
                    noise_std: Some([0.5; 3]),
                    mounting: None,
                },
            ],
        }
    }

    fn imu(line: usize, t: f64) -> InputRecord {
        InputRecord {
            line,
            t,
            sensor: "imu".into(),
            data: RecordData::Imu {
                acc: [0.0, 0.0, 9.81],
                gyro: [0.0; 3],
            },
        }
    }

    fn gps(line: usize, t: f64, position: [f64; 3]) -> InputRecord {
        InputRecord {
            line,
            t,
            sensor: "gps".into(),
            data: RecordData::Position(position),
        }
    }

    #[test]
    fn test_initializes_after_static_samples() {
        let mut estimator = Estimator::new(&config(3)).unwrap();
        estimator.process(imu(1, 0.00)).unwrap();
        estimator.process(imu(2, 0.01)).unwrap();
        assert!(!estimator.core().is_initialized());

        // position fixes before initialization are rejected, not fatal
        estimator.process(gps(3, 0.015, [0.0; 3])).unwrap();
        assert_eq!(estimator.metrics().rejections.get("not_initialized"), Some(&1));

        estimator.process(imu(4, 0.02)).unwrap();
        assert!(estimator.core().is_initialized());
        assert_eq!(estimator.trajectory().len(), 1);
    }

    #[test]
    fn test_late_fix_is_replayed() {
        let mut estimator = Estimator::new(&config(1)).unwrap();
        for (i, t) in [0.0, 0.1, 0.2, 0.3].into_iter().enumerate() {
            estimator.process(imu(i + 1, t)).unwrap();
        }
        estimator.process(gps(5, 0.15, [0.2, 0.0, 0.0])).unwrap();

        let metrics = estimator.metrics();
        assert_eq!(metrics.out_of_order, 1);
        assert_eq!(metrics.replays, 1);
        assert!(estimator.core().buffer().is_sorted());
    }

    #[test]
    fn test_unknown_sensor_is_recoverable_error() {
        let mut estimator = Estimator::new(&config(1)).unwrap();
        let mut record = gps(9, 0.0, [0.0; 3]);
        record.sensor = "lidar".into();
        let err = estimator.process(record).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_mounting_rotates_into_body_frame() {
        // sensor x axis points along body y
        let mounting = MountingConfig {
            translation: [0.0; 3],
            rotation: [
                std::f64::consts::FRAC_1_SQRT_2,
                0.0,
                0.0,
                std::f64::consts::FRAC_1_SQRT_2,
            ],
        };
        let mut mounting = ImuMounting::from_config(&mounting);
        let reading = ImuMeasurement::new(Vector3::new(1.0, 0.0, 0.0), Vector3::zeros());
        let body = mounting.apply(0.0, &reading);
        assert_relative_eq!(
            body.linear_acceleration,
            Vector3::new(0.0, 1.0, 0.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_trajectory_point_from_snapshot() {
        let snapshot = StateSnapshot::new(
            contracts::CoreState::default(),
            nalgebra::DMatrix::identity(15, 15) * 4.0,
        );
        let point = TrajectoryPoint::from_snapshot(Time::from_secs(1.5), &snapshot);
        assert_eq!(point.t, 1.5);
        assert_eq!(point.orientation, [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(point.position_std, [2.0; 3]);
    }
}
