//! # Integration Tests
//!
//! Cross-crate and end-to-end tests.
//!
//! Covers:
//! - config -> core construction
//! - replay correctness under arbitrary arrival order
//! - buffer bounds
//! - reader task -> channel -> estimator hand-off

#[cfg(test)]
mod support {
    use contracts::{
        BufferConfig, CoreState, FusionError, MeasurementPayload, MeasurementUpdater,
        PositionMeasurement, SensorHandle, StatePropagator, StateSnapshot, Time, UpdateOutcome,
    };
    use fusion_core::{EngineConfig, FusionCore};
    use nalgebra::{DMatrix, Vector3};

    /// Constant-velocity drift along x on a 3-state covariance
    pub struct Drift;

    impl StatePropagator for Drift {
        fn propagate(
            &self,
            prior: &StateSnapshot,
            _input: Option<&MeasurementPayload>,
            dt: f64,
        ) -> Result<StateSnapshot, FusionError> {
            let mut next = prior.clone();
            next.core.position.x += 0.5 * dt;
            next.covariance += DMatrix::identity(3, 3) * (0.2 * dt);
            Ok(next)
        }
    }

    /// Per-axis scalar Kalman update on position
    pub struct Fix {
        pub r: f64,
    }

    impl MeasurementUpdater for Fix {
        fn update(
            &self,
            prior: &StateSnapshot,
            measurement: &MeasurementPayload,
        ) -> Result<UpdateOutcome, FusionError> {
            let z = measurement
                .as_position()
                .ok_or(FusionError::PayloadMismatch {
                    sensor: "fix".into(),
                    expected: "position",
                    actual: measurement.shape_name(),
                })?
                .position;
            let mut next = prior.clone();
            for i in 0..3 {
                let p = prior.covariance[(i, i)];
                let k = p / (p + self.r);
                next.core.position[i] += k * (z[i] - prior.core.position[i]);
                next.covariance[(i, i)] = (1.0 - k) * p;
            }
            Ok(UpdateOutcome {
                snapshot: next,
                valid: true,
            })
        }
    }

    pub struct Session {
        pub core: FusionCore,
        pub drive: SensorHandle,
        pub gps: SensorHandle,
        pub baro: SensorHandle,
    }

    pub fn session(t0: f64, buffer: BufferConfig) -> Session {
        let mut core = FusionCore::new(EngineConfig {
            buffer,
            reject_invalid_updates: false,
        });
        let drive = core
            .register_propagation_sensor("drive", Box::new(Drift))
            .unwrap();
        let gps = core
            .register_update_sensor("gps", Box::new(Fix { r: 0.5 }))
            .unwrap();
        let baro = core
            .register_update_sensor("baro", Box::new(Fix { r: 2.0 }))
            .unwrap();
        core.initialize(
            Time::from_secs(t0),
            StateSnapshot::new(CoreState::default(), DMatrix::identity(3, 3)),
        )
        .unwrap();
        Session {
            core,
            drive,
            gps,
            baro,
        }
    }

    pub fn unbounded() -> BufferConfig {
        BufferConfig {
            max_entries: 10_000,
            max_span_s: None,
        }
    }

    pub fn fix(x: f64, y: f64) -> MeasurementPayload {
        PositionMeasurement::new(Vector3::new(x, y, 0.0)).into()
    }

    /// Every checkpoint with its timestamp, in buffer order
    pub fn checkpoints(core: &FusionCore) -> Vec<(Time, StateSnapshot)> {
        core.query(|e| e.is_state())
            .into_iter()
            .filter_map(|e| e.snapshot().map(|s| (e.timestamp(), s.clone())))
            .collect()
    }
}

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::SensorRole;
    use fusion_core::models::build_core;

    const CONFIG: &str = r#"
[buffer]
max_entries = 64

[core]
propagation_sensor = "imu"

[[sensors]]
name = "imu"
kind = "imu"

[[sensors]]
name = "gps"
kind = "position"
noise_std = [0.5, 0.5, 1.0]
"#;

    #[test]
    fn test_config_builds_core() {
        let config = ConfigLoader::load_from_str(CONFIG, ConfigFormat::Toml).unwrap();
        let core = build_core(&config).unwrap();

        assert!(!core.is_initialized());
        assert_eq!(core.registry().len(), 2);
        let imu = core.sensor("imu").unwrap();
        let gps = core.sensor("gps").unwrap();
        assert_eq!(core.registry().descriptor(imu).unwrap().role, SensorRole::Propagation);
        assert_eq!(core.registry().descriptor(gps).unwrap().role, SensorRole::Update);
    }
}

#[cfg(test)]
mod replay_tests {
    use super::support::*;
    use contracts::{Arrival, BufferConfig, Time};
    use fusion_core::EntryKind;
    use rand::seq::SliceRandom;
    use rand::Rng;

    /// A late fix is tagged, spliced ahead of the newer checkpoint, and the
    /// newer checkpoint is regenerated with the correction upstream of it.
    #[test]
    fn test_late_measurement_regenerates_newer_checkpoint() {
        let mut s = session(90.0, unbounded());
        s.core
            .insert(s.gps, Time::from_secs(100.0), fix(4.0, 0.0))
            .unwrap();
        let (_, original) = s.core.latest_snapshot().map(|(t, p)| (t, p.clone())).unwrap();

        let outcome = s
            .core
            .insert(s.gps, Time::from_secs(95.0), fix(3.0, 1.0))
            .unwrap();

        assert_eq!(outcome.arrival, Arrival::OutOfOrder);
        let late = s.core.buffer().get(outcome.index).unwrap();
        assert_eq!(late.kind(), EntryKind::MeasurementOutOfOrder);
        assert_eq!(late.timestamp(), Time::from_secs(95.0));

        let newer = s
            .core
            .buffer()
            .iter()
            .position(|e| e.timestamp() == Time::from_secs(100.0))
            .unwrap();
        assert!(outcome.index < newer);

        let (t, regenerated) = s.core.latest_snapshot().unwrap();
        assert_eq!(t, Time::from_secs(100.0));
        assert_ne!(regenerated, &original);
        assert!(regenerated.core.position.y > 0.0);
        assert!(regenerated.covariance[(1, 1)] < original.covariance[(1, 1)]);
    }

    #[test]
    fn test_reordered_arrival_matches_sorted() {
        let mut shuffled = session(0.0, unbounded());
        for t in [5.0, 10.0, 7.0] {
            shuffled
                .core
                .insert(shuffled.gps, Time::from_secs(t), fix(t, 0.0))
                .unwrap();
        }

        let mut sorted = session(0.0, unbounded());
        for t in [5.0, 7.0, 10.0] {
            sorted
                .core
                .insert(sorted.gps, Time::from_secs(t), fix(t, 0.0))
                .unwrap();
        }

        assert_eq!(checkpoints(&shuffled.core), checkpoints(&sorted.core));
    }

    #[test]
    fn test_random_arrival_matches_sorted() {
        let mut rng = rand::rng();

        for _ in 0..20 {
            // distinct timestamps across three sensors
            let mut events: Vec<(f64, usize, f64)> = (1..=30)
                .map(|i| {
                    let t = i as f64 * 0.1 + rng.random_range(0.0..0.05);
                    (t, rng.random_range(0..3), rng.random_range(-5.0..5.0))
                })
                .collect();
            let ordered = events.clone();
            events.shuffle(&mut rng);

            let mut arrived = session(0.0, unbounded());
            let mut reference = session(0.0, unbounded());
            for (s, stream) in [(&mut arrived, &events), (&mut reference, &ordered)] {
                for &(t, sensor, x) in stream.iter() {
                    let handle = [s.drive, s.gps, s.baro][sensor];
                    s.core.insert(handle, Time::from_secs(t), fix(x, -x)).unwrap();
                    assert!(s.core.buffer().is_sorted());
                }
            }

            assert_eq!(checkpoints(&arrived.core), checkpoints(&reference.core));
            assert_eq!(arrived.core.buffer().len(), reference.core.buffer().len());
        }
    }

    #[test]
    fn test_every_entry_is_state_or_measurement() {
        let mut s = session(0.0, unbounded());
        for t in [3.0, 1.0, 2.0, 4.0] {
            s.core.insert(s.gps, Time::from_secs(t), fix(t, 0.0)).unwrap();
        }
        s.core.insert(s.drive, Time::from_secs(2.5), fix(0.0, 0.0)).unwrap();

        for entry in s.core.buffer().iter() {
            assert_ne!(entry.is_state(), entry.is_measurement());
        }
    }

    #[test]
    fn test_bound_holds_under_random_arrival() {
        let bound = BufferConfig {
            max_entries: 24,
            max_span_s: Some(3.0),
        };
        let mut rng = rand::rng();
        let mut s = session(0.0, bound.clone());

        for i in 1..=300 {
            let jitter = if rng.random_bool(0.2) {
                rng.random_range(0.0..2.0)
            } else {
                0.0
            };
            let t = i as f64 * 0.05 - jitter;
            let handle = if i % 3 == 0 { s.gps } else { s.drive };

            // too-late arrivals are rejected, everything else is kept in bound
            let _ = s.core.insert(handle, Time::from_secs(t), fix(1.0, 1.0));

            let stats = s.core.buffer_stats();
            assert!(stats.total_entries <= bound.max_entries);
            assert!(stats.span() <= 3.0 + 1e-12);
            assert!(s.core.buffer().is_sorted());
            assert!(s.core.buffer().get(0).unwrap().is_state());
        }

        assert!(s.core.stats().evicted > 0);
        assert!(s.core.stats().accepted > 200);
    }
}

#[cfg(test)]
mod reference_model_tests {
    use approx::assert_relative_eq;
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{ImuMeasurement, MeasurementPayload, PositionMeasurement, Time};
    use fusion_core::models::{build_core, StaticInitializer};
    use nalgebra::Vector3;

    const CONFIG: &str = r#"
[core]
propagation_sensor = "imu"

[init]
static_samples = 5

[[sensors]]
name = "imu"
kind = "imu"

[[sensors]]
name = "gps"
kind = "position"
noise_std = [0.3, 0.3, 0.3]
"#;

    fn at_rest() -> MeasurementPayload {
        ImuMeasurement::new(Vector3::new(0.0, 0.0, 9.81), Vector3::zeros()).into()
    }

    #[test]
    fn test_imu_and_gps_reordered_match_sorted() {
        let config = ConfigLoader::load_from_str(CONFIG, ConfigFormat::Toml).unwrap();

        let mut init = StaticInitializer::new(config.init.clone());
        while !init.push(ImuMeasurement::new(
            Vector3::new(0.0, 0.0, 9.81),
            Vector3::zeros(),
        )) {}
        let snapshot = init.snapshot().unwrap();

        let mut runs = Vec::new();
        for order in [[0usize, 1, 2, 3], [0, 2, 3, 1]] {
            let mut core = build_core(&config).unwrap();
            core.initialize(Time::ZERO, snapshot.clone()).unwrap();
            let imu = core.sensor("imu").unwrap();
            let gps = core.sensor("gps").unwrap();

            let events = [
                (imu, 0.1, at_rest()),
                (gps, 0.15, PositionMeasurement::new(Vector3::new(0.2, 0.0, 0.0)).into()),
                (imu, 0.2, at_rest()),
                (imu, 0.3, at_rest()),
            ];
            for i in order {
                let (sensor, t, payload) = events[i].clone();
                let outcome = core.insert(sensor, Time::from_secs(t), payload).unwrap();
                assert!(outcome.update_valid);
            }
            runs.push(core.latest_snapshot().map(|(_, s)| s.clone()).unwrap());
        }

        assert_eq!(runs[0], runs[1]);
        assert!(runs[0].core.position.x > 0.0);
        assert_relative_eq!(runs[0].core.orientation.norm(), 1.0, epsilon = 1e-12);
    }
}

#[cfg(test)]
mod kernel_property_tests {
    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, UnitQuaternion, Vector3};
    use numeric_kernel::{apply_small_angle_correction, average_quaternions, enforce_symmetry, skew};
    use rand::Rng;

    fn random_vector(rng: &mut impl Rng) -> Vector3<f64> {
        Vector3::new(
            rng.random_range(-10.0..10.0),
            rng.random_range(-10.0..10.0),
            rng.random_range(-10.0..10.0),
        )
    }

    fn random_rotation(rng: &mut impl Rng) -> UnitQuaternion<f64> {
        UnitQuaternion::from_euler_angles(
            rng.random_range(-3.0..3.0),
            rng.random_range(-1.5..1.5),
            rng.random_range(-3.0..3.0),
        )
    }

    #[test]
    fn test_skew_is_antisymmetric_and_annihilates_its_vector() {
        let mut rng = rand::rng();
        for _ in 0..100 {
            let v = random_vector(&mut rng);
            let s = skew(&v);
            assert_eq!(s, -s.transpose());
            assert_relative_eq!(s * v, Vector3::zeros(), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_symmetrisation_is_idempotent() {
        let mut rng = rand::rng();
        for n in 1..8 {
            let m = DMatrix::from_fn(n, n, |_, _| rng.random_range(-1.0..1.0));
            let once = enforce_symmetry(&m);
            assert_eq!(enforce_symmetry(&once), once);
        }
    }

    #[test]
    fn test_zero_correction_and_single_average() {
        let mut rng = rand::rng();
        for _ in 0..50 {
            let q = random_rotation(&mut rng);
            let corrected = apply_small_angle_correction(&q, &Vector3::zeros());
            assert_relative_eq!(corrected.coords, q.coords, epsilon = 1e-12);
            assert_eq!(average_quaternions(&[q]).unwrap(), q);
        }
    }
}

#[cfg(test)]
mod e2e_tests {
    use contracts::Time;
    use observability::FusionMetricsAggregator;
    use tokio::sync::mpsc;

    use super::support::*;

    /// Producer task -> bounded channel -> single estimation loop
    #[tokio::test]
    async fn test_channel_fed_estimation() {
        let (tx, mut rx) = mpsc::channel::<(bool, f64, f64)>(8);

        let producer = tokio::spawn(async move {
            for i in 1..=50 {
                let t = i as f64 * 0.1;
                tx.send((false, t, 0.0)).await.unwrap();
                if i % 5 == 0 {
                    // every fifth fix is late by 0.25 s
                    tx.send((true, t - 0.25, t * 0.5)).await.unwrap();
                }
            }
        });

        let mut s = session(0.0, unbounded());
        let mut metrics = FusionMetricsAggregator::new();
        while let Some((is_fix, t, x)) = rx.recv().await {
            let handle = if is_fix { s.gps } else { s.drive };
            let outcome = s.core.insert(handle, Time::from_secs(t), fix(x, 0.0)).unwrap();
            metrics.update(&outcome);
        }
        producer.await.unwrap();

        let summary = metrics.summary();
        assert_eq!(summary.total_inserts, 60);
        assert_eq!(summary.out_of_order, 10);
        assert_eq!(summary.replays, 10);
        assert_eq!(s.core.stats().out_of_order, 10);
        assert!(s.core.buffer().is_sorted());
    }
}
