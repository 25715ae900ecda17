//! Fusion engine: insert, out-of-order replay and eviction.
//!
//! Every accepted measurement is followed in the buffer by exactly one state
//! checkpoint derived from it. A measurement older than the newest checkpoint
//! is spliced into place and every later checkpoint is recomputed, so the
//! buffer always holds what a sorted arrival would have produced.

use std::collections::HashMap;

use contracts::{
    Arrival, BufferConfig, BufferStats, CoreStats, FusionConfig, FusionError, InsertOutcome,
    MeasurementPayload, MeasurementUpdater, ReplayReport, SensorHandle, SensorId, SensorRegistry,
    SensorRole, StatePropagator, StateSnapshot, Time,
};
use tracing::instrument;

use crate::buffer::SyncBuffer;
use crate::entry::{BufferEntry, EntryKind};

/// Engine settings
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Retention bound applied after every insert
    pub buffer: BufferConfig,
    /// Keep the propagated state when an update fails covariance validation
    pub reject_invalid_updates: bool,
}

impl From<&FusionConfig> for EngineConfig {
    fn from(config: &FusionConfig) -> Self {
        Self {
            buffer: config.buffer.clone(),
            reject_invalid_updates: config.core.reject_invalid_updates,
        }
    }
}

struct Propagation {
    handle: SensorHandle,
    propagator: Box<dyn StatePropagator>,
}

/// Checkpoint derived from one measurement
struct Derived {
    snapshot: StateSnapshot,
    kind: EntryKind,
    valid: bool,
}

/// Multi-sensor fusion core
///
/// Single writer: every mutation takes `&mut self`, so a replay always runs
/// to completion before the next insert is accepted.
pub struct FusionCore {
    config: EngineConfig,
    registry: SensorRegistry,
    buffer: SyncBuffer,
    propagation: Option<Propagation>,
    updaters: HashMap<SensorHandle, Box<dyn MeasurementUpdater>>,
    stats: CoreStats,
}

impl std::fmt::Debug for FusionCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FusionCore")
            .field("sensors", &self.registry.len())
            .field("entries", &self.buffer.len())
            .field("stats", &self.stats)
            .finish()
    }
}

/// Smallest entry bound that still holds a measurement and its checkpoint
const MIN_RETAINED_ENTRIES: usize = 2;

impl FusionCore {
    pub fn new(mut config: EngineConfig) -> Self {
        if config.buffer.max_entries < MIN_RETAINED_ENTRIES {
            tracing::warn!(
                requested = config.buffer.max_entries,
                applied = MIN_RETAINED_ENTRIES,
                "Buffer bound too small, clamping"
            );
            config.buffer.max_entries = MIN_RETAINED_ENTRIES;
        }
        let capacity = config.buffer.max_entries + 2;
        Self {
            config,
            registry: SensorRegistry::new(),
            buffer: SyncBuffer::with_capacity(capacity),
            propagation: None,
            updaters: HashMap::new(),
            stats: CoreStats::default(),
        }
    }

    /// Register the sensor that drives propagation.
    ///
    /// # Errors
    /// `ConfigValidation` if a propagation sensor already exists,
    /// `DuplicateSensor` if the name is taken.
    pub fn register_propagation_sensor(
        &mut self,
        name: impl Into<SensorId>,
        propagator: Box<dyn StatePropagator>,
    ) -> Result<SensorHandle, FusionError> {
        if let Some(existing) = &self.propagation {
            return Err(FusionError::config_validation(
                "core.propagation_sensor",
                format!(
                    "propagation sensor '{}' is already registered",
                    self.registry.display_name(existing.handle)
                ),
            ));
        }
        let handle = self.registry.register(name, SensorRole::Propagation)?;
        self.propagation = Some(Propagation { handle, propagator });
        Ok(handle)
    }

    /// Register a sensor whose measurements correct the state.
    pub fn register_update_sensor(
        &mut self,
        name: impl Into<SensorId>,
        updater: Box<dyn MeasurementUpdater>,
    ) -> Result<SensorHandle, FusionError> {
        let handle = self.registry.register(name, SensorRole::Update)?;
        self.updaters.insert(handle, updater);
        Ok(handle)
    }

    /// Start a session: drop every entry and store `snapshot` as the
    /// initialization checkpoint at `t`.
    pub fn initialize(&mut self, t: Time, snapshot: StateSnapshot) -> Result<(), FusionError> {
        let handle = self
            .propagation
            .as_ref()
            .map(|p| p.handle)
            .ok_or_else(|| {
                FusionError::config_validation(
                    "core.propagation_sensor",
                    "no propagation sensor registered",
                )
            })?;

        if !t.is_finite() {
            return Err(FusionError::InvalidTimestamp {
                sensor: self.registry.display_name(handle),
                timestamp: t.as_secs(),
            });
        }

        self.buffer.clear();
        self.buffer
            .push_back(BufferEntry::state(t, snapshot, handle, EntryKind::InitState));
        tracing::info!(timestamp = %t, dim = self.latest_dim(), "Fusion core initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.buffer.latest_state().is_some()
    }

    /// Insert a measurement.
    ///
    /// In-order measurements are appended and followed by their derived
    /// checkpoint. Older measurements are tagged out-of-order, spliced into
    /// place and replayed. The configured bound is applied afterwards.
    ///
    /// # Errors
    /// Input errors (`UnknownSensor`, `InvalidTimestamp`, `NotInitialized`,
    /// `UnreplayableTimestamp`) leave the buffer untouched. A failing
    /// collaborator also leaves it untouched; during a replay this surfaces
    /// as `ReplayInconsistency`.
    #[instrument(
        level = "trace",
        name = "fusion_core_insert",
        skip(self, measurement),
        fields(sensor = sensor.index(), timestamp = %t)
    )]
    pub fn insert(
        &mut self,
        sensor: SensorHandle,
        t: Time,
        measurement: MeasurementPayload,
    ) -> Result<InsertOutcome, FusionError> {
        let latest_t = match self.validate_insert(sensor, t) {
            Ok(latest_t) => latest_t,
            Err(err) => {
                self.stats.rejected += 1;
                metrics::counter!("fusion_rejected_total", "reason" => err.reason())
                    .increment(1);
                tracing::warn!(
                    sensor = %self.registry.display_name(sensor),
                    timestamp = %t,
                    error = %err,
                    "Measurement rejected"
                );
                return Err(err);
            }
        };

        let name = self.registry.descriptor(sensor)?.name.clone();
        let mut outcome = if t >= latest_t {
            self.insert_in_order(name, sensor, t, measurement)?
        } else {
            self.insert_out_of_order(name, sensor, t, measurement)?
        };

        outcome.evicted = self.evict();
        self.stats.accepted += 1;
        metrics::counter!(
            "fusion_measurements_total",
            "sensor" => outcome.sensor.to_string(),
            "arrival" => outcome.arrival.as_str()
        )
        .increment(1);
        metrics::gauge!("fusion_buffer_entries").set(self.buffer.len() as f64);

        Ok(outcome)
    }

    fn validate_insert(&self, sensor: SensorHandle, t: Time) -> Result<Time, FusionError> {
        let descriptor = self.registry.descriptor(sensor)?;

        if !t.is_finite() {
            return Err(FusionError::InvalidTimestamp {
                sensor: descriptor.name.to_string(),
                timestamp: t.as_secs(),
            });
        }

        let (Some(oldest), Some(latest)) = (self.buffer.oldest_state(), self.buffer.latest_state())
        else {
            return Err(FusionError::NotInitialized {
                sensor: descriptor.name.to_string(),
            });
        };

        if t < oldest.timestamp() {
            return Err(FusionError::UnreplayableTimestamp {
                sensor: descriptor.name.to_string(),
                timestamp: t,
                oldest: oldest.timestamp(),
            });
        }

        Ok(latest.timestamp())
    }

    fn insert_in_order(
        &mut self,
        name: SensorId,
        sensor: SensorHandle,
        t: Time,
        measurement: MeasurementPayload,
    ) -> Result<InsertOutcome, FusionError> {
        let prior = self
            .buffer
            .latest_state()
            .ok_or_else(|| FusionError::NotInitialized {
                sensor: self.registry.display_name(sensor),
            })?;
        let prior_t = prior.timestamp();
        let prior_snapshot = prior.snapshot().ok_or_else(|| {
            FusionError::Other(format!("state entry at {prior_t} carries no snapshot"))
        })?;

        let derived = self.derive_state(prior_snapshot, prior_t, sensor, t, &measurement)?;

        self.buffer
            .push_back(BufferEntry::measurement(t, measurement, sensor, false));
        let index = self.buffer.len() - 1;
        self.buffer.push_back(
            BufferEntry::state(t, derived.snapshot, sensor, derived.kind)
                .with_validity(derived.valid),
        );
        if !derived.valid {
            self.record_invalid_updates(sensor, t, 1);
        }

        Ok(InsertOutcome {
            sensor: name,
            timestamp: t,
            index,
            arrival: Arrival::InOrder,
            replay: None,
            update_valid: derived.valid,
            evicted: 0,
        })
    }

    fn insert_out_of_order(
        &mut self,
        name: SensorId,
        sensor: SensorHandle,
        t: Time,
        measurement: MeasurementPayload,
    ) -> Result<InsertOutcome, FusionError> {
        let index = self
            .buffer
            .insert_sorted(BufferEntry::measurement(t, measurement, sensor, true));

        tracing::debug!(
            sensor = %name,
            timestamp = %t,
            index,
            "Out-of-order measurement spliced"
        );

        let report = match self.replay(index) {
            Ok(report) => report,
            Err(err) => {
                self.buffer.remove(index);
                return Err(err);
            }
        };

        self.stats.out_of_order += 1;

        Ok(InsertOutcome {
            sensor: name,
            timestamp: t,
            index,
            arrival: Arrival::OutOfOrder,
            update_valid: report.measurement_valid,
            replay: Some(report),
            evicted: 0,
        })
    }

    /// Recompute every checkpoint after the newest state before `from_index`.
    ///
    /// New checkpoints are computed out of place and committed only when every
    /// collaborator call succeeded. Init states are kept and re-anchor the walk.
    ///
    /// # Errors
    /// `ReplayInconsistency` when no checkpoint precedes `from_index` or a
    /// collaborator fails; the buffer is left as it was.
    #[instrument(name = "fusion_core_replay", skip(self))]
    pub fn replay(&mut self, from_index: usize) -> Result<ReplayReport, FusionError> {
        let anchor = self.buffer.state_before(from_index).ok_or_else(|| {
            FusionError::ReplayInconsistency {
                from_index,
                message: "no state checkpoint precedes the replay window".to_string(),
            }
        })?;

        let plan = match self.plan_replay(anchor, from_index) {
            Ok(plan) => plan,
            Err(err) => {
                self.stats.aborted_replays += 1;
                metrics::counter!("fusion_replays_aborted_total").increment(1);
                tracing::error!(from_index, anchor, error = %err, "Replay aborted");
                return Err(FusionError::ReplayInconsistency {
                    from_index,
                    message: err.to_string(),
                });
            }
        };

        let anchor_timestamp = self
            .buffer
            .get(anchor)
            .map(BufferEntry::timestamp)
            .unwrap_or_default();
        let replayed_measurements = plan.states.len();
        let measurement_valid = plan.measurement_valid.unwrap_or(true);

        let commit = self.commit_replay(anchor, plan.states);
        let superseded_states = commit.superseded;

        let mut invalid_updates = 0;
        for (sensor, (t, delta)) in commit.invalid_delta {
            if delta > 0 {
                self.record_invalid_updates(sensor, t, delta as u64);
                invalid_updates += delta as usize;
            }
        }

        self.stats.replays += 1;
        self.stats.superseded_states += superseded_states as u64;
        metrics::counter!("fusion_replays_total").increment(1);
        metrics::histogram!("fusion_replay_length").record(replayed_measurements as f64);

        tracing::debug!(
            from_index,
            anchor = %anchor_timestamp,
            replayed_measurements,
            superseded_states,
            "Replay complete"
        );

        Ok(ReplayReport {
            from_index,
            anchor_timestamp,
            replayed_measurements,
            superseded_states,
            invalid_updates,
            measurement_valid,
        })
    }

    fn plan_replay(&self, anchor: usize, from_index: usize) -> Result<ReplayPlan, FusionError> {
        let anchor_entry = self.buffer.get(anchor).ok_or_else(|| {
            FusionError::Other(format!("replay anchor {anchor} is out of range"))
        })?;
        let mut prior_t = anchor_entry.timestamp();
        let mut prior = anchor_entry
            .snapshot()
            .cloned()
            .ok_or_else(|| FusionError::Other(format!("anchor at {prior_t} is not a state")))?;

        let mut plan = ReplayPlan::default();

        for (index, entry) in self.buffer.iter().enumerate().skip(anchor + 1) {
            match entry.kind() {
                EntryKind::InitState => {
                    if let Some(snapshot) = entry.snapshot() {
                        prior = snapshot.clone();
                        prior_t = entry.timestamp();
                    }
                }
                EntryKind::CoreState | EntryKind::SensorState => {}
                EntryKind::Measurement | EntryKind::MeasurementOutOfOrder => {
                    let measurement = entry.measurement_payload().ok_or_else(|| {
                        FusionError::Other(format!(
                            "measurement at {} carries no payload",
                            entry.timestamp()
                        ))
                    })?;
                    let derived = self.derive_state(
                        &prior,
                        prior_t,
                        entry.sensor(),
                        entry.timestamp(),
                        measurement,
                    )?;
                    if index == from_index {
                        plan.measurement_valid = Some(derived.valid);
                    }
                    prior = derived.snapshot.clone();
                    prior_t = entry.timestamp();
                    plan.states.push(
                        BufferEntry::state(
                            entry.timestamp(),
                            derived.snapshot,
                            entry.sensor(),
                            derived.kind,
                        )
                        .with_validity(derived.valid),
                    );
                }
            }
        }

        Ok(plan)
    }

    /// Swap the derived checkpoints after `anchor` for `states`, each placed
    /// right after its measurement.
    fn commit_replay(&mut self, anchor: usize, states: Vec<BufferEntry>) -> ReplayCommit {
        let tail = self.buffer.split_off(anchor + 1);
        let mut fresh = states.into_iter();
        let mut commit = ReplayCommit::default();

        for entry in tail {
            if entry.kind().is_derived_state() {
                commit.superseded += 1;
                if !entry.is_valid() {
                    commit.tally_invalid(&entry, -1);
                }
                continue;
            }
            let is_measurement = entry.is_measurement();
            self.buffer.push_back(entry);
            if is_measurement {
                if let Some(state) = fresh.next() {
                    if !state.is_valid() {
                        commit.tally_invalid(&state, 1);
                    }
                    self.buffer.push_back(state);
                }
            }
        }

        commit
    }

    /// Count checkpoints that entered the buffer with an invalid covariance
    fn record_invalid_updates(&mut self, sensor: SensorHandle, t: Time, count: u64) {
        let name = self.registry.display_name(sensor);
        tracing::warn!(
            sensor = %name,
            timestamp = %t,
            count,
            rejected = self.config.reject_invalid_updates,
            "Update produced an invalid covariance"
        );
        self.stats.invalid_updates += count;
        metrics::counter!("fusion_invalid_updates_total", "sensor" => name).increment(count);
    }

    /// Derive the checkpoint that follows `measurement` from `prior`.
    ///
    /// The in-order path and replay both go through here, which is what makes
    /// a replay reproduce a sorted arrival exactly.
    fn derive_state(
        &self,
        prior: &StateSnapshot,
        prior_t: Time,
        sensor: SensorHandle,
        t: Time,
        measurement: &MeasurementPayload,
    ) -> Result<Derived, FusionError> {
        let propagation = self.propagation.as_ref().ok_or_else(|| {
            FusionError::config_validation(
                "core.propagation_sensor",
                "no propagation sensor registered",
            )
        })?;
        let dt = (t - prior_t).max(0.0);

        if sensor == propagation.handle {
            let snapshot = propagation
                .propagator
                .propagate(prior, Some(measurement), dt)?;
            return Ok(Derived {
                snapshot,
                kind: EntryKind::CoreState,
                valid: true,
            });
        }

        let updater = self
            .updaters
            .get(&sensor)
            .ok_or(FusionError::UnknownSensor {
                handle: sensor.index(),
            })?;

        let propagated = if dt > 0.0 {
            propagation.propagator.propagate(prior, None, dt)?
        } else {
            prior.clone()
        };

        let outcome = updater.update(&propagated, measurement)?;
        if outcome.valid {
            return Ok(Derived {
                snapshot: outcome.snapshot,
                kind: EntryKind::SensorState,
                valid: true,
            });
        }

        let snapshot = if self.config.reject_invalid_updates {
            propagated
        } else {
            outcome.snapshot
        };
        Ok(Derived {
            snapshot,
            kind: EntryKind::SensorState,
            valid: false,
        })
    }

    /// Apply the configured bound. Returns the number of evicted entries.
    #[instrument(name = "fusion_core_evict", level = "trace", skip(self))]
    pub fn evict(&mut self) -> usize {
        let evicted = self.buffer.evict(&self.config.buffer);
        if evicted > 0 {
            self.stats.evicted += evicted as u64;
            metrics::counter!("fusion_evicted_total").increment(evicted as u64);
        }
        evicted
    }

    /// Ordered read-only subsequence of buffer entries matching `predicate`
    pub fn query<P>(&self, predicate: P) -> Vec<&BufferEntry>
    where
        P: FnMut(&BufferEntry) -> bool,
    {
        self.buffer.query(predicate)
    }

    /// Newest checkpoint and its timestamp
    pub fn latest_snapshot(&self) -> Option<(Time, &StateSnapshot)> {
        let entry = self.buffer.latest_state()?;
        entry.snapshot().map(|s| (entry.timestamp(), s))
    }

    fn latest_dim(&self) -> usize {
        self.latest_snapshot().map_or(0, |(_, s)| s.dim())
    }

    /// Drop every entry; registered sensors and lifetime counters are kept.
    pub fn reset(&mut self) {
        self.buffer.clear();
        tracing::info!("Fusion core reset");
    }

    #[inline]
    pub fn buffer(&self) -> &SyncBuffer {
        &self.buffer
    }

    #[inline]
    pub fn registry(&self) -> &SensorRegistry {
        &self.registry
    }

    /// Look up a registered sensor by name
    pub fn sensor(&self, name: &str) -> Option<SensorHandle> {
        self.registry.lookup(name)
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn stats(&self) -> &CoreStats {
        &self.stats
    }

    #[instrument(name = "fusion_core_buffer_stats", level = "trace", skip(self))]
    pub fn buffer_stats(&self) -> BufferStats {
        self.buffer.stats()
    }

    /// Buffer dump, one `index name timestamp kind` line per entry
    pub fn render_buffer(&self) -> String {
        self.buffer.render(&self.registry)
    }
}

#[derive(Default)]
struct ReplayPlan {
    states: Vec<BufferEntry>,
    /// Validity of the checkpoint derived at `from_index`, if that entry is a measurement
    measurement_valid: Option<bool>,
}

#[derive(Default)]
struct ReplayCommit {
    superseded: usize,
    /// Net change of invalid checkpoints per sensor, with the newest timestamp seen
    invalid_delta: HashMap<SensorHandle, (Time, i64)>,
}

impl ReplayCommit {
    fn tally_invalid(&mut self, state: &BufferEntry, delta: i64) {
        let slot = self
            .invalid_delta
            .entry(state.sensor())
            .or_insert((state.timestamp(), 0));
        if state.timestamp() > slot.0 {
            slot.0 = state.timestamp();
        }
        slot.1 += delta;
    }
}
