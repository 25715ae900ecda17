//! Buffer entries: time-stamped state checkpoints and measurements.

use std::cmp::Ordering;
use std::fmt;

use contracts::{MeasurementPayload, SensorHandle, SensorRegistry, StateSnapshot, Time};
use serde::{Deserialize, Serialize};

/// Metadata kind of a buffer entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Checkpoint produced by the propagation sensor
    CoreState,
    /// Checkpoint produced by an update sensor
    SensorState,
    /// Initialization checkpoint, anchor of every replay
    InitState,
    /// Measurement that arrived in order
    Measurement,
    /// Measurement that arrived older than the latest checkpoint
    MeasurementOutOfOrder,
}

impl EntryKind {
    #[inline]
    pub const fn is_state(self) -> bool {
        matches!(self, Self::CoreState | Self::SensorState | Self::InitState)
    }

    #[inline]
    pub const fn is_measurement(self) -> bool {
        matches!(self, Self::Measurement | Self::MeasurementOutOfOrder)
    }

    /// Derived checkpoints can be superseded by a replay; init states cannot
    #[inline]
    pub const fn is_derived_state(self) -> bool {
        matches!(self, Self::CoreState | Self::SensorState)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CoreState => "core_state",
            Self::SensorState => "sensor_state",
            Self::InitState => "init_state",
            Self::Measurement => "measurement",
            Self::MeasurementOutOfOrder => "measurement_ooo",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry payload
#[derive(Debug, Clone, PartialEq)]
pub enum EntryPayload {
    State(StateSnapshot),
    Measurement(MeasurementPayload),
}

/// One time-stamped record in the buffer.
///
/// Fields are private so an entry cannot change after construction. Ordering
/// compares timestamps only, entries with equal timestamps compare as equal.
#[derive(Debug, Clone)]
pub struct BufferEntry {
    timestamp: Time,
    payload: EntryPayload,
    sensor: SensorHandle,
    kind: EntryKind,
    valid: bool,
}

impl BufferEntry {
    pub fn new(timestamp: Time, payload: EntryPayload, sensor: SensorHandle, kind: EntryKind) -> Self {
        Self {
            timestamp,
            payload,
            sensor,
            kind,
            valid: true,
        }
    }

    /// Measurement entry
    pub fn measurement(
        timestamp: Time,
        measurement: MeasurementPayload,
        sensor: SensorHandle,
        out_of_order: bool,
    ) -> Self {
        let kind = if out_of_order {
            EntryKind::MeasurementOutOfOrder
        } else {
            EntryKind::Measurement
        };
        Self::new(timestamp, EntryPayload::Measurement(measurement), sensor, kind)
    }

    /// State checkpoint entry
    pub fn state(timestamp: Time, snapshot: StateSnapshot, sensor: SensorHandle, kind: EntryKind) -> Self {
        debug_assert!(kind.is_state());
        Self::new(timestamp, EntryPayload::State(snapshot), sensor, kind)
    }

    #[inline]
    pub fn timestamp(&self) -> Time {
        self.timestamp
    }

    #[inline]
    pub fn sensor(&self) -> SensorHandle {
        self.sensor
    }

    #[inline]
    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// `false` only for an update checkpoint whose covariance failed validation
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Same entry with the given validity flag
    pub fn with_validity(mut self, valid: bool) -> Self {
        self.valid = valid;
        self
    }

    #[inline]
    pub fn payload(&self) -> &EntryPayload {
        &self.payload
    }

    #[inline]
    pub fn is_state(&self) -> bool {
        self.kind.is_state()
    }

    #[inline]
    pub fn is_measurement(&self) -> bool {
        self.kind.is_measurement()
    }

    /// State snapshot, if this is a checkpoint
    pub fn snapshot(&self) -> Option<&StateSnapshot> {
        match &self.payload {
            EntryPayload::State(snapshot) => Some(snapshot),
            EntryPayload::Measurement(_) => None,
        }
    }

    /// Measurement payload, if this is a measurement
    pub fn measurement_payload(&self) -> Option<&MeasurementPayload> {
        match &self.payload {
            EntryPayload::Measurement(measurement) => Some(measurement),
            EntryPayload::State(_) => None,
        }
    }

    /// Human-readable rendering `name<TAB>timestamp<TAB>kind`
    pub fn display<'a>(&'a self, registry: &'a SensorRegistry) -> EntryDisplay<'a> {
        EntryDisplay {
            entry: self,
            registry,
        }
    }
}

impl PartialEq for BufferEntry {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp
    }
}

impl PartialOrd for BufferEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.timestamp.partial_cmp(&other.timestamp)
    }
}

/// Diagnostic rendering of an entry, see [`BufferEntry::display`]
pub struct EntryDisplay<'a> {
    entry: &'a BufferEntry,
    registry: &'a SensorRegistry,
}

impl fmt::Display for EntryDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}",
            self.registry.display_name(self.entry.sensor),
            self.entry.timestamp,
            self.entry.kind
        )
    }
}
