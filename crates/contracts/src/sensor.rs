//! Sensor handles and the registry that owns them.
//!
//! The registry is a handle table: it owns one [`SensorDescriptor`] per data
//! source and hands out copyable [`SensorHandle`] indices. Buffer entries keep
//! the handle only, so no entry ever owns (or keeps alive) a sensor.

use serde::{Deserialize, Serialize};
use slab::Slab;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::FusionError;

/// Stable sensor name with O(1) cloning (`Arc<str>` inside).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct SensorId(Arc<str>);

impl SensorId {
    /// Get the underlying string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for SensorId {
    type Target = str;

    #[inline]
    fn deref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for SensorId {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SensorId {
    #[inline]
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for SensorId {
    #[inline]
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<SensorId> for String {
    fn from(id: SensorId) -> Self {
        id.0.to_string()
    }
}

impl PartialEq<&str> for SensorId {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensorId({:?})", &*self.0)
    }
}

/// Index into a [`SensorRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SensorHandle(usize);

impl SensorHandle {
    /// Raw slot index, used in diagnostics.
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// What a sensor contributes to the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorRole {
    /// Drives propagation; its measurements produce core-state checkpoints
    Propagation,
    /// Corrects the state; its measurements produce sensor-state checkpoints
    Update,
}

impl SensorRole {
    /// Whether measurements of this sensor move the state forward in time.
    pub fn propagates(self) -> bool {
        matches!(self, Self::Propagation)
    }
}

/// Registry slot content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorDescriptor {
    /// Stable sensor name
    pub name: SensorId,
    /// Capability of the sensor
    pub role: SensorRole,
}

/// Handle table owning every registered sensor.
#[derive(Debug, Default)]
pub struct SensorRegistry {
    sensors: Slab<SensorDescriptor>,
    by_name: HashMap<SensorId, SensorHandle>,
}

impl SensorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sensor and return its handle.
    ///
    /// # Errors
    /// `DuplicateSensor` if the name is already taken.
    pub fn register(
        &mut self,
        name: impl Into<SensorId>,
        role: SensorRole,
    ) -> Result<SensorHandle, FusionError> {
        let name = name.into();
        if self.by_name.contains_key(name.as_str()) {
            return Err(FusionError::DuplicateSensor {
                name: name.to_string(),
            });
        }

        let handle = SensorHandle(self.sensors.insert(SensorDescriptor {
            name: name.clone(),
            role,
        }));
        self.by_name.insert(name, handle);
        Ok(handle)
    }

    /// Look up a descriptor
    #[inline]
    pub fn get(&self, handle: SensorHandle) -> Option<&SensorDescriptor> {
        self.sensors.get(handle.0)
    }

    /// Look up a descriptor, failing with `UnknownSensor`
    pub fn descriptor(&self, handle: SensorHandle) -> Result<&SensorDescriptor, FusionError> {
        self.get(handle)
            .ok_or(FusionError::UnknownSensor { handle: handle.0 })
    }

    /// Sensor name for diagnostics; unknown handles render as `#<index>`.
    pub fn display_name(&self, handle: SensorHandle) -> String {
        self.get(handle)
            .map(|d| d.name.to_string())
            .unwrap_or_else(|| format!("#{}", handle.0))
    }

    /// Find a handle by sensor name
    pub fn lookup(&self, name: &str) -> Option<SensorHandle> {
        self.by_name.get(name).copied()
    }

    /// Number of registered sensors
    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    /// Whether no sensor is registered
    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    /// Iterate over all sensors in registration order
    pub fn iter(&self) -> impl Iterator<Item = (SensorHandle, &SensorDescriptor)> {
        self.sensors
            .iter()
            .map(|(key, descriptor)| (SensorHandle(key), descriptor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_is_cheap() {
        let id1: SensorId = "imu".into();
        let id2 = id1.clone();
        assert_eq!(id1.as_str().as_ptr(), id2.as_str().as_ptr());
    }

    #[test]
    fn test_sensor_id_serde() {
        let id: SensorId = "gps".into();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"gps\"");
        let parsed: SensorId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = SensorRegistry::new();
        let imu = registry.register("imu", SensorRole::Propagation).unwrap();
        let gps = registry.register("gps", SensorRole::Update).unwrap();

        assert_ne!(imu, gps);
        assert_eq!(registry.lookup("gps"), Some(gps));
        assert_eq!(registry.get(imu).unwrap().name, "imu");
        assert!(registry.get(imu).unwrap().role.propagates());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = SensorRegistry::new();
        registry.register("gps", SensorRole::Update).unwrap();
        let err = registry.register("gps", SensorRole::Update).unwrap_err();
        assert!(matches!(err, FusionError::DuplicateSensor { .. }));
    }

    #[test]
    fn test_unknown_handle() {
        let registry = SensorRegistry::new();
        let handle = SensorHandle(7);
        assert!(registry.descriptor(handle).is_err());
        assert_eq!(registry.display_name(handle), "#7");
    }
}
