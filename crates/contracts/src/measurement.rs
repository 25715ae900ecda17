//! Measurement shapes carried by buffer entries.
//!
//! Sensors are not subclasses: every supported shape is one variant of
//! [`MeasurementPayload`], dispatched by the entry's metadata kind and the
//! sensor's registered collaborator.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Inertial measurement expressed in the sensor frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImuMeasurement {
    /// Specific force (m/s²)
    pub linear_acceleration: Vector3<f64>,

    /// Angular rate (rad/s)
    pub angular_velocity: Vector3<f64>,
}

impl ImuMeasurement {
    pub fn new(linear_acceleration: Vector3<f64>, angular_velocity: Vector3<f64>) -> Self {
        Self {
            linear_acceleration,
            angular_velocity,
        }
    }
}

/// Position fix `[x y z]` in the world frame (m)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionMeasurement {
    pub position: Vector3<f64>,
}

impl PositionMeasurement {
    pub fn new(position: Vector3<f64>) -> Self {
        Self { position }
    }
}

/// Measurement payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementPayload {
    /// IMU reading (propagation input)
    Imu(ImuMeasurement),

    /// Position fix (update input)
    Position(PositionMeasurement),
}

impl MeasurementPayload {
    /// Short variant name used in diagnostics and error messages.
    pub fn shape_name(&self) -> &'static str {
        match self {
            Self::Imu(_) => "imu",
            Self::Position(_) => "position",
        }
    }

    pub fn as_imu(&self) -> Option<&ImuMeasurement> {
        match self {
            Self::Imu(imu) => Some(imu),
            _ => None,
        }
    }

    pub fn as_position(&self) -> Option<&PositionMeasurement> {
        match self {
            Self::Position(position) => Some(position),
            _ => None,
        }
    }
}

impl From<ImuMeasurement> for MeasurementPayload {
    fn from(imu: ImuMeasurement) -> Self {
        Self::Imu(imu)
    }
}

impl From<PositionMeasurement> for MeasurementPayload {
    fn from(position: PositionMeasurement) -> Self {
        Self::Position(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_accessors() {
        let payload: MeasurementPayload =
            PositionMeasurement::new(Vector3::new(1.0, 2.0, 3.0)).into();
        assert_eq!(payload.shape_name(), "position");
        assert!(payload.as_imu().is_none());
        assert_eq!(payload.as_position().unwrap().position.y, 2.0);
    }

    #[test]
    fn test_payload_json_shape() {
        let payload: MeasurementPayload = ImuMeasurement::new(
            Vector3::new(0.0, 0.0, 9.81),
            Vector3::new(0.1, 0.0, 0.0),
        )
        .into();
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.starts_with("{\"imu\""));
        let parsed: MeasurementPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, payload);
    }
}
