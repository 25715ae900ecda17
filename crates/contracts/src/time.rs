//! Time - monotonic filter clock
//!
//! Seconds stored as `f64`, which keeps sub-microsecond resolution for
//! session lengths far beyond what a robot runs between restarts.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Sub};

/// Timestamp in seconds on the estimator's monotonic clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Time(f64);

impl Time {
    /// Clock origin
    pub const ZERO: Time = Time(0.0);

    /// Create a timestamp from seconds.
    #[inline]
    pub const fn from_secs(seconds: f64) -> Self {
        Self(seconds)
    }

    /// Seconds since the clock origin.
    #[inline]
    pub const fn as_secs(self) -> f64 {
        self.0
    }

    /// `false` for NaN and infinities, which can never be ordered into the buffer.
    #[inline]
    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }

    /// Absolute distance to another timestamp in seconds.
    #[inline]
    pub fn abs_diff(self, other: Time) -> f64 {
        (self.0 - other.0).abs()
    }

    /// Total order over all values (NaN sorts last), used for sorting.
    #[inline]
    pub fn total_cmp(&self, other: &Time) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Sub for Time {
    type Output = f64;

    #[inline]
    fn sub(self, rhs: Time) -> f64 {
        self.0 - rhs.0
    }
}

impl Add<f64> for Time {
    type Output = Time;

    #[inline]
    fn add(self, rhs: f64) -> Time {
        Time(self.0 + rhs)
    }
}

impl From<f64> for Time {
    #[inline]
    fn from(seconds: f64) -> Self {
        Self(seconds)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}
