// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Simulated time.
//!
//! Time is a signed count of nanoseconds since the federation epoch. The
//! integer representation keeps comparisons exact across processes; the API
//! boundary converts from and to `f64` seconds. Arithmetic saturates so that
//! [`Time::MAX`] behaves as "never" in bound computations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

const NANOS_PER_SEC: f64 = 1e9;

/// A point in simulated time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Time(i64);

impl Time {
    /// Federation epoch.
    pub const ZERO: Time = Time(0);
    /// Smallest representable advance (1 ns).
    pub const EPSILON: Time = Time(1);
    /// Largest representable time, used for "run to completion" requests.
    pub const MAX: Time = Time(i64::MAX);

    /// Create from a raw nanosecond count.
    pub const fn from_nanos(nanos: i64) -> Self {
        Time(nanos)
    }

    /// Raw nanosecond count.
    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    /// Convert from seconds, rounding to the nearest nanosecond.
    ///
    /// Values beyond the representable range saturate; NaN maps to zero.
    pub fn from_secs_f64(secs: f64) -> Self {
        if secs.is_nan() {
            return Time::ZERO;
        }
        let nanos = (secs * NANOS_PER_SEC).round();
        if nanos >= i64::MAX as f64 {
            Time::MAX
        } else if nanos <= i64::MIN as f64 {
            Time(i64::MIN)
        } else {
            Time(nanos as i64)
        }
    }

    /// Time in seconds.
    pub fn as_secs_f64(self) -> f64 {
        if self.is_max() {
            return f64::INFINITY;
        }
        self.0 as f64 / NANOS_PER_SEC
    }

    /// True for [`Time::MAX`].
    pub const fn is_max(self) -> bool {
        self.0 == i64::MAX
    }

    /// True for strictly negative times.
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Saturating addition.
    pub const fn saturating_add(self, rhs: Time) -> Time {
        Time(self.0.saturating_add(rhs.0))
    }

    /// Saturating subtraction.
    pub const fn saturating_sub(self, rhs: Time) -> Time {
        Time(self.0.saturating_sub(rhs.0))
    }
}

impl Add for Time {
    type Output = Time;

    fn add(self, rhs: Time) -> Time {
        self.saturating_add(rhs)
    }
}

impl Sub for Time {
    type Output = Time;

    fn sub(self, rhs: Time) -> Time {
        self.saturating_sub(rhs)
    }
}

impl From<f64> for Time {
    fn from(secs: f64) -> Self {
        Time::from_secs_f64(secs)
    }
}

impl From<Time> for f64 {
    fn from(t: Time) -> f64 {
        t.as_secs_f64()
    }
}

impl From<std::time::Duration> for Time {
    fn from(d: std::time::Duration) -> Self {
        Time(i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_max() {
            write!(f, "max")
        } else {
            write!(f, "{}", self.as_secs_f64())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secs_conversion() {
        assert_eq!(Time::from_secs_f64(1.0).as_nanos(), 1_000_000_000);
        assert_eq!(Time::from_secs_f64(0.25).as_secs_f64(), 0.25);
        assert_eq!(Time::from(2.5), Time::from_nanos(2_500_000_000));
    }

    #[test]
    fn test_saturation() {
        assert_eq!(Time::MAX + Time::from_secs_f64(1.0), Time::MAX);
        assert_eq!(Time::from_secs_f64(f64::INFINITY), Time::MAX);
        assert_eq!(Time::from_secs_f64(f64::NAN), Time::ZERO);
        assert_eq!(Time::MAX.as_secs_f64(), f64::INFINITY);
    }

    #[test]
    fn test_ordering_is_exact() {
        let a = Time::from_secs_f64(0.1) + Time::from_secs_f64(0.2);
        let b = Time::from_secs_f64(0.3);
        assert_eq!(a, b);
        assert!(Time::ZERO < Time::EPSILON);
    }

    #[test]
    fn test_display() {
        assert_eq!(Time::from_secs_f64(1.5).to_string(), "1.5");
        assert_eq!(Time::MAX.to_string(), "max");
    }

    #[test]
    fn test_serde_transparent() {
        let json = serde_json::to_string(&Time::from_nanos(42)).unwrap();
        assert_eq!(json, "42");
        let back: Time = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Time::from_nanos(42));
    }
}
