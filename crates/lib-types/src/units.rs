//! Physical units with type safety.
//!
//! These newtypes keep frequencies and temperatures from being mixed up
//! with the bare `f64`/`f32` values that cross the FFI boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Frequency in hertz.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hertz(pub f64);

impl Hertz {
    #[inline]
    pub fn from_khz(khz: f64) -> Self {
        Self(khz * 1e3)
    }

    #[inline]
    pub fn from_mhz(mhz: f64) -> Self {
        Self(mhz * 1e6)
    }

    #[inline]
    pub fn as_mhz(&self) -> f64 {
        self.0 * 1e-6
    }
}

impl fmt::Display for Hertz {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6} MHz", self.as_mhz())
    }
}

/// Temperature in degrees Celsius.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Celsius(pub f32);

impl fmt::Display for Celsius {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} °C", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hertz_conversions() {
        let f = Hertz::from_mhz(10.5);
        assert!((f.0 - 10.5e6).abs() < 1e-6);
        assert!((f.as_mhz() - 10.5).abs() < 1e-12);
        assert!((Hertz::from_khz(500.0).as_mhz() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_celsius_display() {
        assert_eq!(Celsius(41.0).to_string(), "41.0 °C");
    }
}
