//! Stream addressing.
//!
//! The channelizer produces several data streams per physical input. A
//! stream is named by a three-part label `(a, b, c)`:
//!
//! - `a` is the 1-indexed physical input channel,
//! - `b` is the 0-indexed virtual channel (`b = 0` is the raw stream,
//!   `b >= 1` are demodulated streams),
//! - `c` selects the integrated (kernel) output when non-zero.
//!
//! Physical streams carry real samples. Every other stream carries complex
//! samples interleaved as `[re, im, re, im, ...]`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error parsing a channel label.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("Invalid channel label '{0}': expected 'a.b.c'")]
pub struct ChannelParseError(pub String);

/// A stream label, layout-compatible with the native `ChannelTuple` struct.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(C)]
pub struct ChannelTuple {
    pub a: i32,
    pub b: i32,
    pub c: i32,
}

/// How samples of a stream are laid out in a transfer buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleLayout {
    /// One real value per sample.
    Real,
    /// Interleaved real/imaginary pairs.
    Complex,
}

impl ChannelTuple {
    pub const fn new(a: i32, b: i32, c: i32) -> Self {
        Self { a, b, c }
    }

    /// The raw stream of physical input `a`.
    pub const fn physical(a: i32) -> Self {
        Self { a, b: 0, c: 0 }
    }

    /// Raw, unintegrated stream.
    #[inline]
    pub fn is_physical(&self) -> bool {
        self.b == 0 && self.c == 0
    }

    #[inline]
    pub fn is_demodulated(&self) -> bool {
        self.b > 0
    }

    #[inline]
    pub fn is_integrated(&self) -> bool {
        self.c != 0
    }

    pub fn sample_layout(&self) -> SampleLayout {
        if self.is_physical() {
            SampleLayout::Real
        } else {
            SampleLayout::Complex
        }
    }
}

impl From<(i32, i32, i32)> for ChannelTuple {
    fn from((a, b, c): (i32, i32, i32)) -> Self {
        Self { a, b, c }
    }
}

impl fmt::Display for ChannelTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.a, self.b, self.c)
    }
}

impl FromStr for ChannelTuple {
    type Err = ChannelParseError;

    /// Accepts `a.b.c`, `a,b,c` or `(a, b, c)`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ChannelParseError(s.to_string());

        let trimmed = s.trim().trim_start_matches('(').trim_end_matches(')');
        let parts: Vec<&str> = trimmed.split(|c| c == '.' || c == ',').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(err());
        }

        let mut values = [0i32; 3];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part.parse().map_err(|_| err())?;
        }

        Ok(Self::new(values[0], values[1], values[2]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_matches_c_struct() {
        assert_eq!(std::mem::size_of::<ChannelTuple>(), 12);
        assert_eq!(std::mem::align_of::<ChannelTuple>(), 4);
    }

    #[test]
    fn test_stream_classification() {
        let raw = ChannelTuple::physical(1);
        assert!(raw.is_physical());
        assert_eq!(raw.sample_layout(), SampleLayout::Real);

        let demod = ChannelTuple::new(1, 1, 0);
        assert!(demod.is_demodulated());
        assert!(!demod.is_integrated());
        assert_eq!(demod.sample_layout(), SampleLayout::Complex);

        // raw-stream kernel integrator is still complex
        let raw_integrated = ChannelTuple::new(2, 0, 1);
        assert!(!raw_integrated.is_physical());
        assert_eq!(raw_integrated.sample_layout(), SampleLayout::Complex);
    }

    #[test]
    fn test_parse_labels() {
        assert_eq!("1.2.1".parse::<ChannelTuple>(), Ok(ChannelTuple::new(1, 2, 1)));
        assert_eq!("(2, 0, 0)".parse::<ChannelTuple>(), Ok(ChannelTuple::physical(2)));
        assert!("1.2".parse::<ChannelTuple>().is_err());
        assert!("1.x.0".parse::<ChannelTuple>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(ChannelTuple::new(1, 1, 1).to_string(), "1.1.1");
    }
}
