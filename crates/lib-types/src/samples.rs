//! Transfer buffer layout.
//!
//! The library fills flat `f64` buffers. Raw physical streams are one real
//! value per sample; demodulated and integrated streams are interleaved
//! `[re, im]` pairs, and their variance buffers are interleaved
//! `[re, im, re*im]` triples.

use crate::channel::SampleLayout;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest record length the firmware accepts.
pub const MIN_RECORD_LENGTH: u32 = 128;

/// Largest record length the firmware accepts.
pub const MAX_RECORD_LENGTH: u32 = 16384;

/// Record lengths must be a multiple of this so decimated streams line up.
pub const RECORD_LENGTH_GRANULARITY: u32 = 128;

/// Segment, waveform and round robin counts are passed to the driver as C `int`.
pub const MAX_COUNT: u32 = i32::MAX as u32;

/// Data transferred from a single stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StreamData {
    Real(Vec<f64>),
    Complex(Vec<Complex64>),
}

impl StreamData {
    /// Interpret a raw transfer buffer according to the stream layout.
    pub fn from_buffer(buffer: Vec<f64>, layout: SampleLayout) -> Self {
        match layout {
            SampleLayout::Real => Self::Real(buffer),
            SampleLayout::Complex => Self::Complex(deinterleave_complex(&buffer)),
        }
    }

    /// Number of samples (complex pairs count once).
    pub fn len(&self) -> usize {
        match self {
            Self::Real(v) => v.len(),
            Self::Complex(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn layout(&self) -> SampleLayout {
        match self {
            Self::Real(_) => SampleLayout::Real,
            Self::Complex(_) => SampleLayout::Complex,
        }
    }

    pub fn as_real(&self) -> Option<&[f64]> {
        match self {
            Self::Real(v) => Some(v),
            Self::Complex(_) => None,
        }
    }

    pub fn as_complex(&self) -> Option<&[Complex64]> {
        match self {
            Self::Complex(v) => Some(v),
            Self::Real(_) => None,
        }
    }
}

/// Variance data split into its three components.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VarianceTriple {
    /// Variance of the real part (or of the samples, for real streams).
    pub real: Vec<f64>,
    /// Variance of the imaginary part.
    pub imag: Vec<f64>,
    /// Real/imaginary covariance.
    pub prod: Vec<f64>,
}

impl VarianceTriple {
    pub fn len(&self) -> usize {
        self.real.len()
    }

    pub fn is_empty(&self) -> bool {
        self.real.is_empty()
    }
}

/// Pair up `[re0, im0, re1, im1, ...]`. A trailing unpaired value is dropped.
pub fn deinterleave_complex(buffer: &[f64]) -> Vec<Complex64> {
    buffer
        .chunks_exact(2)
        .map(|pair| Complex64::new(pair[0], pair[1]))
        .collect()
}

/// Split a variance buffer.
///
/// For real streams the whole buffer is the variance and the other two
/// components are zero-filled to the same length.
pub fn deinterleave_variance(buffer: &[f64], layout: SampleLayout) -> VarianceTriple {
    match layout {
        SampleLayout::Real => VarianceTriple {
            real: buffer.to_vec(),
            imag: vec![0.0; buffer.len()],
            prod: vec![0.0; buffer.len()],
        },
        SampleLayout::Complex => {
            let n = buffer.len() / 3;
            let mut triple = VarianceTriple {
                real: Vec::with_capacity(n),
                imag: Vec::with_capacity(n),
                prod: Vec::with_capacity(n),
            };
            for chunk in buffer.chunks_exact(3) {
                triple.real.push(chunk[0]);
                triple.imag.push(chunk[1]);
                triple.prod.push(chunk[2]);
            }
            triple
        }
    }
}

/// Truncate `buffer_size` to a whole number of round robins.
///
/// A round robin is `record_length * waveforms * segments` samples. Returns
/// zero when less than one round robin is available, including when the
/// round robin size does not fit in `usize`.
pub fn whole_round_robins(
    buffer_size: usize,
    record_length: usize,
    waveforms: usize,
    segments: usize,
) -> usize {
    match record_length
        .checked_mul(waveforms)
        .and_then(|n| n.checked_mul(segments))
    {
        Some(0) | None => 0,
        Some(samples_per_rr) => samples_per_rr * (buffer_size / samples_per_rr),
    }
}

/// Invalid averager configuration.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AveragerError {
    #[error(
        "Record length {0} must be between {min} and {max} and a multiple of {step}",
        min = MIN_RECORD_LENGTH,
        max = MAX_RECORD_LENGTH,
        step = RECORD_LENGTH_GRANULARITY
    )]
    RecordLength(u32),

    #[error("{0} must be at least 1")]
    ZeroCount(&'static str),

    #[error("{0} = {1} exceeds the driver limit of {max}", max = MAX_COUNT)]
    TooLarge(&'static str, u32),
}

/// Record geometry pushed to the card before every acquisition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AveragerSettings {
    /// Samples per record at the physical sample rate.
    #[serde(default = "default_record_length")]
    pub record_length: u32,

    /// Distinct segments per waveform.
    #[serde(default = "default_count")]
    pub segments: u32,

    /// Waveforms per segment.
    #[serde(default = "default_count")]
    pub waveforms: u32,

    /// Passes over all segments and waveforms.
    #[serde(default = "default_count")]
    pub round_robins: u32,
}

fn default_record_length() -> u32 { MIN_RECORD_LENGTH }
fn default_count() -> u32 { 1 }

impl Default for AveragerSettings {
    fn default() -> Self {
        Self {
            record_length: default_record_length(),
            segments: 1,
            waveforms: 1,
            round_robins: 1,
        }
    }
}

impl AveragerSettings {
    pub fn validate(&self) -> Result<(), AveragerError> {
        let rl = self.record_length;
        if !(MIN_RECORD_LENGTH..=MAX_RECORD_LENGTH).contains(&rl)
            || rl % RECORD_LENGTH_GRANULARITY != 0
        {
            return Err(AveragerError::RecordLength(rl));
        }
        for (name, count) in [
            ("segments", self.segments),
            ("waveforms", self.waveforms),
            ("round_robins", self.round_robins),
        ] {
            if count == 0 {
                return Err(AveragerError::ZeroCount(name));
            }
            if count > MAX_COUNT {
                return Err(AveragerError::TooLarge(name, count));
            }
        }
        Ok(())
    }

    /// Records produced per round robin.
    pub fn records_per_round_robin(&self) -> u64 {
        u64::from(self.segments) * u64::from(self.waveforms)
    }

    /// Total records for the whole acquisition.
    pub fn total_records(&self) -> u64 {
        self.records_per_round_robin() * u64::from(self.round_robins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deinterleave_complex() {
        let buf = [1.0, 2.0, 3.0, -4.0];
        let z = deinterleave_complex(&buf);
        assert_eq!(z, vec![Complex64::new(1.0, 2.0), Complex64::new(3.0, -4.0)]);
    }

    #[test]
    fn test_deinterleave_complex_drops_odd_tail() {
        let z = deinterleave_complex(&[1.0, 2.0, 3.0]);
        assert_eq!(z.len(), 1);
        assert!(deinterleave_complex(&[]).is_empty());
    }

    #[test]
    fn test_variance_real_layout_zero_fills() {
        let v = deinterleave_variance(&[0.5, 0.25], SampleLayout::Real);
        assert_eq!(v.real, vec![0.5, 0.25]);
        assert_eq!(v.imag, vec![0.0, 0.0]);
        assert_eq!(v.prod, vec![0.0, 0.0]);
    }

    #[test]
    fn test_variance_complex_layout_strides() {
        let buf = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let v = deinterleave_variance(&buf, SampleLayout::Complex);
        assert_eq!(v.real, vec![1.0, 4.0]);
        assert_eq!(v.imag, vec![2.0, 5.0]);
        assert_eq!(v.prod, vec![3.0, 6.0]);
    }

    #[test]
    fn test_stream_data_from_buffer() {
        let real = StreamData::from_buffer(vec![1.0, 2.0, 3.0], SampleLayout::Real);
        assert_eq!(real.len(), 3);
        assert!(real.as_complex().is_none());

        let cplx = StreamData::from_buffer(vec![1.0, 2.0, 3.0, 4.0], SampleLayout::Complex);
        assert_eq!(cplx.len(), 2);
        assert_eq!(cplx.as_complex().map(|z| z[1]), Some(Complex64::new(3.0, 4.0)));
    }

    #[test]
    fn test_whole_round_robins() {
        // 128 samples * 2 waveforms * 3 segments = 768 per round robin
        assert_eq!(whole_round_robins(2000, 128, 2, 3), 1536);
        assert_eq!(whole_round_robins(700, 128, 2, 3), 0);
        assert_eq!(whole_round_robins(700, 0, 2, 3), 0);
    }

    #[test]
    fn test_whole_round_robins_overflow() {
        assert_eq!(whole_round_robins(4096, usize::MAX, 2, 2), 0);
        assert_eq!(whole_round_robins(4096, 128, usize::MAX / 64, 128), 0);
    }

    #[test]
    fn test_averager_validation() {
        assert!(AveragerSettings::default().validate().is_ok());

        let bad = AveragerSettings { record_length: 100, ..Default::default() };
        assert_eq!(bad.validate(), Err(AveragerError::RecordLength(100)));

        let too_long = AveragerSettings { record_length: 16384 + 128, ..Default::default() };
        assert!(too_long.validate().is_err());

        let zero = AveragerSettings { round_robins: 0, ..Default::default() };
        assert_eq!(zero.validate(), Err(AveragerError::ZeroCount("round_robins")));

        let huge = AveragerSettings { segments: u32::MAX, ..Default::default() };
        assert_eq!(huge.validate(), Err(AveragerError::TooLarge("segments", u32::MAX)));
        let edge = AveragerSettings { round_robins: i32::MAX as u32, ..Default::default() };
        assert!(edge.validate().is_ok());
    }

    #[test]
    fn test_record_counts() {
        let s = AveragerSettings { record_length: 256, segments: 4, waveforms: 2, round_robins: 10 };
        assert_eq!(s.records_per_round_robin(), 8);
        assert_eq!(s.total_records(), 80);
    }
}
