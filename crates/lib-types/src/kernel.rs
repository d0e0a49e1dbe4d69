//! Integration kernel and pulse waveform limits.
//!
//! Kernels and pulse-generator waveforms are stored on the card as signed
//! fixed-point values with 15 fractional bits. The library rejects values
//! and lengths outside these limits; checking them up front gives callers a
//! precise error instead of a bare status code.

use crate::channel::ChannelTuple;
use num_complex::Complex64;
use thiserror::Error;

const FRAC_BITS: u32 = 15;

/// Largest representable kernel component.
pub const MAX_KERNEL_VALUE: f64 = 1.0 - 1.0 / (1u32 << FRAC_BITS) as f64;
/// Smallest representable kernel component.
pub const MIN_KERNEL_VALUE: f64 = -1.0;

/// Kernel memory depth for raw-stream integrators (`b == 0`).
pub const MAX_RAW_KERNEL_LENGTH: usize = 4096;
/// Kernel memory depth for demodulated-stream integrators (`b > 0`).
pub const MAX_DEMOD_KERNEL_LENGTH: usize = 512;

pub const MAX_WF_VALUE: f64 = MAX_KERNEL_VALUE;
pub const MIN_WF_VALUE: f64 = -1.0;

/// Pulse generator waveforms are written four samples at a time.
pub const WF_LENGTH_GRANULARITY: usize = 4;

/// Longest pulse generator waveform.
pub const MAX_WF_LENGTH: usize = 16384;

/// Rejected kernel or waveform.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum KernelError {
    #[error("Stream {0} has no kernel integrator")]
    NotIntegrated(ChannelTuple),

    #[error("Kernel for stream {channel} has {len} points, max is {max}")]
    TooLong { channel: ChannelTuple, len: usize, max: usize },

    #[error("Kernel is empty")]
    Empty,

    #[error("Value {value} at index {index} outside [{min}, {max}]")]
    OutOfRange { index: usize, value: f64, min: f64, max: f64 },

    #[error(
        "Waveform length {0} must be a non-zero multiple of {step} no longer than {max}",
        step = WF_LENGTH_GRANULARITY,
        max = MAX_WF_LENGTH
    )]
    WaveformLength(usize),
}

/// Maximum kernel length for a stream.
pub fn max_kernel_length(channel: &ChannelTuple) -> usize {
    if channel.b == 0 {
        MAX_RAW_KERNEL_LENGTH
    } else {
        MAX_DEMOD_KERNEL_LENGTH
    }
}

/// The firmware rounds to the nearest code, so allow up to half an LSB
/// below the minimum and one and a half above the maximum (values are
/// clipped on write).
fn in_range(value: f64, min: f64, max: f64) -> bool {
    let lsb = 1.0 / (1u32 << FRAC_BITS) as f64;
    value >= min - 0.5 * lsb && value <= max + 1.5 * lsb
}

/// Check a kernel before writing it to `channel`.
pub fn validate_kernel(channel: &ChannelTuple, kernel: &[Complex64]) -> Result<(), KernelError> {
    if !channel.is_integrated() {
        return Err(KernelError::NotIntegrated(*channel));
    }
    if kernel.is_empty() {
        return Err(KernelError::Empty);
    }
    let max = max_kernel_length(channel);
    if kernel.len() > max {
        return Err(KernelError::TooLong { channel: *channel, len: kernel.len(), max });
    }
    for (index, z) in kernel.iter().enumerate() {
        for value in [z.re, z.im] {
            if !in_range(value, MIN_KERNEL_VALUE, MAX_KERNEL_VALUE) {
                return Err(KernelError::OutOfRange {
                    index,
                    value,
                    min: MIN_KERNEL_VALUE,
                    max: MAX_KERNEL_VALUE,
                });
            }
        }
    }
    Ok(())
}

/// Check a pulse generator waveform.
pub fn validate_pulse_waveform(waveform: &[f64]) -> Result<(), KernelError> {
    let len = waveform.len();
    if len == 0 || len % WF_LENGTH_GRANULARITY != 0 || len > MAX_WF_LENGTH {
        return Err(KernelError::WaveformLength(len));
    }
    if let Some((index, &value)) = waveform
        .iter()
        .enumerate()
        .find(|&(_, &v)| !in_range(v, MIN_WF_VALUE, MAX_WF_VALUE))
    {
        return Err(KernelError::OutOfRange { index, value, min: MIN_WF_VALUE, max: MAX_WF_VALUE });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_requires_integrated_stream() {
        let k = vec![Complex64::new(0.5, 0.0); 8];
        assert_eq!(
            validate_kernel(&ChannelTuple::new(1, 1, 0), &k),
            Err(KernelError::NotIntegrated(ChannelTuple::new(1, 1, 0)))
        );
        assert!(validate_kernel(&ChannelTuple::new(1, 1, 1), &k).is_ok());
    }

    #[test]
    fn test_kernel_length_depends_on_stream() {
        let k = vec![Complex64::new(0.1, 0.1); 1000];
        assert!(validate_kernel(&ChannelTuple::new(1, 0, 1), &k).is_ok());
        assert!(matches!(
            validate_kernel(&ChannelTuple::new(1, 2, 1), &k),
            Err(KernelError::TooLong { max: 512, .. })
        ));
    }

    #[test]
    fn test_kernel_range() {
        let mut k = vec![Complex64::new(1.0, -1.0); 4];
        // 1.0 is within the clip allowance
        assert!(validate_kernel(&ChannelTuple::new(1, 0, 1), &k).is_ok());
        k[2] = Complex64::new(0.0, -1.01);
        assert!(matches!(
            validate_kernel(&ChannelTuple::new(1, 0, 1), &k),
            Err(KernelError::OutOfRange { index: 2, .. })
        ));
    }

    #[test]
    fn test_pulse_waveform() {
        assert!(validate_pulse_waveform(&[0.0, 0.5, -0.5, 0.25]).is_ok());
        assert_eq!(validate_pulse_waveform(&[0.0; 6]), Err(KernelError::WaveformLength(6)));
        assert_eq!(validate_pulse_waveform(&[]), Err(KernelError::WaveformLength(0)));
        assert!(validate_pulse_waveform(&[0.0, 0.0, 2.0, 0.0]).is_err());
    }

    #[test]
    fn test_pulse_waveform_length_limit() {
        assert!(validate_pulse_waveform(&vec![0.0; MAX_WF_LENGTH]).is_ok());
        assert_eq!(
            validate_pulse_waveform(&vec![0.0; MAX_WF_LENGTH + 4]),
            Err(KernelError::WaveformLength(16388))
        );
    }
}
