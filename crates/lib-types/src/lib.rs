//! # lib-types
//!
//! Core type definitions for the libx6 digitizer bindings.
//!
//! This crate holds the plain data that crosses the FFI boundary or is
//! derived from it:
//! - Status codes and their messages
//! - Enumerated device settings (reference, mode, trigger, log level)
//! - Stream labels and sample layouts
//! - Firmware version decoding
//! - Kernel and waveform limits
//! - Physical units

pub mod status;
pub mod enums;
pub mod channel;
pub mod firmware;
pub mod samples;
pub mod kernel;
pub mod units;

pub use status::X6Status;
pub use enums::*;
pub use channel::{ChannelParseError, ChannelTuple, SampleLayout};
pub use firmware::FirmwareVersion;
pub use samples::{AveragerError, AveragerSettings, StreamData, VarianceTriple};
pub use kernel::KernelError;
pub use units::*;

/// Re-export num_complex for convenience
pub use num_complex::Complex64;
