//! Status codes returned by every libx6 entry point.
//!
//! The native library reports errors as a signed 32-bit `X6_STATUS`.
//! Zero is success; every negative value names a failure class.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Known libx6 status codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum X6Status {
    Ok = 0,
    UnknownError = -1,
    NoDeviceFound = -2,
    Unconnected = -3,
    InvalidFrequency = -4,
    Timeout = -5,
    InvalidChannel = -6,
    LogfileError = -7,
    InvalidRecordLength = -8,
    ModeError = -9,
    InvalidWfLen = -10,
    WfOutOfRange = -11,
    InvalidKernelStream = -12,
    InvalidKernelLength = -13,
    KernelOutOfRange = -14,
    ModuleError = -15,
}

impl X6Status {
    /// All known statuses, in code order.
    pub const ALL: [X6Status; 16] = [
        Self::Ok,
        Self::UnknownError,
        Self::NoDeviceFound,
        Self::Unconnected,
        Self::InvalidFrequency,
        Self::Timeout,
        Self::InvalidChannel,
        Self::LogfileError,
        Self::InvalidRecordLength,
        Self::ModeError,
        Self::InvalidWfLen,
        Self::WfOutOfRange,
        Self::InvalidKernelStream,
        Self::InvalidKernelLength,
        Self::KernelOutOfRange,
        Self::ModuleError,
    ];

    /// Look up a raw status code. Returns `None` for codes this crate does not know.
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.code() == code)
    }

    /// The raw wire value.
    #[inline]
    pub fn code(self) -> i32 {
        self as i32
    }

    #[inline]
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    /// Symbolic name as used in the C header.
    pub fn name(self) -> &'static str {
        match self {
            Self::Ok => "X6_OK",
            Self::UnknownError => "X6_UNKNOWN_ERROR",
            Self::NoDeviceFound => "X6_NO_DEVICE_FOUND",
            Self::Unconnected => "X6_UNCONNECTED",
            Self::InvalidFrequency => "X6_INVALID_FREQUENCY",
            Self::Timeout => "X6_TIMEOUT",
            Self::InvalidChannel => "X6_INVALID_CHANNEL",
            Self::LogfileError => "X6_LOGFILE_ERROR",
            Self::InvalidRecordLength => "X6_INVALID_RECORD_LENGTH",
            Self::ModeError => "X6_MODE_ERROR",
            Self::InvalidWfLen => "X6_INVALID_WF_LEN",
            Self::WfOutOfRange => "X6_WF_OUT_OF_RANGE",
            Self::InvalidKernelStream => "X6_INVALID_KERNEL_STREAM",
            Self::InvalidKernelLength => "X6_INVALID_KERNEL_LENGTH",
            Self::KernelOutOfRange => "X6_KERNEL_OUT_OF_RANGE",
            Self::ModuleError => "X6_MODULE_ERROR",
        }
    }

    /// Fallback description, used when the library cannot supply one.
    pub fn default_message(self) -> &'static str {
        match self {
            Self::Ok => "No error.",
            Self::UnknownError => "API call failed with unknown exception.",
            Self::NoDeviceFound => {
                "Unable to connect to requested X6 card. Make sure it is in the computer."
            }
            Self::Unconnected => "API call made on unconnected X6.",
            Self::InvalidFrequency => "Attempt to set invalid clock frequency on X6.",
            Self::Timeout => "Insufficient number of records were taken before timeout was hit.",
            Self::InvalidChannel => "API call attempted on invalid channel tuple.",
            Self::LogfileError => "Failed to open log file.",
            Self::InvalidRecordLength => "Invalid record length.",
            Self::ModeError => "Operation not valid in the current digitizer mode.",
            Self::InvalidWfLen => "Invalid pulse generator waveform length.",
            Self::WfOutOfRange => "Pulse generator waveform value out of range.",
            Self::InvalidKernelStream => "Attempt to write a kernel to a non-integrating stream.",
            Self::InvalidKernelLength => "Kernel is too long for this stream.",
            Self::KernelOutOfRange => "Kernel value out of range.",
            Self::ModuleError => "Firmware module error.",
        }
    }
}

impl fmt::Display for X6Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
