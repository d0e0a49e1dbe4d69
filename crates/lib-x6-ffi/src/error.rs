//! Error types for libx6 calls.

use lib_types::enums::UnknownEnumValue;
use lib_types::kernel::KernelError;
use lib_types::samples::AveragerError;
use lib_types::status::X6Status;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while loading or calling into libx6.
#[derive(Debug, Error)]
pub enum X6Error {
    /// Failed to load the shared library.
    #[error("Failed to load library '{path}': {source}")]
    LoadError {
        path: String,
        #[source]
        source: libloading::Error,
    },

    /// Required symbol not found in library.
    #[error("Symbol '{symbol}' not found in library")]
    SymbolNotFound { symbol: String },

    /// The library returned a non-zero status.
    #[error("LIBX6 Error: {} ({code}) - {message}", .status.map_or("UNKNOWN_STATUS", X6Status::name))]
    Status {
        status: Option<X6Status>,
        code: i32,
        message: String,
    },

    /// Device call attempted on a session with no device bound.
    #[error("No X6 device connected")]
    NotConnected,

    /// The loaded library build does not export this entry point.
    #[error("Operation '{operation}' not supported by this libx6 build")]
    NotSupported { operation: String },

    /// Invalid parameter.
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// The library returned an enum value we do not know.
    #[error(transparent)]
    UnknownEnum(#[from] UnknownEnumValue),

    /// Kernel or waveform rejected before reaching the library.
    #[error(transparent)]
    Kernel(#[from] KernelError),

    /// Averager settings rejected before reaching the library.
    #[error(transparent)]
    Averager(#[from] AveragerError),

    /// A blocking call did not return in time.
    #[error("libx6 call timed out after {0:?}")]
    Timeout(Duration),

    /// The worker thread running a call panicked.
    #[error("libx6 call panicked: {0}")]
    Panicked(String),

    /// Too many worker threads from previous timeouts are still blocked.
    #[error("Too many orphaned threads ({count}), max allowed is {max}")]
    TooManyOrphanedThreads { count: usize, max: usize },
}

impl X6Error {
    /// Create a load error.
    pub fn load_error(path: impl Into<String>, source: libloading::Error) -> Self {
        Self::LoadError {
            path: path.into(),
            source,
        }
    }

    /// Create a symbol not found error.
    pub fn symbol_not_found(symbol: impl Into<String>) -> Self {
        Self::SymbolNotFound {
            symbol: symbol.into(),
        }
    }

    /// Create a status error from a raw code and the library's message.
    pub fn status(code: i32, message: impl Into<String>) -> Self {
        Self::Status {
            status: X6Status::from_code(code),
            code,
            message: message.into(),
        }
    }

    pub fn not_supported(operation: impl Into<String>) -> Self {
        Self::NotSupported {
            operation: operation.into(),
        }
    }

    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// The libx6 status behind this error, if it came from the library.
    pub fn x6_status(&self) -> Option<X6Status> {
        match self {
            Self::Status { status, .. } => *status,
            _ => None,
        }
    }

    /// True for both library-reported and watchdog timeouts.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_)) || self.x6_status() == Some(X6Status::Timeout)
    }

    /// Check if the device is likely still usable after this error.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::InvalidParameter { .. } | Self::Kernel(_) | Self::Averager(_) => true,
            Self::Status { status, .. } => !matches!(
                status,
                Some(X6Status::Unconnected | X6Status::NoDeviceFound | X6Status::ModuleError)
            ),
            _ => false,
        }
    }
}

/// Result type for libx6 operations.
pub type X6Result<T> = Result<T, X6Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_display() {
        let err = X6Error::status(-5, "Insufficient number of records");
        assert_eq!(
            err.to_string(),
            "LIBX6 Error: X6_TIMEOUT (-5) - Insufficient number of records"
        );
        assert!(err.is_timeout());
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_unknown_status_code() {
        let err = X6Error::status(-42, "No error message for this status number.");
        assert_eq!(err.x6_status(), None);
        assert!(err.to_string().contains("UNKNOWN_STATUS (-42)"));
    }

    #[test]
    fn test_unconnected_is_fatal() {
        assert!(!X6Error::status(-3, "unconnected").is_recoverable());
        assert!(!X6Error::NotConnected.is_recoverable());
    }
}
