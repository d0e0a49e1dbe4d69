//! The libx6 calling surface as a safe trait.
//!
//! Every exported entry point has one method here. Arguments arrive as Rust
//! types, out-parameters come back as return values, and the raw status code
//! is kept as-is so the session can attach the library's own error message.
//! [`X6Library`](crate::loader::X6Library) implements this by calling the
//! loaded function pointers.

use crate::error::{X6Error, X6Result};
use lib_types::channel::ChannelTuple;
use lib_types::enums::NativeLogLevel;
use lib_types::firmware::FirmwareVersion;
use lib_types::Complex64;
use std::ffi::CString;

/// Failure of a single raw call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RawError {
    /// Non-zero `X6_STATUS`.
    Status(i32),
    /// The entry point is not exported by the loaded build.
    Missing(&'static str),
}

pub type RawResult<T> = Result<T, RawError>;

/// Convert a raw status code.
#[inline]
pub fn status(code: i32) -> RawResult<()> {
    if code == 0 {
        Ok(())
    } else {
        Err(RawError::Status(code))
    }
}

/// Safe view of the libx6 entry points.
///
/// Implementations must be callable from any thread: blocking calls are
/// executed on worker threads by the session.
pub trait X6Api: Send + Sync {
    /// `get_error_msg`. Returns `None` if the library gave a null pointer.
    fn error_message(&self, code: i32) -> Option<String>;

    fn get_num_devices(&self) -> RawResult<u32>;
    fn set_log(&self, target: &CString) -> RawResult<()>;
    fn set_logging_level(&self, level: i32) -> RawResult<()>;

    fn connect_x6(&self, device: i32) -> RawResult<()>;
    fn disconnect_x6(&self, device: i32) -> RawResult<()>;
    fn get_firmware_version(&self, device: i32) -> RawResult<FirmwareVersion>;

    fn set_reference_source(&self, device: i32, source: u32) -> RawResult<()>;
    fn get_reference_source(&self, device: i32) -> RawResult<u32>;
    fn set_digitizer_mode(&self, device: i32, mode: u32) -> RawResult<()>;
    fn get_digitizer_mode(&self, device: i32) -> RawResult<u32>;
    fn set_trigger_source(&self, device: i32, source: u32) -> RawResult<()>;
    fn get_trigger_source(&self, device: i32) -> RawResult<u32>;
    fn get_sample_rate(&self, device: i32) -> RawResult<f64>;

    fn set_input_channel_enable(&self, device: i32, channel: u32, enable: bool) -> RawResult<()>;
    fn get_input_channel_enable(&self, device: i32, channel: u32) -> RawResult<bool>;
    fn set_output_channel_enable(&self, device: i32, channel: u32, enable: bool) -> RawResult<()>;
    fn get_output_channel_enable(&self, device: i32, channel: u32) -> RawResult<bool>;

    fn enable_stream(&self, device: i32, a: i32, b: i32, c: i32) -> RawResult<()>;
    fn disable_stream(&self, device: i32, a: i32, b: i32, c: i32) -> RawResult<()>;

    fn set_nco_frequency(&self, device: i32, a: i32, b: i32, freq: f64) -> RawResult<()>;
    fn get_nco_frequency(&self, device: i32, a: i32, b: i32) -> RawResult<f64>;

    fn set_averager_settings(
        &self,
        device: i32,
        record_length: i32,
        segments: i32,
        waveforms: i32,
        round_robins: i32,
    ) -> RawResult<()>;

    fn set_threshold(&self, device: i32, a: i32, c: i32, threshold: f64) -> RawResult<()>;
    fn get_threshold(&self, device: i32, a: i32, c: i32) -> RawResult<f64>;
    fn set_threshold_invert(&self, device: i32, a: i32, c: i32, invert: bool) -> RawResult<()>;
    fn get_threshold_invert(&self, device: i32, a: i32, c: i32) -> RawResult<bool>;

    fn write_kernel(&self, device: i32, a: u32, b: u32, c: u32, kernel: &[Complex64]) -> RawResult<()>;
    fn read_kernel(&self, device: i32, a: u32, b: u32, c: u32, addr: u32) -> RawResult<Complex64>;
    fn set_kernel_bias(&self, device: i32, a: u32, b: u32, c: u32, bias: Complex64) -> RawResult<()>;
    fn get_kernel_bias(&self, device: i32, a: u32, b: u32, c: u32) -> RawResult<Complex64>;

    fn acquire(&self, device: i32) -> RawResult<()>;
    fn wait_for_acquisition(&self, device: i32, timeout_ms: u32) -> RawResult<()>;
    fn stop(&self, device: i32) -> RawResult<()>;
    fn get_is_running(&self, device: i32) -> RawResult<bool>;
    fn get_num_new_records(&self, device: i32) -> RawResult<u32>;
    fn get_data_available(&self, device: i32) -> RawResult<bool>;

    fn transfer_stream(&self, device: i32, channels: &[ChannelTuple], buffer: &mut [f64]) -> RawResult<()>;
    fn transfer_variance(&self, device: i32, channels: &[ChannelTuple], buffer: &mut [f64]) -> RawResult<()>;
    fn get_buffer_size(&self, device: i32, channels: &[ChannelTuple]) -> RawResult<u32>;
    fn get_variance_buffer_size(&self, device: i32, channels: &[ChannelTuple]) -> RawResult<i32>;
    fn get_record_length(&self, device: i32, channel: &ChannelTuple) -> RawResult<u32>;

    fn write_pulse_waveform(&self, device: i32, pg: u32, waveform: &[f64]) -> RawResult<()>;
    fn read_pulse_waveform(&self, device: i32, pg: u32, addr: u32) -> RawResult<f64>;

    fn read_register(&self, device: i32, addr: u32, offset: u32) -> RawResult<u32>;
    fn write_register(&self, device: i32, addr: u32, offset: u32, value: u32) -> RawResult<()>;

    fn get_logic_temperature(&self, device: i32) -> RawResult<f32>;
}

/// Turn a raw result into an [`X6Error`], fetching the library's message for
/// status failures.
pub fn check<A, T>(api: &A, operation: &str, result: RawResult<T>) -> X6Result<T>
where
    A: X6Api + ?Sized,
{
    match result {
        Ok(value) => Ok(value),
        Err(RawError::Status(code)) => {
            let message = error_message(api, code);
            tracing::debug!(operation, code, %message, "libx6 call failed");
            Err(X6Error::status(code, message))
        }
        Err(RawError::Missing(symbol)) => {
            tracing::debug!(operation, symbol, "libx6 entry point not exported");
            Err(X6Error::not_supported(operation))
        }
    }
}

/// The driver's description of a status code.
pub fn error_message<A: X6Api + ?Sized>(api: &A, code: i32) -> String {
    api.error_message(code)
        .unwrap_or_else(|| "No error message for this status number.".to_string())
}

/// Number of X6 cards visible to the driver.
pub fn num_devices<A: X6Api + ?Sized>(api: &A) -> X6Result<u32> {
    let n = check(api, "get_num_devices", api.get_num_devices())?;
    tracing::info!(devices = n, "Enumerated X6 devices");
    Ok(n)
}

/// Redirect the native library's log.
///
/// `target` is a file path (opened in append mode by the library) or one of
/// the literals `stdout` / `stderr`.
pub fn set_log<A: X6Api + ?Sized>(api: &A, target: &str) -> X6Result<()> {
    let c_target = CString::new(target)
        .map_err(|_| X6Error::invalid_parameter("log target", "Contains null byte"))?;
    check(api, "set_log", api.set_log(&c_target))?;
    tracing::debug!(target, "Redirected libx6 log");
    Ok(())
}

/// Set the native library's log level.
pub fn set_logging_level<A: X6Api + ?Sized>(api: &A, level: NativeLogLevel) -> X6Result<()> {
    check(api, "set_logging_level", api.set_logging_level(level.as_raw()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockX6;

    #[test]
    fn test_status_conversion() {
        assert_eq!(status(0), Ok(()));
        assert_eq!(status(-6), Err(RawError::Status(-6)));
    }

    #[test]
    fn test_check_attaches_library_message() {
        let api = MockX6::new(1);
        let err = check(&api, "connect_x6", api.connect_x6(4)).unwrap_err();
        assert_eq!(err.x6_status(), Some(lib_types::X6Status::NoDeviceFound));
        assert!(err.to_string().contains("Unable to connect"));
    }

    #[test]
    fn test_check_missing_symbol() {
        let err = check(&MockX6::new(1), "get_sampleRate", Err::<f64, _>(RawError::Missing("get_sampleRate")))
            .unwrap_err();
        assert!(matches!(err, X6Error::NotSupported { .. }));
    }

    #[test]
    fn test_library_level_calls() {
        let api = MockX6::new(2);
        assert_eq!(num_devices(&api).unwrap(), 2);
        set_log(&api, "stderr").unwrap();
        assert_eq!(api.log_target().as_deref(), Some("stderr"));
        set_logging_level(&api, NativeLogLevel::Debug).unwrap();
        assert_eq!(api.log_level(), 3);
        assert!(set_log(&api, "bad\0name").is_err());
    }

    #[test]
    fn test_error_message_for_unknown_code() {
        let api = MockX6::new(1);
        assert_eq!(error_message(&api, -99), "No error message for this status number.");
        assert_eq!(error_message(&api, -3), "API call made on unconnected X6.");
    }
}
