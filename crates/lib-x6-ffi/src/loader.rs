//! Dynamic loading of libx6.
//!
//! This module opens the vendor shared library, resolves every exported
//! entry point into a typed function pointer, and implements [`X6Api`] on
//! top of them. Every entry point returns an `X6_STATUS` (`int`).

use crate::api::{status, RawError, RawResult, X6Api};
use crate::error::{X6Error, X6Result};
use lib_types::channel::ChannelTuple;
use lib_types::firmware::FirmwareVersion;
use lib_types::Complex64;
use libloading::Library;
use std::ffi::{c_char, c_double, c_float, c_int, c_uint, CStr, CString};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Size of the caller-owned buffer `get_firmware_version` writes its
/// description into.
const VERSION_STRING_LEN: usize = 64;

pub type GetErrorMsgFn = unsafe extern "C" fn(c_int) -> *const c_char;
pub type DeviceFn = unsafe extern "C" fn(c_int) -> c_int;
pub type GetNumDevicesFn = unsafe extern "C" fn(*mut c_uint) -> c_int;
pub type GetFirmwareVersionFn =
    unsafe extern "C" fn(c_int, *mut u32, *mut u32, *mut u32, *mut c_char) -> c_int;
pub type SetEnumFn = unsafe extern "C" fn(c_int, c_uint) -> c_int;
pub type GetEnumFn = unsafe extern "C" fn(c_int, *mut c_uint) -> c_int;
pub type GetDoubleFn = unsafe extern "C" fn(c_int, *mut c_double) -> c_int;
pub type SetChannelEnableFn = unsafe extern "C" fn(c_int, c_uint, bool) -> c_int;
pub type GetChannelEnableFn = unsafe extern "C" fn(c_int, c_uint, *mut bool) -> c_int;
pub type StreamFn = unsafe extern "C" fn(c_int, c_int, c_int, c_int) -> c_int;
pub type SetNcoFn = unsafe extern "C" fn(c_int, c_int, c_int, c_double) -> c_int;
pub type GetNcoFn = unsafe extern "C" fn(c_int, c_int, c_int, *mut c_double) -> c_int;
pub type SetAveragerFn = unsafe extern "C" fn(c_int, c_int, c_int, c_int, c_int) -> c_int;
pub type SetThresholdFn = unsafe extern "C" fn(c_int, c_int, c_int, c_double) -> c_int;
pub type GetThresholdFn = unsafe extern "C" fn(c_int, c_int, c_int, *mut c_double) -> c_int;
pub type SetThresholdInvertFn = unsafe extern "C" fn(c_int, c_int, c_int, bool) -> c_int;
pub type GetThresholdInvertFn = unsafe extern "C" fn(c_int, c_int, c_int, *mut bool) -> c_int;
pub type WriteKernelFn =
    unsafe extern "C" fn(c_int, c_uint, c_uint, c_uint, *const Complex64, c_uint) -> c_int;
pub type ReadKernelFn =
    unsafe extern "C" fn(c_int, c_uint, c_uint, c_uint, c_uint, *mut Complex64) -> c_int;
/// Bias is passed by pointer for compatibility with callers lacking C99 complex.
pub type KernelBiasFn = unsafe extern "C" fn(c_int, c_uint, c_uint, c_uint, *mut Complex64) -> c_int;
pub type WaitForAcquisitionFn = unsafe extern "C" fn(c_int, c_uint) -> c_int;
pub type GetIntFn = unsafe extern "C" fn(c_int, *mut c_int) -> c_int;
pub type GetUintFn = unsafe extern "C" fn(c_int, *mut c_uint) -> c_int;
pub type GetBoolFn = unsafe extern "C" fn(c_int, *mut bool) -> c_int;
pub type TransferFn =
    unsafe extern "C" fn(c_int, *const ChannelTuple, c_uint, *mut c_double, c_uint) -> c_int;
pub type GetBufferSizeFn = unsafe extern "C" fn(c_int, *const ChannelTuple, c_uint, *mut c_uint) -> c_int;
pub type GetVarianceBufferSizeFn =
    unsafe extern "C" fn(c_int, *const ChannelTuple, c_uint, *mut c_int) -> c_int;
pub type GetRecordLengthFn = unsafe extern "C" fn(c_int, *const ChannelTuple, *mut c_uint) -> c_int;
pub type SetLogFn = unsafe extern "C" fn(*const c_char) -> c_int;
pub type SetLoggingLevelFn = unsafe extern "C" fn(c_int) -> c_int;
pub type WritePulseWaveformFn = unsafe extern "C" fn(c_int, c_uint, *const c_double, c_uint) -> c_int;
pub type ReadPulseWaveformFn = unsafe extern "C" fn(c_int, c_uint, c_uint, *mut c_double) -> c_int;
pub type ReadRegisterFn = unsafe extern "C" fn(c_int, u32, u32, *mut u32) -> c_int;
pub type WriteRegisterFn = unsafe extern "C" fn(c_int, u32, u32, u32) -> c_int;
pub type GetTemperatureFn = unsafe extern "C" fn(c_int, *mut c_float) -> c_int;

/// Resolved entry points.
#[derive(Clone, Copy)]
struct Symbols {
    get_error_msg: GetErrorMsgFn,
    connect_x6: DeviceFn,
    disconnect_x6: DeviceFn,
    get_num_devices: GetNumDevicesFn,
    get_firmware_version: GetFirmwareVersionFn,
    set_reference_source: SetEnumFn,
    get_reference_source: GetEnumFn,
    set_digitizer_mode: SetEnumFn,
    get_digitizer_mode: GetEnumFn,
    enable_stream: StreamFn,
    disable_stream: StreamFn,
    set_nco_frequency: SetNcoFn,
    get_nco_frequency: GetNcoFn,
    set_averager_settings: SetAveragerFn,
    set_threshold: SetThresholdFn,
    get_threshold: GetThresholdFn,
    set_threshold_invert: SetThresholdInvertFn,
    get_threshold_invert: GetThresholdInvertFn,
    write_kernel: WriteKernelFn,
    read_kernel: ReadKernelFn,
    set_kernel_bias: KernelBiasFn,
    get_kernel_bias: KernelBiasFn,
    acquire: DeviceFn,
    wait_for_acquisition: WaitForAcquisitionFn,
    stop: DeviceFn,
    get_is_running: GetIntFn,
    get_num_new_records: GetUintFn,
    transfer_stream: TransferFn,
    transfer_variance: TransferFn,
    get_buffer_size: GetBufferSizeFn,
    get_variance_buffer_size: GetVarianceBufferSizeFn,
    get_record_length: GetRecordLengthFn,
    set_log: SetLogFn,
    set_logging_level: SetLoggingLevelFn,
    get_logic_temperature: GetTemperatureFn,

    // Not exported by every driver build.
    get_data_available: Option<GetBoolFn>,
    set_trigger_source: Option<SetEnumFn>,
    get_trigger_source: Option<GetEnumFn>,
    get_sample_rate: Option<GetDoubleFn>,
    set_input_channel_enable: Option<SetChannelEnableFn>,
    get_input_channel_enable: Option<GetChannelEnableFn>,
    set_output_channel_enable: Option<SetChannelEnableFn>,
    get_output_channel_enable: Option<GetChannelEnableFn>,
    write_pulse_waveform: Option<WritePulseWaveformFn>,
    read_pulse_waveform: Option<ReadPulseWaveformFn>,
    read_register: Option<ReadRegisterFn>,
    write_register: Option<WriteRegisterFn>,
}

/// Resolve a required symbol.
///
/// # Safety
///
/// `T` must match the exported function's real signature.
unsafe fn required<T: Copy>(library: &Library, name: &'static str) -> X6Result<T> {
    // SAFETY: forwarded to the caller
    unsafe {
        library
            .get::<T>(name.as_bytes())
            .map(|s| *s)
            .map_err(|_| X6Error::symbol_not_found(name))
    }
}

/// Resolve a symbol that older builds may not export.
///
/// # Safety
///
/// `T` must match the exported function's real signature.
unsafe fn optional<T: Copy>(library: &Library, name: &'static str) -> Option<T> {
    // SAFETY: forwarded to the caller
    let sym = unsafe { library.get::<T>(name.as_bytes()).ok().map(|s| *s) };
    if sym.is_none() {
        tracing::debug!(symbol = name, "Optional libx6 entry point not exported");
    }
    sym
}

impl Symbols {
    /// # Safety
    ///
    /// The library must be a libx6 build whose exports match the declared
    /// signatures.
    unsafe fn resolve(lib: &Library) -> X6Result<Self> {
        unsafe {
            Ok(Self {
                get_error_msg: required(lib, "get_error_msg")?,
                connect_x6: required(lib, "connect_x6")?,
                disconnect_x6: required(lib, "disconnect_x6")?,
                get_num_devices: required(lib, "get_num_devices")?,
                get_firmware_version: required(lib, "get_firmware_version")?,
                set_reference_source: required(lib, "set_reference_source")?,
                get_reference_source: required(lib, "get_reference_source")?,
                set_digitizer_mode: required(lib, "set_digitizer_mode")?,
                get_digitizer_mode: required(lib, "get_digitizer_mode")?,
                enable_stream: required(lib, "enable_stream")?,
                disable_stream: required(lib, "disable_stream")?,
                set_nco_frequency: required(lib, "set_nco_frequency")?,
                get_nco_frequency: required(lib, "get_nco_frequency")?,
                set_averager_settings: required(lib, "set_averager_settings")?,
                set_threshold: required(lib, "set_threshold")?,
                get_threshold: required(lib, "get_threshold")?,
                set_threshold_invert: required(lib, "set_threshold_invert")?,
                get_threshold_invert: required(lib, "get_threshold_invert")?,
                write_kernel: required(lib, "write_kernel")?,
                read_kernel: required(lib, "read_kernel")?,
                set_kernel_bias: required(lib, "set_kernel_bias")?,
                get_kernel_bias: required(lib, "get_kernel_bias")?,
                acquire: required(lib, "acquire")?,
                wait_for_acquisition: required(lib, "wait_for_acquisition")?,
                stop: required(lib, "stop")?,
                get_is_running: required(lib, "get_is_running")?,
                get_num_new_records: required(lib, "get_num_new_records")?,
                transfer_stream: required(lib, "transfer_stream")?,
                transfer_variance: required(lib, "transfer_variance")?,
                get_buffer_size: required(lib, "get_buffer_size")?,
                get_variance_buffer_size: required(lib, "get_variance_buffer_size")?,
                get_record_length: required(lib, "get_record_length")?,
                set_log: required(lib, "set_log")?,
                set_logging_level: required(lib, "set_logging_level")?,
                get_logic_temperature: required(lib, "get_logic_temperature")?,

                get_data_available: optional(lib, "get_data_available"),
                set_trigger_source: optional(lib, "set_trigger_source"),
                get_trigger_source: optional(lib, "get_trigger_source"),
                get_sample_rate: optional(lib, "get_sampleRate"),
                set_input_channel_enable: optional(lib, "set_input_channel_enable"),
                get_input_channel_enable: optional(lib, "get_input_channel_enable"),
                set_output_channel_enable: optional(lib, "set_output_channel_enable"),
                get_output_channel_enable: optional(lib, "get_output_channel_enable"),
                write_pulse_waveform: optional(lib, "write_pulse_waveform"),
                read_pulse_waveform: optional(lib, "read_pulse_waveform"),
                read_register: optional(lib, "read_register"),
                write_register: optional(lib, "write_register"),
            })
        }
    }
}

/// Loaded libx6 with resolved entry points.
pub struct X6Library {
    /// Keeps the function pointers valid.
    #[allow(dead_code)]
    library: Library,

    /// Path the library was loaded from.
    pub path: String,

    syms: Symbols,
}

impl X6Library {
    /// Load libx6 from a shared library file.
    ///
    /// Loading runs the library's static initializers, which open
    /// `libx6.log` in the working directory.
    pub fn load<P: AsRef<Path>>(path: P) -> X6Result<Arc<Self>> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        // SAFETY: loading runs foreign initializers; libx6 has no
        // preconditions on them beyond a writable working directory.
        let library = unsafe { Library::new(path) }
            .map_err(|e| X6Error::load_error(&path_str, e))?;

        // SAFETY: signatures above follow libx6.h
        let syms = unsafe { Symbols::resolve(&library)? };

        tracing::info!(
            path = %path_str,
            has_trigger = syms.set_trigger_source.is_some(),
            has_pulse_generator = syms.write_pulse_waveform.is_some(),
            has_registers = syms.read_register.is_some(),
            "Loaded libx6"
        );

        Ok(Arc::new(Self {
            library,
            path: path_str,
            syms,
        }))
    }

    /// Load libx6 from a directory using the platform's file name.
    pub fn load_from_dir<P: AsRef<Path>>(dir: P) -> X6Result<Arc<Self>> {
        Self::load(Self::locate(dir))
    }

    /// Platform file name for libx6 inside `dir`.
    pub fn locate<P: AsRef<Path>>(dir: P) -> PathBuf {
        dir.as_ref().join(LibraryFormat::native().file_name("x6"))
    }
}

// X6Library only holds the Library handle and plain function pointers.
// libx6 serialises access to its device table internally.
unsafe impl Send for X6Library {}
unsafe impl Sync for X6Library {}

/// Unwrap an optional entry point.
fn present<T: Copy>(sym: Option<T>, name: &'static str) -> RawResult<T> {
    sym.ok_or(RawError::Missing(name))
}

fn len_u32(len: usize) -> RawResult<c_uint> {
    // lengths beyond u32 cannot be described to the library
    c_uint::try_from(len).map_err(|_| RawError::Status(lib_types::X6Status::UnknownError.code()))
}

impl X6Api for X6Library {
    fn error_message(&self, code: c_int) -> Option<String> {
        // SAFETY: get_error_msg returns a pointer into a static table
        let ptr = unsafe { (self.syms.get_error_msg)(code) };
        // SAFETY: null or a valid NUL-terminated string
        unsafe { read_c_string(ptr) }
    }

    fn get_num_devices(&self) -> RawResult<u32> {
        let mut n: c_uint = 0;
        status(unsafe { (self.syms.get_num_devices)(&mut n) })?;
        Ok(n)
    }

    fn set_log(&self, target: &CString) -> RawResult<()> {
        status(unsafe { (self.syms.set_log)(target.as_ptr()) })
    }

    fn set_logging_level(&self, level: c_int) -> RawResult<()> {
        status(unsafe { (self.syms.set_logging_level)(level) })
    }

    fn connect_x6(&self, device: c_int) -> RawResult<()> {
        status(unsafe { (self.syms.connect_x6)(device) })
    }

    fn disconnect_x6(&self, device: c_int) -> RawResult<()> {
        status(unsafe { (self.syms.disconnect_x6)(device) })
    }

    fn get_firmware_version(&self, device: c_int) -> RawResult<FirmwareVersion> {
        let mut version = 0u32;
        let mut sha = 0u32;
        let mut timestamp = 0u32;
        let mut text = [0 as c_char; VERSION_STRING_LEN];
        status(unsafe {
            (self.syms.get_firmware_version)(
                device,
                &mut version,
                &mut sha,
                &mut timestamp,
                text.as_mut_ptr(),
            )
        })?;

        let mut fw = FirmwareVersion::from_words(version, sha, timestamp);
        // the library NUL-terminates; guard against a full buffer anyway
        text[VERSION_STRING_LEN - 1] = 0;
        // SAFETY: text is NUL-terminated
        if let Some(desc) = unsafe { read_c_string(text.as_ptr()) } {
            if !desc.is_empty() {
                fw.description = desc;
            }
        }
        Ok(fw)
    }

    fn set_reference_source(&self, device: c_int, source: u32) -> RawResult<()> {
        status(unsafe { (self.syms.set_reference_source)(device, source) })
    }

    fn get_reference_source(&self, device: c_int) -> RawResult<u32> {
        let mut raw: c_uint = 0;
        status(unsafe { (self.syms.get_reference_source)(device, &mut raw) })?;
        Ok(raw)
    }

    fn set_digitizer_mode(&self, device: c_int, mode: u32) -> RawResult<()> {
        status(unsafe { (self.syms.set_digitizer_mode)(device, mode) })
    }

    fn get_digitizer_mode(&self, device: c_int) -> RawResult<u32> {
        let mut raw: c_uint = 0;
        status(unsafe { (self.syms.get_digitizer_mode)(device, &mut raw) })?;
        Ok(raw)
    }

    fn set_trigger_source(&self, device: c_int, source: u32) -> RawResult<()> {
        let f = present(self.syms.set_trigger_source, "set_trigger_source")?;
        status(unsafe { f(device, source) })
    }

    fn get_trigger_source(&self, device: c_int) -> RawResult<u32> {
        let f = present(self.syms.get_trigger_source, "get_trigger_source")?;
        let mut raw: c_uint = 0;
        status(unsafe { f(device, &mut raw) })?;
        Ok(raw)
    }

    fn get_sample_rate(&self, device: c_int) -> RawResult<f64> {
        let f = present(self.syms.get_sample_rate, "get_sampleRate")?;
        let mut rate = 0.0;
        status(unsafe { f(device, &mut rate) })?;
        Ok(rate)
    }

    fn set_input_channel_enable(&self, device: c_int, channel: u32, enable: bool) -> RawResult<()> {
        let f = present(self.syms.set_input_channel_enable, "set_input_channel_enable")?;
        status(unsafe { f(device, channel, enable) })
    }

    fn get_input_channel_enable(&self, device: c_int, channel: u32) -> RawResult<bool> {
        let f = present(self.syms.get_input_channel_enable, "get_input_channel_enable")?;
        let mut enabled = false;
        status(unsafe { f(device, channel, &mut enabled) })?;
        Ok(enabled)
    }

    fn set_output_channel_enable(&self, device: c_int, channel: u32, enable: bool) -> RawResult<()> {
        let f = present(self.syms.set_output_channel_enable, "set_output_channel_enable")?;
        status(unsafe { f(device, channel, enable) })
    }

    fn get_output_channel_enable(&self, device: c_int, channel: u32) -> RawResult<bool> {
        let f = present(self.syms.get_output_channel_enable, "get_output_channel_enable")?;
        let mut enabled = false;
        status(unsafe { f(device, channel, &mut enabled) })?;
        Ok(enabled)
    }

    fn enable_stream(&self, device: c_int, a: c_int, b: c_int, c: c_int) -> RawResult<()> {
        status(unsafe { (self.syms.enable_stream)(device, a, b, c) })
    }

    fn disable_stream(&self, device: c_int, a: c_int, b: c_int, c: c_int) -> RawResult<()> {
        status(unsafe { (self.syms.disable_stream)(device, a, b, c) })
    }

    fn set_nco_frequency(&self, device: c_int, a: c_int, b: c_int, freq: f64) -> RawResult<()> {
        status(unsafe { (self.syms.set_nco_frequency)(device, a, b, freq) })
    }

    fn get_nco_frequency(&self, device: c_int, a: c_int, b: c_int) -> RawResult<f64> {
        let mut freq = 0.0;
        status(unsafe { (self.syms.get_nco_frequency)(device, a, b, &mut freq) })?;
        Ok(freq)
    }

    fn set_averager_settings(
        &self,
        device: c_int,
        record_length: c_int,
        segments: c_int,
        waveforms: c_int,
        round_robins: c_int,
    ) -> RawResult<()> {
        status(unsafe {
            (self.syms.set_averager_settings)(device, record_length, segments, waveforms, round_robins)
        })
    }

    fn set_threshold(&self, device: c_int, a: c_int, c: c_int, threshold: f64) -> RawResult<()> {
        status(unsafe { (self.syms.set_threshold)(device, a, c, threshold) })
    }

    fn get_threshold(&self, device: c_int, a: c_int, c: c_int) -> RawResult<f64> {
        let mut value = 0.0;
        status(unsafe { (self.syms.get_threshold)(device, a, c, &mut value) })?;
        Ok(value)
    }

    fn set_threshold_invert(&self, device: c_int, a: c_int, c: c_int, invert: bool) -> RawResult<()> {
        status(unsafe { (self.syms.set_threshold_invert)(device, a, c, invert) })
    }

    fn get_threshold_invert(&self, device: c_int, a: c_int, c: c_int) -> RawResult<bool> {
        let mut invert = false;
        status(unsafe { (self.syms.get_threshold_invert)(device, a, c, &mut invert) })?;
        Ok(invert)
    }

    fn write_kernel(&self, device: c_int, a: u32, b: u32, c: u32, kernel: &[Complex64]) -> RawResult<()> {
        let len = len_u32(kernel.len())?;
        // SAFETY: Complex64 is repr(C) { re, im }, matching double _Complex
        status(unsafe { (self.syms.write_kernel)(device, a, b, c, kernel.as_ptr(), len) })
    }

    fn read_kernel(&self, device: c_int, a: u32, b: u32, c: u32, addr: u32) -> RawResult<Complex64> {
        let mut value = Complex64::new(0.0, 0.0);
        status(unsafe { (self.syms.read_kernel)(device, a, b, c, addr, &mut value) })?;
        Ok(value)
    }

    fn set_kernel_bias(&self, device: c_int, a: u32, b: u32, c: u32, bias: Complex64) -> RawResult<()> {
        let mut bias = bias;
        status(unsafe { (self.syms.set_kernel_bias)(device, a, b, c, &mut bias) })
    }

    fn get_kernel_bias(&self, device: c_int, a: u32, b: u32, c: u32) -> RawResult<Complex64> {
        let mut bias = Complex64::new(0.0, 0.0);
        status(unsafe { (self.syms.get_kernel_bias)(device, a, b, c, &mut bias) })?;
        Ok(bias)
    }

    fn acquire(&self, device: c_int) -> RawResult<()> {
        status(unsafe { (self.syms.acquire)(device) })
    }

    fn wait_for_acquisition(&self, device: c_int, timeout_ms: u32) -> RawResult<()> {
        status(unsafe { (self.syms.wait_for_acquisition)(device, timeout_ms) })
    }

    fn stop(&self, device: c_int) -> RawResult<()> {
        status(unsafe { (self.syms.stop)(device) })
    }

    fn get_is_running(&self, device: c_int) -> RawResult<bool> {
        let mut running: c_int = 0;
        status(unsafe { (self.syms.get_is_running)(device, &mut running) })?;
        Ok(running != 0)
    }

    fn get_num_new_records(&self, device: c_int) -> RawResult<u32> {
        let mut n: c_uint = 0;
        status(unsafe { (self.syms.get_num_new_records)(device, &mut n) })?;
        Ok(n)
    }

    fn get_data_available(&self, device: c_int) -> RawResult<bool> {
        let f = present(self.syms.get_data_available, "get_data_available")?;
        let mut available = false;
        status(unsafe { f(device, &mut available) })?;
        Ok(available)
    }

    fn transfer_stream(&self, device: c_int, channels: &[ChannelTuple], buffer: &mut [f64]) -> RawResult<()> {
        let n = len_u32(channels.len())?;
        let len = len_u32(buffer.len())?;
        status(unsafe {
            (self.syms.transfer_stream)(device, channels.as_ptr(), n, buffer.as_mut_ptr(), len)
        })
    }

    fn transfer_variance(&self, device: c_int, channels: &[ChannelTuple], buffer: &mut [f64]) -> RawResult<()> {
        let n = len_u32(channels.len())?;
        let len = len_u32(buffer.len())?;
        status(unsafe {
            (self.syms.transfer_variance)(device, channels.as_ptr(), n, buffer.as_mut_ptr(), len)
        })
    }

    fn get_buffer_size(&self, device: c_int, channels: &[ChannelTuple]) -> RawResult<u32> {
        let n = len_u32(channels.len())?;
        let mut size: c_uint = 0;
        status(unsafe { (self.syms.get_buffer_size)(device, channels.as_ptr(), n, &mut size) })?;
        Ok(size)
    }

    fn get_variance_buffer_size(&self, device: c_int, channels: &[ChannelTuple]) -> RawResult<i32> {
        let n = len_u32(channels.len())?;
        let mut size: c_int = 0;
        status(unsafe {
            (self.syms.get_variance_buffer_size)(device, channels.as_ptr(), n, &mut size)
        })?;
        Ok(size)
    }

    fn get_record_length(&self, device: c_int, channel: &ChannelTuple) -> RawResult<u32> {
        let mut len: c_uint = 0;
        status(unsafe { (self.syms.get_record_length)(device, channel, &mut len) })?;
        Ok(len)
    }

    fn write_pulse_waveform(&self, device: c_int, pg: u32, waveform: &[f64]) -> RawResult<()> {
        let f = present(self.syms.write_pulse_waveform, "write_pulse_waveform")?;
        let len = len_u32(waveform.len())?;
        status(unsafe { f(device, pg, waveform.as_ptr(), len) })
    }

    fn read_pulse_waveform(&self, device: c_int, pg: u32, addr: u32) -> RawResult<f64> {
        let f = present(self.syms.read_pulse_waveform, "read_pulse_waveform")?;
        let mut value = 0.0;
        status(unsafe { f(device, pg, addr, &mut value) })?;
        Ok(value)
    }

    fn read_register(&self, device: c_int, addr: u32, offset: u32) -> RawResult<u32> {
        let f = present(self.syms.read_register, "read_register")?;
        let mut value = 0u32;
        status(unsafe { f(device, addr, offset, &mut value) })?;
        Ok(value)
    }

    fn write_register(&self, device: c_int, addr: u32, offset: u32, value: u32) -> RawResult<()> {
        let f = present(self.syms.write_register, "write_register")?;
        status(unsafe { f(device, addr, offset, value) })
    }

    fn get_logic_temperature(&self, device: c_int) -> RawResult<f32> {
        let mut temp: c_float = 0.0;
        status(unsafe { (self.syms.get_logic_temperature)(device, &mut temp) })?;
        Ok(temp)
    }
}

/// Platform-specific library format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LibraryFormat {
    /// Windows DLL.
    Dll,
    /// Linux/Unix shared object.
    So,
    /// macOS dynamic library.
    Dylib,
    /// Unknown format.
    Unknown,
}

impl LibraryFormat {
    /// Detect format from file extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        match path.as_ref().extension().and_then(|e| e.to_str()) {
            Some("dll") | Some("DLL") => Self::Dll,
            Some("so") => Self::So,
            Some("dylib") => Self::Dylib,
            _ => Self::Unknown,
        }
    }

    /// File name for library `stem` in this format.
    ///
    /// The driver is built as `libx6` on every platform, including Windows.
    pub fn file_name(&self, stem: &str) -> String {
        match self {
            Self::Dll => format!("lib{stem}.dll"),
            Self::So | Self::Unknown => format!("lib{stem}.so"),
            Self::Dylib => format!("lib{stem}.dylib"),
        }
    }

    /// Get the default format for the current platform.
    #[cfg(target_os = "windows")]
    pub fn native() -> Self {
        Self::Dll
    }

    #[cfg(target_os = "macos")]
    pub fn native() -> Self {
        Self::Dylib
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    pub fn native() -> Self {
        Self::So
    }
}

/// Read a C string, returning None if null or invalid UTF-8.
///
/// # Safety
/// The pointer must be null or point to a valid null-terminated C string.
unsafe fn read_c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: Caller guarantees ptr is valid if not null
    unsafe { CStr::from_ptr(ptr).to_str().ok().map(String::from) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_format_detection() {
        assert_eq!(LibraryFormat::from_path("libx6.dll"), LibraryFormat::Dll);
        assert_eq!(LibraryFormat::from_path("libx6.so"), LibraryFormat::So);
        assert_eq!(LibraryFormat::from_path("libx6.dylib"), LibraryFormat::Dylib);
        assert_eq!(LibraryFormat::from_path("libx6.txt"), LibraryFormat::Unknown);
    }

    #[test]
    fn test_locate_uses_platform_name() {
        let path = X6Library::locate("/opt/x6/build");
        let name = path.file_name().and_then(|n| n.to_str()).unwrap();
        assert!(name.starts_with("libx6."));
        assert_eq!(LibraryFormat::from_path(&path), LibraryFormat::native());
    }

    #[test]
    fn test_load_missing_library() {
        let err = X6Library::load("/nonexistent/libx6.so").err().unwrap();
        assert!(matches!(err, X6Error::LoadError { .. }));
    }

    #[test]
    fn test_load_from_dir_uses_located_path() {
        let err = X6Library::load_from_dir("/nonexistent/x6").err().unwrap();
        let expected = X6Library::locate("/nonexistent/x6").display().to_string();
        assert!(matches!(err, X6Error::LoadError { ref path, .. } if *path == expected));
    }

    #[test]
    fn test_read_c_string_null() {
        assert_eq!(unsafe { read_c_string(std::ptr::null()) }, None);
        let s = CString::new("X6_OK").unwrap();
        assert_eq!(unsafe { read_c_string(s.as_ptr()) }.as_deref(), Some("X6_OK"));
    }
}
