//! In-memory stand-in for libx6.
//!
//! `MockX6` implements [`X6Api`] with a small device table and canned
//! stream buffers so sessions can be exercised without a card. Status codes
//! and messages follow the real driver's conventions.

use crate::api::{status, RawError, RawResult, X6Api};
use lib_types::channel::ChannelTuple;
use lib_types::firmware::FirmwareVersion;
use lib_types::status::X6Status;
use lib_types::Complex64;
use std::collections::{BTreeSet, HashMap};
use std::ffi::CString;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Default)]
struct DeviceState {
    reference: u32,
    mode: u32,
    trigger: u32,
    streams: BTreeSet<ChannelTuple>,
    nco: HashMap<(i32, i32), f64>,
    thresholds: HashMap<(i32, i32), (f64, bool)>,
    kernels: HashMap<(u32, u32, u32), Vec<Complex64>>,
    biases: HashMap<(u32, u32, u32), Complex64>,
    averager: Option<[i32; 4]>,
    registers: HashMap<(u32, u32), u32>,
    pulse_waveforms: HashMap<u32, Vec<f64>>,
    input_enable: HashMap<u32, bool>,
    output_enable: HashMap<u32, bool>,
    running: bool,
}

#[derive(Debug, Default)]
struct MockState {
    num_devices: u32,
    connected: HashMap<i32, DeviceState>,
    calls: Vec<String>,
    log_target: Option<String>,
    log_level: i32,
    streams: HashMap<Vec<ChannelTuple>, Vec<f64>>,
    variances: HashMap<Vec<ChannelTuple>, Vec<f64>>,
    variance_sizes: HashMap<Vec<ChannelTuple>, i32>,
    record_lengths: HashMap<ChannelTuple, u32>,
    new_records: u32,
    wait_delay: Option<Duration>,
    wait_status: i32,
    panic_on_transfer: bool,
    without_optional: bool,
}

/// Fake libx6 with `num_devices` cards attached.
#[derive(Debug, Default)]
pub struct MockX6 {
    state: Mutex<MockState>,
}

impl MockX6 {
    pub fn new(num_devices: u32) -> Self {
        Self {
            state: Mutex::new(MockState {
                num_devices,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Canned transfer buffer for a stream (or correlation of several).
    pub fn set_stream_data(&self, channels: &[ChannelTuple], data: Vec<f64>) {
        self.lock().streams.insert(channels.to_vec(), data);
    }

    pub fn set_variance_data(&self, channels: &[ChannelTuple], data: Vec<f64>) {
        self.lock().variances.insert(channels.to_vec(), data);
    }

    /// Report `size` from `get_variance_buffer_size` instead of the data
    /// length; the driver answers negative before anything is accumulated.
    pub fn set_variance_buffer_size(&self, channels: &[ChannelTuple], size: i32) {
        self.lock().variance_sizes.insert(channels.to_vec(), size);
    }

    pub fn set_record_length(&self, channel: ChannelTuple, len: u32) {
        self.lock().record_lengths.insert(channel, len);
    }

    pub fn set_new_records(&self, n: u32) {
        self.lock().new_records = n;
    }

    /// Make `wait_for_acquisition` block for `delay` before returning.
    pub fn set_wait_delay(&self, delay: Duration) {
        self.lock().wait_delay = Some(delay);
    }

    /// Status returned by `wait_for_acquisition`.
    pub fn set_wait_status(&self, status: X6Status) {
        self.lock().wait_status = status.code();
    }

    pub fn set_panic_on_transfer(&self, panic: bool) {
        self.lock().panic_on_transfer = panic;
    }

    /// Behave like an older build without the optional entry points.
    pub fn without_optional_symbols(self) -> Self {
        self.lock().without_optional = true;
        self
    }

    /// Names of the entry points called so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn is_connected(&self, device: i32) -> bool {
        self.lock().connected.contains_key(&device)
    }

    pub fn log_target(&self) -> Option<String> {
        self.lock().log_target.clone()
    }

    pub fn log_level(&self) -> i32 {
        self.lock().log_level
    }

    pub fn enabled_streams(&self, device: i32) -> Vec<ChannelTuple> {
        self.lock()
            .connected
            .get(&device)
            .map(|d| d.streams.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn averager_settings(&self, device: i32) -> Option<[i32; 4]> {
        self.lock().connected.get(&device).and_then(|d| d.averager)
    }

    /// Run `f` against a connected device, recording the call.
    fn with_device<T>(
        &self,
        name: &str,
        device: i32,
        f: impl FnOnce(&mut DeviceState) -> RawResult<T>,
    ) -> RawResult<T> {
        let mut state = self.lock();
        state.calls.push(name.to_string());
        match state.connected.get_mut(&device) {
            Some(dev) => f(dev),
            None => Err(RawError::Status(X6Status::Unconnected.code())),
        }
    }

    fn optional(&self, name: &'static str) -> RawResult<()> {
        if self.lock().without_optional {
            Err(RawError::Missing(name))
        } else {
            Ok(())
        }
    }
}

fn invalid_channel() -> RawError {
    RawError::Status(X6Status::InvalidChannel.code())
}

impl X6Api for MockX6 {
    fn error_message(&self, code: i32) -> Option<String> {
        Some(
            X6Status::from_code(code)
                .map(|s| s.default_message().to_string())
                .unwrap_or_else(|| "No error message for this status number.".to_string()),
        )
    }

    fn get_num_devices(&self) -> RawResult<u32> {
        let mut state = self.lock();
        state.calls.push("get_num_devices".into());
        Ok(state.num_devices)
    }

    fn set_log(&self, target: &CString) -> RawResult<()> {
        let mut state = self.lock();
        state.calls.push("set_log".into());
        state.log_target = Some(target.to_string_lossy().into_owned());
        Ok(())
    }

    fn set_logging_level(&self, level: i32) -> RawResult<()> {
        let mut state = self.lock();
        state.calls.push("set_logging_level".into());
        state.log_level = level;
        Ok(())
    }

    fn connect_x6(&self, device: i32) -> RawResult<()> {
        let mut state = self.lock();
        state.calls.push("connect_x6".into());
        if device < 0 || device as u32 >= state.num_devices {
            return Err(RawError::Status(X6Status::NoDeviceFound.code()));
        }
        state.connected.entry(device).or_default();
        Ok(())
    }

    fn disconnect_x6(&self, device: i32) -> RawResult<()> {
        let mut state = self.lock();
        state.calls.push("disconnect_x6".into());
        match state.connected.remove(&device) {
            Some(_) => Ok(()),
            None => Err(RawError::Status(X6Status::Unconnected.code())),
        }
    }

    fn get_firmware_version(&self, device: i32) -> RawResult<FirmwareVersion> {
        self.with_device("get_firmware_version", device, |_| {
            Ok(FirmwareVersion::from_words(0x0000_0104, 0x1a2b_3c4d, 0x1612_0100))
        })
    }

    fn set_reference_source(&self, device: i32, source: u32) -> RawResult<()> {
        self.with_device("set_reference_source", device, |d| {
            d.reference = source;
            Ok(())
        })
    }

    fn get_reference_source(&self, device: i32) -> RawResult<u32> {
        self.with_device("get_reference_source", device, |d| Ok(d.reference))
    }

    fn set_digitizer_mode(&self, device: i32, mode: u32) -> RawResult<()> {
        self.with_device("set_digitizer_mode", device, |d| {
            d.mode = mode;
            Ok(())
        })
    }

    fn get_digitizer_mode(&self, device: i32) -> RawResult<u32> {
        self.with_device("get_digitizer_mode", device, |d| Ok(d.mode))
    }

    fn set_trigger_source(&self, device: i32, source: u32) -> RawResult<()> {
        self.optional("set_trigger_source")?;
        self.with_device("set_trigger_source", device, |d| {
            d.trigger = source;
            Ok(())
        })
    }

    fn get_trigger_source(&self, device: i32) -> RawResult<u32> {
        self.optional("get_trigger_source")?;
        self.with_device("get_trigger_source", device, |d| Ok(d.trigger))
    }

    fn get_sample_rate(&self, device: i32) -> RawResult<f64> {
        self.optional("get_sampleRate")?;
        self.with_device("get_sampleRate", device, |_| Ok(1e9))
    }

    fn set_input_channel_enable(&self, device: i32, channel: u32, enable: bool) -> RawResult<()> {
        self.optional("set_input_channel_enable")?;
        self.with_device("set_input_channel_enable", device, |d| {
            d.input_enable.insert(channel, enable);
            Ok(())
        })
    }

    fn get_input_channel_enable(&self, device: i32, channel: u32) -> RawResult<bool> {
        self.optional("get_input_channel_enable")?;
        self.with_device("get_input_channel_enable", device, |d| {
            Ok(d.input_enable.get(&channel).copied().unwrap_or(true))
        })
    }

    fn set_output_channel_enable(&self, device: i32, channel: u32, enable: bool) -> RawResult<()> {
        self.optional("set_output_channel_enable")?;
        self.with_device("set_output_channel_enable", device, |d| {
            d.output_enable.insert(channel, enable);
            Ok(())
        })
    }

    fn get_output_channel_enable(&self, device: i32, channel: u32) -> RawResult<bool> {
        self.optional("get_output_channel_enable")?;
        self.with_device("get_output_channel_enable", device, |d| {
            Ok(d.output_enable.get(&channel).copied().unwrap_or(false))
        })
    }

    fn enable_stream(&self, device: i32, a: i32, b: i32, c: i32) -> RawResult<()> {
        self.with_device("enable_stream", device, |d| {
            if !(1..=2).contains(&a) || b < 0 || c < 0 {
                return Err(invalid_channel());
            }
            d.streams.insert(ChannelTuple::new(a, b, c));
            Ok(())
        })
    }

    fn disable_stream(&self, device: i32, a: i32, b: i32, c: i32) -> RawResult<()> {
        self.with_device("disable_stream", device, |d| {
            d.streams.remove(&ChannelTuple::new(a, b, c));
            Ok(())
        })
    }

    fn set_nco_frequency(&self, device: i32, a: i32, b: i32, freq: f64) -> RawResult<()> {
        self.with_device("set_nco_frequency", device, |d| {
            d.nco.insert((a, b), freq);
            Ok(())
        })
    }

    fn get_nco_frequency(&self, device: i32, a: i32, b: i32) -> RawResult<f64> {
        self.with_device("get_nco_frequency", device, |d| {
            Ok(d.nco.get(&(a, b)).copied().unwrap_or(0.0))
        })
    }

    fn set_averager_settings(
        &self,
        device: i32,
        record_length: i32,
        segments: i32,
        waveforms: i32,
        round_robins: i32,
    ) -> RawResult<()> {
        self.with_device("set_averager_settings", device, |d| {
            d.averager = Some([record_length, segments, waveforms, round_robins]);
            Ok(())
        })
    }

    fn set_threshold(&self, device: i32, a: i32, c: i32, threshold: f64) -> RawResult<()> {
        self.with_device("set_threshold", device, |d| {
            d.thresholds.entry((a, c)).or_default().0 = threshold;
            Ok(())
        })
    }

    fn get_threshold(&self, device: i32, a: i32, c: i32) -> RawResult<f64> {
        self.with_device("get_threshold", device, |d| {
            Ok(d.thresholds.get(&(a, c)).map(|t| t.0).unwrap_or(0.0))
        })
    }

    fn set_threshold_invert(&self, device: i32, a: i32, c: i32, invert: bool) -> RawResult<()> {
        self.with_device("set_threshold_invert", device, |d| {
            d.thresholds.entry((a, c)).or_default().1 = invert;
            Ok(())
        })
    }

    fn get_threshold_invert(&self, device: i32, a: i32, c: i32) -> RawResult<bool> {
        self.with_device("get_threshold_invert", device, |d| {
            Ok(d.thresholds.get(&(a, c)).map(|t| t.1).unwrap_or(false))
        })
    }

    fn write_kernel(&self, device: i32, a: u32, b: u32, c: u32, kernel: &[Complex64]) -> RawResult<()> {
        self.with_device("write_kernel", device, |d| {
            if c == 0 {
                return Err(RawError::Status(X6Status::InvalidKernelStream.code()));
            }
            d.kernels.insert((a, b, c), kernel.to_vec());
            Ok(())
        })
    }

    fn read_kernel(&self, device: i32, a: u32, b: u32, c: u32, addr: u32) -> RawResult<Complex64> {
        self.with_device("read_kernel", device, |d| {
            d.kernels
                .get(&(a, b, c))
                .and_then(|k| k.get(addr as usize))
                .copied()
                .ok_or_else(invalid_channel)
        })
    }

    fn set_kernel_bias(&self, device: i32, a: u32, b: u32, c: u32, bias: Complex64) -> RawResult<()> {
        self.with_device("set_kernel_bias", device, |d| {
            d.biases.insert((a, b, c), bias);
            Ok(())
        })
    }

    fn get_kernel_bias(&self, device: i32, a: u32, b: u32, c: u32) -> RawResult<Complex64> {
        self.with_device("get_kernel_bias", device, |d| {
            Ok(d.biases.get(&(a, b, c)).copied().unwrap_or_default())
        })
    }

    fn acquire(&self, device: i32) -> RawResult<()> {
        self.with_device("acquire", device, |d| {
            d.running = true;
            Ok(())
        })
    }

    fn wait_for_acquisition(&self, device: i32, _timeout_ms: u32) -> RawResult<()> {
        let (delay, code) = {
            let mut state = self.lock();
            state.calls.push("wait_for_acquisition".into());
            if !state.connected.contains_key(&device) {
                return Err(RawError::Status(X6Status::Unconnected.code()));
            }
            (state.wait_delay, state.wait_status)
        };
        // sleep without holding the lock
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        status(code)
    }

    fn stop(&self, device: i32) -> RawResult<()> {
        self.with_device("stop", device, |d| {
            d.running = false;
            Ok(())
        })
    }

    fn get_is_running(&self, device: i32) -> RawResult<bool> {
        self.with_device("get_is_running", device, |d| Ok(d.running))
    }

    fn get_num_new_records(&self, device: i32) -> RawResult<u32> {
        let n = self.lock().new_records;
        self.with_device("get_num_new_records", device, |_| Ok(n))
    }

    fn get_data_available(&self, device: i32) -> RawResult<bool> {
        self.optional("get_data_available")?;
        let n = self.lock().new_records;
        self.with_device("get_data_available", device, |_| Ok(n > 0))
    }

    fn transfer_stream(&self, device: i32, channels: &[ChannelTuple], buffer: &mut [f64]) -> RawResult<()> {
        let (data, panic) = {
            let mut state = self.lock();
            state.calls.push("transfer_stream".into());
            if !state.connected.contains_key(&device) {
                return Err(RawError::Status(X6Status::Unconnected.code()));
            }
            (state.streams.get(channels).cloned(), state.panic_on_transfer)
        };
        if panic {
            panic!("mock transfer failure");
        }
        let data = data.ok_or_else(invalid_channel)?;
        let n = buffer.len().min(data.len());
        buffer[..n].copy_from_slice(&data[..n]);
        Ok(())
    }

    fn transfer_variance(&self, device: i32, channels: &[ChannelTuple], buffer: &mut [f64]) -> RawResult<()> {
        let data = {
            let mut state = self.lock();
            state.calls.push("transfer_variance".into());
            if !state.connected.contains_key(&device) {
                return Err(RawError::Status(X6Status::Unconnected.code()));
            }
            state.variances.get(channels).cloned()
        };
        let data = data.ok_or_else(invalid_channel)?;
        let n = buffer.len().min(data.len());
        buffer[..n].copy_from_slice(&data[..n]);
        Ok(())
    }

    fn get_buffer_size(&self, device: i32, channels: &[ChannelTuple]) -> RawResult<u32> {
        let size = self.lock().streams.get(channels).map(|d| d.len() as u32);
        self.with_device("get_buffer_size", device, |_| size.ok_or_else(invalid_channel))
    }

    fn get_variance_buffer_size(&self, device: i32, channels: &[ChannelTuple]) -> RawResult<i32> {
        let size = {
            let state = self.lock();
            state
                .variance_sizes
                .get(channels)
                .copied()
                .or_else(|| state.variances.get(channels).map(|d| d.len() as i32))
        };
        self.with_device("get_variance_buffer_size", device, |_| size.ok_or_else(invalid_channel))
    }

    fn get_record_length(&self, device: i32, channel: &ChannelTuple) -> RawResult<u32> {
        let len = self.lock().record_lengths.get(channel).copied();
        self.with_device("get_record_length", device, |_| len.ok_or_else(invalid_channel))
    }

    fn write_pulse_waveform(&self, device: i32, pg: u32, waveform: &[f64]) -> RawResult<()> {
        self.optional("write_pulse_waveform")?;
        self.with_device("write_pulse_waveform", device, |d| {
            d.pulse_waveforms.insert(pg, waveform.to_vec());
            Ok(())
        })
    }

    fn read_pulse_waveform(&self, device: i32, pg: u32, addr: u32) -> RawResult<f64> {
        self.optional("read_pulse_waveform")?;
        self.with_device("read_pulse_waveform", device, |d| {
            d.pulse_waveforms
                .get(&pg)
                .and_then(|wf| wf.get(addr as usize))
                .copied()
                .ok_or(RawError::Status(X6Status::InvalidWfLen.code()))
        })
    }

    fn read_register(&self, device: i32, addr: u32, offset: u32) -> RawResult<u32> {
        self.optional("read_register")?;
        self.with_device("read_register", device, |d| {
            Ok(d.registers.get(&(addr, offset)).copied().unwrap_or(0))
        })
    }

    fn write_register(&self, device: i32, addr: u32, offset: u32, value: u32) -> RawResult<()> {
        self.optional("write_register")?;
        self.with_device("write_register", device, |d| {
            d.registers.insert((addr, offset), value);
            Ok(())
        })
    }

    fn get_logic_temperature(&self, device: i32) -> RawResult<f32> {
        self.with_device("get_logic_temperature", device, |_| Ok(42.5))
    }
}
