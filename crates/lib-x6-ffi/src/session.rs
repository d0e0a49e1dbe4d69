//! X6 device session.
//!
//! An [`X6Session`] binds one card id on a loaded library and exposes the
//! device-level entry points as typed methods. It owns the connection:
//! dropping a bound session disconnects the card.
//!
//! Calls that can block inside the driver (waiting for an acquisition and
//! the bulk transfers) run on a worker thread with a timeout and panic
//! capture. A driver call that never returns cannot be cancelled, so the
//! worker is left running and counted as orphaned; once too many accumulate
//! new blocking calls are refused.

use crate::api::{check, RawError, RawResult, X6Api};
use crate::error::{X6Error, X6Result};
use lib_types::channel::{ChannelTuple, SampleLayout};
use lib_types::enums::{DigitizerMode, ReferenceSource, TriggerSource};
use lib_types::firmware::FirmwareVersion;
use lib_types::kernel::{validate_kernel, validate_pulse_waveform};
use lib_types::samples::{
    deinterleave_complex, deinterleave_variance, whole_round_robins, AveragerSettings, StreamData,
    VarianceTriple,
};
use lib_types::units::{Celsius, Hertz};
use lib_types::Complex64;
use crossbeam::channel::RecvTimeoutError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Worker threads from timed-out calls that are still blocked in the driver.
static ORPHANED_THREAD_COUNT: AtomicUsize = AtomicUsize::new(0);

const MAX_ORPHANED_THREADS: usize = 10;

/// Configuration for blocking driver calls.
#[derive(Clone, Debug)]
pub struct ExecutionConfig {
    /// Maximum time for a single transfer.
    pub timeout: Duration,

    /// Added to the caller's timeout when waiting for an acquisition, so the
    /// driver gets the chance to report its own timeout first.
    pub wait_margin: Duration,

    /// Whether to catch panics on the worker thread.
    pub catch_panics: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            wait_margin: Duration::from_secs(5),
            catch_panics: true,
        }
    }
}

/// A session on one X6 card.
///
/// Device calls on a session with no card bound fail with
/// [`X6Error::NotConnected`] without reaching the driver.
pub struct X6Session<A: X6Api + 'static> {
    api: Arc<A>,
    device_id: Option<i32>,
    averager: AveragerSettings,
    config: ExecutionConfig,
    /// Blocking calls currently running on worker threads.
    pending_ops: Arc<AtomicUsize>,
}

impl<A: X6Api + 'static> X6Session<A> {
    /// Create an unbound session.
    pub fn new(api: Arc<A>) -> Self {
        Self::with_config(api, ExecutionConfig::default())
    }

    pub fn with_config(api: Arc<A>, config: ExecutionConfig) -> Self {
        Self {
            api,
            device_id: None,
            averager: AveragerSettings::default(),
            config,
            pending_ops: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    pub fn device_id(&self) -> Option<i32> {
        self.device_id
    }

    pub fn is_connected(&self) -> bool {
        self.device_id.is_some()
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn averager(&self) -> AveragerSettings {
        self.averager
    }

    fn device(&self) -> X6Result<i32> {
        self.device_id.ok_or(X6Error::NotConnected)
    }

    fn check<T>(&self, operation: &str, result: RawResult<T>) -> X6Result<T> {
        check(&*self.api, operation, result)
    }

    // ---- connection ----

    /// Connect to card `device_id`.
    ///
    /// A session that is already bound disconnects its current card first.
    pub fn connect(&mut self, device_id: i32) -> X6Result<()> {
        if let Some(current) = self.device_id {
            tracing::warn!(
                current,
                requested = device_id,
                "Session already connected, disconnecting first"
            );
            if let Err(e) = self.disconnect() {
                tracing::warn!(error = %e, "Disconnect before reconnect failed");
                self.device_id = None;
            }
        }

        self.check("connect_x6", self.api.connect_x6(device_id))?;
        self.device_id = Some(device_id);
        tracing::info!(device_id, "Connected to X6");
        Ok(())
    }

    /// Disconnect the bound card.
    pub fn disconnect(&mut self) -> X6Result<()> {
        let device_id = self.device()?;
        let result = self.check("disconnect_x6", self.api.disconnect_x6(device_id));
        // the binding is released even if the driver complained
        self.device_id = None;
        result?;
        tracing::info!(device_id, "Disconnected from X6");
        Ok(())
    }

    // ---- device information ----

    pub fn firmware_version(&self) -> X6Result<FirmwareVersion> {
        let device = self.device()?;
        self.check("get_firmware_version", self.api.get_firmware_version(device))
    }

    pub fn sample_rate(&self) -> X6Result<Hertz> {
        let device = self.device()?;
        self.check("get_sampleRate", self.api.get_sample_rate(device))
            .map(Hertz)
    }

    /// Temperature of the FPGA logic.
    pub fn logic_temperature(&self) -> X6Result<Celsius> {
        let device = self.device()?;
        self.check("get_logic_temperature", self.api.get_logic_temperature(device))
            .map(Celsius)
    }

    // ---- clocking, mode and trigger ----

    pub fn reference_source(&self) -> X6Result<ReferenceSource> {
        let device = self.device()?;
        let raw = self.check("get_reference_source", self.api.get_reference_source(device))?;
        Ok(ReferenceSource::from_raw(raw)?)
    }

    pub fn set_reference_source(&self, source: ReferenceSource) -> X6Result<()> {
        let device = self.device()?;
        self.check(
            "set_reference_source",
            self.api.set_reference_source(device, source.as_raw()),
        )?;
        tracing::debug!(device, %source, "Set reference source");
        Ok(())
    }

    pub fn digitizer_mode(&self) -> X6Result<DigitizerMode> {
        let device = self.device()?;
        let raw = self.check("get_digitizer_mode", self.api.get_digitizer_mode(device))?;
        Ok(DigitizerMode::from_raw(raw)?)
    }

    pub fn set_digitizer_mode(&self, mode: DigitizerMode) -> X6Result<()> {
        let device = self.device()?;
        self.check("set_digitizer_mode", self.api.set_digitizer_mode(device, mode.as_raw()))?;
        tracing::debug!(device, %mode, "Set digitizer mode");
        Ok(())
    }

    pub fn trigger_source(&self) -> X6Result<TriggerSource> {
        let device = self.device()?;
        let raw = self.check("get_trigger_source", self.api.get_trigger_source(device))?;
        Ok(TriggerSource::from_raw(raw)?)
    }

    pub fn set_trigger_source(&self, source: TriggerSource) -> X6Result<()> {
        let device = self.device()?;
        self.check(
            "set_trigger_source",
            self.api.set_trigger_source(device, source.as_raw()),
        )
    }

    // ---- analog front end ----

    pub fn input_channel_enable(&self, channel: u32) -> X6Result<bool> {
        let device = self.device()?;
        self.check(
            "get_input_channel_enable",
            self.api.get_input_channel_enable(device, channel),
        )
    }

    pub fn set_input_channel_enable(&self, channel: u32, enable: bool) -> X6Result<()> {
        let device = self.device()?;
        self.check(
            "set_input_channel_enable",
            self.api.set_input_channel_enable(device, channel, enable),
        )
    }

    pub fn output_channel_enable(&self, channel: u32) -> X6Result<bool> {
        let device = self.device()?;
        self.check(
            "get_output_channel_enable",
            self.api.get_output_channel_enable(device, channel),
        )
    }

    pub fn set_output_channel_enable(&self, channel: u32, enable: bool) -> X6Result<()> {
        let device = self.device()?;
        self.check(
            "set_output_channel_enable",
            self.api.set_output_channel_enable(device, channel, enable),
        )
    }

    // ---- streams and signal processing ----

    pub fn enable_stream(&self, channel: ChannelTuple) -> X6Result<()> {
        let device = self.device()?;
        self.check(
            "enable_stream",
            self.api.enable_stream(device, channel.a, channel.b, channel.c),
        )?;
        tracing::debug!(device, %channel, "Enabled stream");
        Ok(())
    }

    pub fn disable_stream(&self, channel: ChannelTuple) -> X6Result<()> {
        let device = self.device()?;
        self.check(
            "disable_stream",
            self.api.disable_stream(device, channel.a, channel.b, channel.c),
        )
    }

    /// Demodulation frequency of virtual channel `(a, b)`.
    pub fn nco_frequency(&self, a: i32, b: i32) -> X6Result<Hertz> {
        let device = self.device()?;
        self.check("get_nco_frequency", self.api.get_nco_frequency(device, a, b))
            .map(Hertz)
    }

    pub fn set_nco_frequency(&self, a: i32, b: i32, freq: Hertz) -> X6Result<()> {
        let device = self.device()?;
        self.check(
            "set_nco_frequency",
            self.api.set_nco_frequency(device, a, b, freq.0),
        )?;
        tracing::debug!(device, a, b, %freq, "Set NCO frequency");
        Ok(())
    }

    /// Samples per record for `channel` with the current settings.
    pub fn record_length(&self, channel: ChannelTuple) -> X6Result<u32> {
        let device = self.device()?;
        self.check("get_record_length", self.api.get_record_length(device, &channel))
    }

    pub fn threshold(&self, a: i32, c: i32) -> X6Result<f64> {
        let device = self.device()?;
        self.check("get_threshold", self.api.get_threshold(device, a, c))
    }

    pub fn set_threshold(&self, a: i32, c: i32, threshold: f64) -> X6Result<()> {
        let device = self.device()?;
        self.check("set_threshold", self.api.set_threshold(device, a, c, threshold))
    }

    pub fn threshold_invert(&self, a: i32, c: i32) -> X6Result<bool> {
        let device = self.device()?;
        self.check("get_threshold_invert", self.api.get_threshold_invert(device, a, c))
    }

    pub fn set_threshold_invert(&self, a: i32, c: i32, invert: bool) -> X6Result<()> {
        let device = self.device()?;
        self.check(
            "set_threshold_invert",
            self.api.set_threshold_invert(device, a, c, invert),
        )
    }

    // ---- kernels ----

    /// Load an integration kernel. The kernel is checked against the
    /// stream's memory depth and the fixed-point range first.
    pub fn write_kernel(&self, channel: ChannelTuple, kernel: &[Complex64]) -> X6Result<()> {
        let device = self.device()?;
        validate_kernel(&channel, kernel)?;
        let (a, b, c) = kernel_address(channel)?;
        self.check("write_kernel", self.api.write_kernel(device, a, b, c, kernel))?;
        tracing::debug!(device, %channel, len = kernel.len(), "Wrote kernel");
        Ok(())
    }

    pub fn read_kernel(&self, channel: ChannelTuple, offset: u32) -> X6Result<Complex64> {
        let device = self.device()?;
        let (a, b, c) = kernel_address(channel)?;
        self.check("read_kernel", self.api.read_kernel(device, a, b, c, offset))
    }

    pub fn kernel_bias(&self, channel: ChannelTuple) -> X6Result<Complex64> {
        let device = self.device()?;
        let (a, b, c) = kernel_address(channel)?;
        self.check("get_kernel_bias", self.api.get_kernel_bias(device, a, b, c))
    }

    pub fn set_kernel_bias(&self, channel: ChannelTuple, bias: Complex64) -> X6Result<()> {
        let device = self.device()?;
        let (a, b, c) = kernel_address(channel)?;
        self.check("set_kernel_bias", self.api.set_kernel_bias(device, a, b, c, bias))
    }

    // ---- pulse generators ----

    pub fn write_pulse_waveform(&self, pg: u32, waveform: &[f64]) -> X6Result<()> {
        let device = self.device()?;
        validate_pulse_waveform(waveform)?;
        self.check(
            "write_pulse_waveform",
            self.api.write_pulse_waveform(device, pg, waveform),
        )
    }

    pub fn read_pulse_waveform(&self, pg: u32, addr: u32) -> X6Result<f64> {
        let device = self.device()?;
        self.check("read_pulse_waveform", self.api.read_pulse_waveform(device, pg, addr))
    }

    // ---- registers ----

    pub fn read_register(&self, addr: u32, offset: u32) -> X6Result<u32> {
        let device = self.device()?;
        self.check("read_register", self.api.read_register(device, addr, offset))
    }

    pub fn write_register(&self, addr: u32, offset: u32, value: u32) -> X6Result<()> {
        let device = self.device()?;
        tracing::debug!(device, addr, offset, value, "Writing register");
        self.check(
            "write_register",
            self.api.write_register(device, addr, offset, value),
        )
    }

    // ---- acquisition ----

    /// Store averager settings for the next [`acquire`](Self::acquire).
    pub fn set_averager(&mut self, settings: AveragerSettings) -> X6Result<()> {
        settings.validate()?;
        self.averager = settings;
        Ok(())
    }

    /// Push the averager settings and start acquiring.
    pub fn acquire(&self) -> X6Result<()> {
        let device = self.device()?;
        let s = self.averager;
        self.check(
            "set_averager_settings",
            self.api.set_averager_settings(
                device,
                to_c_int("record_length", s.record_length)?,
                to_c_int("segments", s.segments)?,
                to_c_int("waveforms", s.waveforms)?,
                to_c_int("round_robins", s.round_robins)?,
            ),
        )?;
        self.check("acquire", self.api.acquire(device))?;
        tracing::info!(
            device,
            record_length = s.record_length,
            segments = s.segments,
            waveforms = s.waveforms,
            round_robins = s.round_robins,
            "Acquisition started"
        );
        Ok(())
    }

    /// Block until the acquisition completes or `timeout` passes.
    ///
    /// A driver-side timeout is reported as an [`X6Error::Status`] with
    /// [`X6Status::Timeout`](lib_types::X6Status::Timeout).
    pub fn wait_for_acquisition(&self, timeout: Duration) -> X6Result<()> {
        let device = self.device()?;
        let timeout_ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
        let api = self.api.clone();
        let result = self.execute_protected(timeout.saturating_add(self.config.wait_margin), move || {
            api.wait_for_acquisition(device, timeout_ms)
        })?;
        self.check("wait_for_acquisition", result)
    }

    pub fn stop(&self) -> X6Result<()> {
        let device = self.device()?;
        self.check("stop", self.api.stop(device))?;
        tracing::info!(device, "Acquisition stopped");
        Ok(())
    }

    pub fn is_running(&self) -> X6Result<bool> {
        let device = self.device()?;
        self.check("get_is_running", self.api.get_is_running(device))
    }

    pub fn num_new_records(&self) -> X6Result<u32> {
        let device = self.device()?;
        self.check("get_num_new_records", self.api.get_num_new_records(device))
    }

    /// Whether records are waiting to be transferred. Builds without
    /// `get_data_available` fall back to the new-record count.
    pub fn data_available(&self) -> X6Result<bool> {
        let device = self.device()?;
        match self.api.get_data_available(device) {
            Err(RawError::Missing(_)) => Ok(self.num_new_records()? > 0),
            result => self.check("get_data_available", result),
        }
    }

    // ---- transfers ----

    /// Transfer the buffered data of one stream.
    ///
    /// In digitizer mode the transfer is cut to whole round robins; `None`
    /// means less than one record set is available.
    pub fn transfer_stream(&self, channel: ChannelTuple) -> X6Result<Option<StreamData>> {
        let device = self.device()?;
        let channels = vec![channel];
        let mut size =
            self.check("get_buffer_size", self.api.get_buffer_size(device, &channels))? as usize;

        if self.digitizer_mode()? == DigitizerMode::Digitizer {
            let record_length = self.record_length(channel)? as usize;
            let available = size;
            size = whole_round_robins(
                size,
                record_length,
                self.averager.waveforms as usize,
                self.averager.segments as usize,
            );
            tracing::trace!(%channel, available, size, "Truncated to whole round robins");
        }

        if size == 0 {
            return Ok(None);
        }

        let buffer = self.transfer_protected("transfer_stream", device, channels, size, false)?;
        Ok(Some(StreamData::from_buffer(buffer, channel.sample_layout())))
    }

    /// Transfer the running variance of one stream (averager mode).
    pub fn transfer_variance(&self, channel: ChannelTuple) -> X6Result<VarianceTriple> {
        let device = self.device()?;
        let channels = vec![channel];
        let size = self.variance_buffer_size(device, &channels)?;
        if size == 0 {
            return Ok(VarianceTriple::default());
        }
        let buffer = self.transfer_protected("transfer_variance", device, channels, size, true)?;
        Ok(deinterleave_variance(&buffer, channel.sample_layout()))
    }

    /// Transfer the correlator output for a set of streams.
    pub fn transfer_correlation(&self, channels: &[ChannelTuple]) -> X6Result<Option<Vec<Complex64>>> {
        let device = self.device()?;
        require_channels(channels)?;
        let size = self.check("get_buffer_size", self.api.get_buffer_size(device, channels))? as usize;
        if size == 0 {
            return Ok(None);
        }
        let buffer =
            self.transfer_protected("transfer_stream", device, channels.to_vec(), size, false)?;
        Ok(Some(deinterleave_complex(&buffer)))
    }

    pub fn transfer_correlation_variance(&self, channels: &[ChannelTuple]) -> X6Result<VarianceTriple> {
        let device = self.device()?;
        require_channels(channels)?;
        let size = self.variance_buffer_size(device, channels)?;
        if size == 0 {
            return Ok(VarianceTriple::default());
        }
        let buffer =
            self.transfer_protected("transfer_variance", device, channels.to_vec(), size, true)?;
        Ok(deinterleave_variance(&buffer, SampleLayout::Complex))
    }

    fn variance_buffer_size(&self, device: i32, channels: &[ChannelTuple]) -> X6Result<usize> {
        let size = self.check(
            "get_variance_buffer_size",
            self.api.get_variance_buffer_size(device, channels),
        )?;
        // a negative size means nothing has been accumulated yet
        Ok(usize::try_from(size).unwrap_or(0))
    }

    /// Run one bulk transfer on a worker thread.
    fn transfer_protected(
        &self,
        operation: &'static str,
        device: i32,
        channels: Vec<ChannelTuple>,
        size: usize,
        variance: bool,
    ) -> X6Result<Vec<f64>> {
        let api = self.api.clone();
        let started = Instant::now();
        let result = self.execute_protected(self.config.timeout, move || {
            let mut buffer = vec![0.0f64; size];
            let status = if variance {
                api.transfer_variance(device, &channels, &mut buffer)
            } else {
                api.transfer_stream(device, &channels, &mut buffer)
            };
            status.map(|_| buffer)
        })?;
        let buffer = self.check(operation, result)?;
        tracing::debug!(
            device,
            operation,
            samples = buffer.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "Transfer complete"
        );
        Ok(buffer)
    }

    /// Execute a function with timeout and panic protection.
    ///
    /// If the call times out the worker thread keeps running and is counted
    /// as orphaned until it returns.
    fn execute_protected<F, R>(&self, timeout: Duration, f: F) -> X6Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let orphaned_count = ORPHANED_THREAD_COUNT.load(Ordering::SeqCst);
        if orphaned_count >= MAX_ORPHANED_THREADS {
            return Err(X6Error::TooManyOrphanedThreads {
                count: orphaned_count,
                max: MAX_ORPHANED_THREADS,
            });
        }

        let catch_panics = self.config.catch_panics;
        let pending_ops = self.pending_ops.clone();
        pending_ops.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = crossbeam::channel::bounded(1);
        let handoff = Arc::new(Handoff::default());
        let worker_handoff = handoff.clone();

        std::thread::spawn(move || {
            let result = if catch_panics {
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(f))
            } else {
                Ok(f())
            };

            pending_ops.fetch_sub(1, Ordering::SeqCst);

            if worker_handoff.complete(&ORPHANED_THREAD_COUNT) {
                let _ = tx.send(result);
            }
        });

        match rx.recv_timeout(timeout) {
            Ok(result) => unpack(result),
            Err(RecvTimeoutError::Timeout) if handoff.abandon(&ORPHANED_THREAD_COUNT) => {
                tracing::warn!(
                    orphaned_threads = ORPHANED_THREAD_COUNT.load(Ordering::SeqCst),
                    pending_ops = self.pending_ops.load(Ordering::SeqCst),
                    timeout_ms = timeout.as_millis() as u64,
                    "libx6 call timed out, thread orphaned"
                );
                Err(X6Error::Timeout(timeout))
            }
            // the worker finished between the timeout and the handoff
            Err(RecvTimeoutError::Timeout) => match rx.recv() {
                Ok(result) => unpack(result),
                Err(_) => Err(X6Error::Panicked("Worker exited without a result".into())),
            },
            Err(RecvTimeoutError::Disconnected) => {
                Err(X6Error::Panicked("Worker exited without a result".into()))
            }
        }
    }

    /// Blocking calls currently in flight on this session.
    pub fn pending_operations(&self) -> usize {
        self.pending_ops.load(Ordering::SeqCst)
    }
}

/// Decides whether a finished worker or its timed-out caller owns the
/// result. Whichever side claims it second settles the orphan count.
#[derive(Debug, Default)]
struct Handoff {
    claimed: AtomicBool,
}

impl Handoff {
    /// Called by the caller on timeout. Returns `true` when the worker is
    /// still running and is now counted in `orphans`.
    fn abandon(&self, orphans: &AtomicUsize) -> bool {
        // count first so a worker finishing right after never underflows
        orphans.fetch_add(1, Ordering::SeqCst);
        if self.claimed.swap(true, Ordering::SeqCst) {
            orphans.fetch_sub(1, Ordering::SeqCst);
            false
        } else {
            true
        }
    }

    /// Called by the worker when `f` returns. Returns `true` when the caller
    /// is still waiting for the result.
    fn complete(&self, orphans: &AtomicUsize) -> bool {
        if self.claimed.swap(true, Ordering::SeqCst) {
            orphans.fetch_sub(1, Ordering::SeqCst);
            false
        } else {
            true
        }
    }
}

fn unpack<R>(result: std::thread::Result<R>) -> X6Result<R> {
    result.map_err(|panic_info| {
        let message = if let Some(s) = panic_info.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        tracing::error!(%message, "libx6 call panicked");
        X6Error::Panicked(message)
    })
}

/// Worker threads still blocked in the driver after a timeout.
pub fn orphaned_thread_count() -> usize {
    ORPHANED_THREAD_COUNT.load(Ordering::SeqCst)
}

impl<A: X6Api + 'static> Drop for X6Session<A> {
    fn drop(&mut self) {
        if self.device_id.is_none() {
            return;
        }

        // give in-flight transfers a chance to finish before tearing down
        let max_wait = self.config.timeout;
        let start = Instant::now();
        while self.pending_operations() > 0 {
            if start.elapsed() > max_wait {
                tracing::warn!(
                    pending_ops = self.pending_ops.load(Ordering::SeqCst),
                    "Disconnecting with operations still in flight"
                );
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        if let Err(e) = self.disconnect() {
            tracing::warn!(error = %e, "Error during session cleanup");
        }
    }
}

fn kernel_address(channel: ChannelTuple) -> X6Result<(u32, u32, u32)> {
    let convert = |v: i32| {
        u32::try_from(v).map_err(|_| {
            X6Error::invalid_parameter("channel", format!("Negative index in {channel}"))
        })
    };
    Ok((convert(channel.a)?, convert(channel.b)?, convert(channel.c)?))
}

fn to_c_int(name: &str, value: u32) -> X6Result<i32> {
    i32::try_from(value).map_err(|_| X6Error::invalid_parameter(name, format!("{value} is too large")))
}

fn require_channels(channels: &[ChannelTuple]) -> X6Result<()> {
    if channels.is_empty() {
        return Err(X6Error::invalid_parameter("channels", "At least one stream is required"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockX6;
    use lib_types::X6Status;

    fn connected(mock: MockX6) -> (Arc<MockX6>, X6Session<MockX6>) {
        let api = Arc::new(mock);
        let mut session = X6Session::new(api.clone());
        session.connect(0).unwrap();
        (api, session)
    }

    #[test]
    fn test_execution_config_default() {
        let config = ExecutionConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.catch_panics);
    }

    #[test]
    fn test_unbound_session_never_calls_driver() {
        let api = Arc::new(MockX6::new(1));
        let session = X6Session::new(api.clone());
        assert!(matches!(session.digitizer_mode(), Err(X6Error::NotConnected)));
        assert!(matches!(session.acquire(), Err(X6Error::NotConnected)));
        assert!(matches!(
            session.transfer_stream(ChannelTuple::physical(1)),
            Err(X6Error::NotConnected)
        ));
        assert!(api.calls().is_empty());
    }

    #[test]
    fn test_connect_failure_leaves_session_unbound() {
        let api = Arc::new(MockX6::new(1));
        let mut session = X6Session::new(api);
        let err = session.connect(3).unwrap_err();
        assert_eq!(err.x6_status(), Some(X6Status::NoDeviceFound));
        assert!(!session.is_connected());
    }

    #[test]
    fn test_reconnect_disconnects_first() {
        let (api, mut session) = connected(MockX6::new(2));
        session.connect(1).unwrap();
        assert_eq!(session.device_id(), Some(1));
        assert!(!api.is_connected(0));
        assert!(api.is_connected(1));
        let calls = api.calls();
        assert_eq!(calls, vec!["connect_x6", "disconnect_x6", "connect_x6"]);
    }

    #[test]
    fn test_disconnect_unbound() {
        let api = Arc::new(MockX6::new(1));
        let mut session = X6Session::new(api.clone());
        assert!(matches!(session.disconnect(), Err(X6Error::NotConnected)));
        assert!(api.calls().is_empty());
    }

    #[test]
    fn test_drop_disconnects() {
        let (api, session) = connected(MockX6::new(1));
        drop(session);
        assert!(!api.is_connected(0));
    }

    #[test]
    fn test_enum_round_trip() {
        let (_api, session) = connected(MockX6::new(1));
        session.set_reference_source(ReferenceSource::Internal).unwrap();
        assert_eq!(session.reference_source().unwrap(), ReferenceSource::Internal);
        session.set_digitizer_mode(DigitizerMode::Averager).unwrap();
        assert_eq!(session.digitizer_mode().unwrap(), DigitizerMode::Averager);
    }

    #[test]
    fn test_trigger_and_channel_enable_round_trip() {
        let (_api, session) = connected(MockX6::new(1));
        session.set_trigger_source(TriggerSource::Software).unwrap();
        assert_eq!(session.trigger_source().unwrap(), TriggerSource::Software);
        session.set_trigger_source(TriggerSource::External).unwrap();
        assert_eq!(session.trigger_source().unwrap(), TriggerSource::External);

        session.set_input_channel_enable(1, false).unwrap();
        assert!(!session.input_channel_enable(1).unwrap());
        assert!(session.input_channel_enable(2).unwrap());
        session.set_output_channel_enable(3, true).unwrap();
        assert!(session.output_channel_enable(3).unwrap());
    }

    #[test]
    fn test_demod_settings_round_trip() {
        let (_api, session) = connected(MockX6::new(1));
        session.set_nco_frequency(1, 2, Hertz::from_mhz(12.5)).unwrap();
        assert_eq!(session.nco_frequency(1, 2).unwrap(), Hertz(12.5e6));
        assert_eq!(session.nco_frequency(2, 1).unwrap(), Hertz(0.0));

        session.set_threshold(1, 1, 0.75).unwrap();
        assert_eq!(session.threshold(1, 1).unwrap(), 0.75);
        session.set_threshold_invert(1, 1, true).unwrap();
        assert!(session.threshold_invert(1, 1).unwrap());

        let ch = ChannelTuple::new(2, 1, 1);
        session.set_kernel_bias(ch, Complex64::new(0.5, -0.25)).unwrap();
        assert_eq!(session.kernel_bias(ch).unwrap(), Complex64::new(0.5, -0.25));
        assert_eq!(session.kernel_bias(ChannelTuple::new(1, 1, 1)).unwrap(), Complex64::default());
    }

    #[test]
    fn test_missing_optional_entry_point() {
        let (_api, session) = connected(MockX6::new(1).without_optional_symbols());
        assert!(matches!(session.sample_rate(), Err(X6Error::NotSupported { .. })));
    }

    #[test]
    fn test_data_available_fallback() {
        let (api, session) = connected(MockX6::new(1).without_optional_symbols());
        assert!(!session.data_available().unwrap());
        api.set_new_records(4);
        assert!(session.data_available().unwrap());
    }

    #[test]
    fn test_acquire_pushes_averager_settings() {
        let (api, mut session) = connected(MockX6::new(1));
        session
            .set_averager(AveragerSettings {
                record_length: 256,
                segments: 4,
                waveforms: 2,
                round_robins: 10,
            })
            .unwrap();
        session.acquire().unwrap();
        assert_eq!(api.averager_settings(0), Some([256, 4, 2, 10]));
        assert!(session.is_running().unwrap());
        let calls = api.calls();
        let push = calls.iter().position(|c| c == "set_averager_settings").unwrap();
        let start = calls.iter().position(|c| c == "acquire").unwrap();
        assert!(push < start);
    }

    #[test]
    fn test_set_averager_rejects_overflowing_counts() {
        let (api, mut session) = connected(MockX6::new(1));
        let huge = AveragerSettings { segments: u32::MAX, ..AveragerSettings::default() };
        assert!(matches!(session.set_averager(huge), Err(X6Error::Averager(_))));
        assert_eq!(session.averager(), AveragerSettings::default());
        session.acquire().unwrap();
        assert_eq!(api.averager_settings(0).map(|s| s[1] as u32), Some(AveragerSettings::default().segments));
    }

    #[test]
    fn test_set_averager_rejects_bad_record_length() {
        let (_api, mut session) = connected(MockX6::new(1));
        let bad = AveragerSettings { record_length: 100, ..AveragerSettings::default() };
        assert!(matches!(session.set_averager(bad), Err(X6Error::Averager(_))));
    }

    #[test]
    fn test_physical_stream_is_real() {
        let (api, session) = connected(MockX6::new(1));
        session.set_digitizer_mode(DigitizerMode::Averager).unwrap();
        let ch = ChannelTuple::physical(1);
        api.set_stream_data(&[ch], vec![1.0, 2.0, 3.0, 4.0]);
        let data = session.transfer_stream(ch).unwrap().unwrap();
        assert_eq!(data.as_real(), Some(&[1.0, 2.0, 3.0, 4.0][..]));
    }

    #[test]
    fn test_demod_stream_is_complex() {
        let (api, session) = connected(MockX6::new(1));
        session.set_digitizer_mode(DigitizerMode::Averager).unwrap();
        let ch = ChannelTuple::new(1, 1, 0);
        api.set_stream_data(&[ch], vec![1.0, -1.0, 0.5, 0.25]);
        let data = session.transfer_stream(ch).unwrap().unwrap();
        assert_eq!(
            data.as_complex(),
            Some(&[Complex64::new(1.0, -1.0), Complex64::new(0.5, 0.25)][..])
        );
    }

    #[test]
    fn test_digitizer_transfer_whole_round_robins() {
        let (api, mut session) = connected(MockX6::new(1));
        session
            .set_averager(AveragerSettings {
                record_length: 128,
                segments: 2,
                waveforms: 1,
                round_robins: 1,
            })
            .unwrap();
        let ch = ChannelTuple::physical(1);
        api.set_record_length(ch, 4);
        api.set_stream_data(&[ch], (0..20).map(f64::from).collect());

        let data = session.transfer_stream(ch).unwrap().unwrap();
        assert_eq!(data.len(), 16);

        // less than one round robin
        api.set_stream_data(&[ch], vec![0.0; 7]);
        assert!(session.transfer_stream(ch).unwrap().is_none());
    }

    #[test]
    fn test_variance_split() {
        let (api, session) = connected(MockX6::new(1));
        let ch = ChannelTuple::new(1, 1, 0);
        api.set_variance_data(&[ch], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let var = session.transfer_variance(ch).unwrap();
        assert_eq!(var.real, vec![1.0, 4.0]);
        assert_eq!(var.imag, vec![2.0, 5.0]);
        assert_eq!(var.prod, vec![3.0, 6.0]);
    }

    #[test]
    fn test_physical_variance_zero_fills_imag() {
        let (api, session) = connected(MockX6::new(1));
        let ch = ChannelTuple::physical(1);
        api.set_variance_data(&[ch], vec![0.1, 0.2, 0.3]);
        let var = session.transfer_variance(ch).unwrap();
        assert_eq!(var.real, vec![0.1, 0.2, 0.3]);
        assert_eq!(var.imag, vec![0.0; 3]);
        assert_eq!(var.prod, vec![0.0; 3]);
    }

    #[test]
    fn test_negative_variance_size_is_empty() {
        let (api, session) = connected(MockX6::new(1));
        let ch = ChannelTuple::new(1, 1, 0);
        api.set_variance_data(&[ch], vec![1.0, 2.0, 3.0]);
        api.set_variance_buffer_size(&[ch], -1);
        assert!(session.transfer_variance(ch).unwrap().is_empty());
        assert!(!api.calls().iter().any(|c| c == "transfer_variance"));
    }

    #[test]
    fn test_correlation_variance() {
        let (api, session) = connected(MockX6::new(1));
        let chans = [ChannelTuple::new(1, 1, 1), ChannelTuple::new(2, 1, 1)];
        api.set_variance_data(&chans, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let var = session.transfer_correlation_variance(&chans).unwrap();
        assert_eq!(var.real, vec![1.0, 4.0]);
        assert_eq!(var.imag, vec![2.0, 5.0]);
        assert_eq!(var.prod, vec![3.0, 6.0]);
        assert!(session.transfer_correlation_variance(&[]).is_err());
    }

    #[test]
    fn test_correlation_is_complex() {
        let (api, session) = connected(MockX6::new(1));
        let chans = [ChannelTuple::new(1, 1, 1), ChannelTuple::new(2, 1, 1)];
        api.set_stream_data(&chans, vec![0.5, 0.5]);
        let data = session.transfer_correlation(&chans).unwrap().unwrap();
        assert_eq!(data, vec![Complex64::new(0.5, 0.5)]);
        assert!(session.transfer_correlation(&[]).is_err());
    }

    #[test]
    fn test_kernel_validated_before_write() {
        let (api, session) = connected(MockX6::new(1));
        let kernel = vec![Complex64::new(0.25, 0.0); 8];
        assert!(matches!(
            session.write_kernel(ChannelTuple::new(1, 1, 0), &kernel),
            Err(X6Error::Kernel(_))
        ));
        assert!(!api.calls().iter().any(|c| c == "write_kernel"));

        let ch = ChannelTuple::new(1, 1, 1);
        session.write_kernel(ch, &kernel).unwrap();
        assert_eq!(session.read_kernel(ch, 3).unwrap(), Complex64::new(0.25, 0.0));
    }

    #[test]
    fn test_wait_reports_driver_timeout() {
        let (api, session) = connected(MockX6::new(1));
        api.set_wait_status(X6Status::Timeout);
        let err = session.wait_for_acquisition(Duration::from_millis(10)).unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.x6_status(), Some(X6Status::Timeout));
    }

    #[test]
    fn test_wait_guard_times_out() {
        let config = ExecutionConfig {
            timeout: Duration::from_millis(50),
            wait_margin: Duration::from_millis(10),
            catch_panics: true,
        };
        let api = Arc::new(MockX6::new(1));
        api.set_wait_delay(Duration::from_millis(300));
        let mut session = X6Session::with_config(api, config);
        session.connect(0).unwrap();
        let err = session.wait_for_acquisition(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, X6Error::Timeout(_)));
    }

    #[test]
    fn test_wait_with_unbounded_timeout() {
        let (_api, session) = connected(MockX6::new(1));
        session.wait_for_acquisition(Duration::MAX).unwrap();
    }

    #[test]
    fn test_handoff_late_worker_clears_orphan() {
        let orphans = AtomicUsize::new(0);
        let handoff = Handoff::default();
        assert!(handoff.abandon(&orphans));
        assert_eq!(orphans.load(Ordering::SeqCst), 1);
        assert!(!handoff.complete(&orphans));
        assert_eq!(orphans.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_handoff_worker_first_is_not_orphaned() {
        // the worker finished right as the caller's wait expired
        let orphans = AtomicUsize::new(0);
        let handoff = Handoff::default();
        assert!(handoff.complete(&orphans));
        assert!(!handoff.abandon(&orphans));
        assert_eq!(orphans.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_handoff_races_settle_to_zero() {
        let orphans = Arc::new(AtomicUsize::new(0));
        for _ in 0..200 {
            let handoff = Arc::new(Handoff::default());
            let (worker_handoff, worker_orphans) = (handoff.clone(), orphans.clone());
            let worker = std::thread::spawn(move || worker_handoff.complete(&worker_orphans));
            let abandoned = handoff.abandon(&orphans);
            let delivered = worker.join().unwrap();
            assert_ne!(abandoned, delivered);
            assert_eq!(orphans.load(Ordering::SeqCst), 0);
        }
    }

    #[test]
    fn test_no_pending_operations_after_transfer() {
        let (api, session) = connected(MockX6::new(1));
        session.set_digitizer_mode(DigitizerMode::Averager).unwrap();
        let ch = ChannelTuple::physical(1);
        api.set_stream_data(&[ch], vec![1.0; 4]);
        session.transfer_stream(ch).unwrap();
        assert_eq!(session.pending_operations(), 0);
    }

    #[test]
    fn test_transfer_panic_is_captured() {
        let (api, session) = connected(MockX6::new(1));
        session.set_digitizer_mode(DigitizerMode::Averager).unwrap();
        let ch = ChannelTuple::physical(2);
        api.set_stream_data(&[ch], vec![0.0; 4]);
        api.set_panic_on_transfer(true);
        let err = session.transfer_stream(ch).unwrap_err();
        assert!(matches!(err, X6Error::Panicked(ref m) if m.contains("mock transfer failure")));
    }

    #[test]
    fn test_pulse_waveform_checked() {
        let (_api, session) = connected(MockX6::new(1));
        assert!(session.write_pulse_waveform(0, &[0.0; 3]).is_err());
        session.write_pulse_waveform(0, &[0.0, 0.5, 0.5, 0.0]).unwrap();
        assert_eq!(session.read_pulse_waveform(0, 1).unwrap(), 0.5);
    }

    #[test]
    fn test_registers_and_temperature() {
        let (_api, session) = connected(MockX6::new(1));
        session.write_register(0x0800, 0x10, 0xdead).unwrap();
        assert_eq!(session.read_register(0x0800, 0x10).unwrap(), 0xdead);
        assert_eq!(session.logic_temperature().unwrap(), Celsius(42.5));
    }
}
