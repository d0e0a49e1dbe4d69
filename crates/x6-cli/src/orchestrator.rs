//! Acquisition orchestration.

use crate::config::AcquisitionConfig;
use anyhow::{Context, Result};
use lib_types::channel::ChannelTuple;
use lib_types::enums::DigitizerMode;
use lib_types::samples::{AveragerSettings, StreamData, VarianceTriple};
use lib_x6_ffi::{X6Api, X6Session};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Data collected from one stream.
#[derive(Clone, Debug, Serialize)]
pub struct StreamResult {
    pub channel: ChannelTuple,
    /// `None` when the card had no complete data for this stream.
    pub data: Option<StreamData>,
    /// Only collected in averager mode.
    pub variance: Option<VarianceTriple>,
}

/// Everything an acquisition run produced.
#[derive(Clone, Debug, Serialize)]
pub struct AcquisitionResults {
    pub name: String,
    pub device: i32,
    pub firmware: String,
    pub mode: DigitizerMode,
    pub averager: AveragerSettings,
    pub elapsed_ms: u64,
    pub streams: Vec<StreamResult>,
}

/// Drives one configured acquisition on a card.
pub struct Orchestrator<A: X6Api + 'static> {
    config: AcquisitionConfig,
    session: X6Session<A>,
}

impl<A: X6Api + 'static> Orchestrator<A> {
    pub fn new(api: Arc<A>, config: AcquisitionConfig) -> Self {
        Self {
            config,
            session: X6Session::new(api),
        }
    }

    /// Connect, configure, acquire and transfer every stream.
    pub fn run(&mut self) -> Result<AcquisitionResults> {
        tracing::info!("Starting acquisition: {}", self.config.name);
        let started = Instant::now();

        self.apply()?;
        let firmware = self
            .session
            .firmware_version()
            .map(|fw| fw.description)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Could not read firmware version");
                String::from("unknown")
            });

        self.session.acquire().context("Failed to start acquisition")?;
        let waited = self.session.wait_for_acquisition(self.config.wait_timeout());
        if let Err(e) = waited {
            // leave the card idle before reporting
            if let Err(stop_err) = self.session.stop() {
                tracing::warn!(error = %stop_err, "Failed to stop after wait error");
            }
            return Err(e).context("Acquisition did not complete");
        }

        let streams = self.collect()?;
        self.session.stop().context("Failed to stop acquisition")?;
        self.session.disconnect().context("Failed to disconnect")?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(elapsed_ms, streams = streams.len(), "Acquisition complete");

        Ok(AcquisitionResults {
            name: self.config.name.clone(),
            device: self.config.device,
            firmware,
            mode: self.config.mode,
            averager: self.config.averager,
            elapsed_ms,
            streams,
        })
    }

    /// Push the configuration to the card.
    fn apply(&mut self) -> Result<()> {
        let config = &self.config;

        if let Some(log) = &config.native_log {
            lib_x6_ffi::set_log(self.session.api().as_ref(), &log.target)
                .context("Failed to redirect driver log")?;
            lib_x6_ffi::set_logging_level(self.session.api().as_ref(), log.level)?;
        }

        self.session
            .connect(config.device)
            .with_context(|| format!("Failed to connect to device {}", config.device))?;

        self.session.set_reference_source(config.reference)?;
        self.session.set_digitizer_mode(config.mode)?;
        match self.session.set_trigger_source(config.trigger) {
            Err(lib_x6_ffi::X6Error::NotSupported { .. }) => {
                tracing::warn!("Driver has no trigger source control, using its default");
            }
            other => other?,
        }
        self.session.set_averager(config.averager)?;

        for ch in config.stream_channels()? {
            self.session
                .enable_stream(ch)
                .with_context(|| format!("Failed to enable stream {}", ch))?;
        }

        for nco in &config.nco {
            self.session.set_nco_frequency(nco.a, nco.b, nco.frequency())?;
        }

        for t in &config.thresholds {
            self.session.set_threshold(t.a, t.c, t.value)?;
            self.session.set_threshold_invert(t.a, t.c, t.invert)?;
        }

        for kernel in &config.kernels {
            let ch = kernel.channel()?;
            self.session
                .write_kernel(ch, &kernel.samples()?)
                .with_context(|| format!("Failed to write kernel for {}", ch))?;
            if let Some(bias) = kernel.bias() {
                self.session.set_kernel_bias(ch, bias)?;
            }
        }

        tracing::debug!(device = config.device, "Configuration applied");
        Ok(())
    }

    /// Transfer every configured stream.
    fn collect(&self) -> Result<Vec<StreamResult>> {
        let averaging = self.config.mode == DigitizerMode::Averager;
        let mut results = Vec::new();

        for channel in self.config.stream_channels()? {
            let data = self
                .session
                .transfer_stream(channel)
                .with_context(|| format!("Failed to transfer stream {}", channel))?;
            if data.is_none() {
                tracing::warn!(%channel, "No complete data for stream");
            }

            let variance = if averaging {
                Some(
                    self.session
                        .transfer_variance(channel)
                        .with_context(|| format!("Failed to transfer variance of {}", channel))?,
                )
            } else {
                None
            };

            results.push(StreamResult { channel, data, variance });
        }

        Ok(results)
    }
}
