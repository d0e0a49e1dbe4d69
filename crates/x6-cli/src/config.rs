//! Acquisition configuration loading and validation.

use anyhow::{Context, Result};
use lib_types::channel::ChannelTuple;
use lib_types::enums::{DigitizerMode, NativeLogLevel, ReferenceSource, TriggerSource};
use lib_types::kernel::validate_kernel;
use lib_types::samples::AveragerSettings;
use lib_types::units::Hertz;
use lib_types::Complex64;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Everything needed to set up and run one acquisition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Acquisition name, used in the summary.
    pub name: String,

    /// Card index.
    #[serde(default)]
    pub device: i32,

    #[serde(default)]
    pub reference: ReferenceSource,

    #[serde(default)]
    pub mode: DigitizerMode,

    #[serde(default)]
    pub trigger: TriggerSource,

    #[serde(default)]
    pub averager: AveragerSettings,

    /// Streams to enable and transfer, as `a.b.c` labels.
    #[serde(default)]
    pub streams: Vec<String>,

    #[serde(default)]
    pub nco: Vec<NcoConfig>,

    #[serde(default)]
    pub thresholds: Vec<ThresholdConfig>,

    #[serde(default)]
    pub kernels: Vec<KernelConfig>,

    /// How long to wait for the acquisition to finish.
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,

    /// Redirect the driver's own log for this run.
    #[serde(default)]
    pub native_log: Option<NativeLogConfig>,
}

fn default_wait_timeout_ms() -> u64 { 10_000 }

/// Demodulation frequency for virtual channel `(a, b)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NcoConfig {
    pub a: i32,
    pub b: i32,
    pub frequency_mhz: f64,
}

impl NcoConfig {
    pub fn frequency(&self) -> Hertz {
        Hertz::from_mhz(self.frequency_mhz)
    }
}

/// State discriminator threshold for integrator `(a, c)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub a: i32,
    pub c: i32,
    pub value: f64,
    #[serde(default)]
    pub invert: bool,
}

/// Integration kernel for one stream.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Target stream as an `a.b.c` label.
    pub stream: String,

    pub real: Vec<f64>,

    /// Imaginary parts; zero when omitted.
    #[serde(default)]
    pub imag: Vec<f64>,

    /// Bias added after integration, as `[re, im]`.
    #[serde(default)]
    pub bias: Option<[f64; 2]>,
}

impl KernelConfig {
    pub fn channel(&self) -> Result<ChannelTuple> {
        self.stream
            .parse()
            .with_context(|| format!("Invalid kernel stream '{}'", self.stream))
    }

    /// Combine the real and imaginary parts into kernel samples.
    pub fn samples(&self) -> Result<Vec<Complex64>> {
        if !self.imag.is_empty() && self.imag.len() != self.real.len() {
            anyhow::bail!(
                "Kernel for stream {} has {} real and {} imaginary values",
                self.stream,
                self.real.len(),
                self.imag.len()
            );
        }
        Ok(self
            .real
            .iter()
            .enumerate()
            .map(|(i, &re)| Complex64::new(re, self.imag.get(i).copied().unwrap_or(0.0)))
            .collect())
    }

    pub fn bias(&self) -> Option<Complex64> {
        self.bias.map(|[re, im]| Complex64::new(re, im))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NativeLogConfig {
    /// File path, or `stdout` / `stderr`.
    pub target: String,

    #[serde(default)]
    pub level: NativeLogLevel,
}

impl AcquisitionConfig {
    /// Parse the configured stream labels.
    pub fn stream_channels(&self) -> Result<Vec<ChannelTuple>> {
        self.streams
            .iter()
            .map(|s| {
                s.parse::<ChannelTuple>()
                    .with_context(|| format!("Invalid stream '{}'", s))
            })
            .collect()
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

/// Load configuration from a file.
pub fn load_config(path: &Path) -> Result<AcquisitionConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AcquisitionConfig = if path.extension().map_or(false, |e| e == "json") {
        serde_json::from_str(&content)
            .with_context(|| "Failed to parse config as JSON")?
    } else {
        // Assume TOML
        toml::from_str(&content)
            .with_context(|| "Failed to parse config as TOML")?
    };

    validate_config(&config)?;

    Ok(config)
}

/// Validate configuration.
pub fn validate_config(config: &AcquisitionConfig) -> Result<()> {
    if config.device < 0 {
        anyhow::bail!("Device index must be non-negative (got {})", config.device);
    }

    config
        .averager
        .validate()
        .context("Invalid averager settings")?;

    let streams = config.stream_channels()?;
    if streams.is_empty() {
        tracing::warn!("No streams configured, nothing will be transferred");
    }
    for (i, ch) in streams.iter().enumerate() {
        if streams[..i].contains(ch) {
            anyhow::bail!("Stream {} listed more than once", ch);
        }
    }

    for nco in &config.nco {
        if nco.b < 1 || !nco.frequency_mhz.is_finite() {
            anyhow::bail!(
                "Invalid NCO setting for ({}, {}): {} MHz",
                nco.a,
                nco.b,
                nco.frequency_mhz
            );
        }
    }

    for threshold in &config.thresholds {
        if threshold.c < 1 || !threshold.value.is_finite() {
            anyhow::bail!(
                "Invalid threshold for ({}, {}): {}",
                threshold.a,
                threshold.c,
                threshold.value
            );
        }
    }

    for kernel in &config.kernels {
        let channel = kernel.channel()?;
        let samples = kernel.samples()?;
        validate_kernel(&channel, &samples)
            .with_context(|| format!("Invalid kernel for stream {}", channel))?;
    }

    if config.wait_timeout_ms == 0 {
        anyhow::bail!("wait_timeout_ms must be positive");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    const TOML_CONFIG: &str = r#"
name = "qubit readout"
device = 0
reference = "internal"
mode = "averager"
streams = ["1.0.0", "1.1.0", "1.1.1"]
wait_timeout_ms = 2000

[averager]
record_length = 1024
segments = 4
waveforms = 2
round_robins = 100

[[nco]]
a = 1
b = 1
frequency_mhz = 10.0

[[thresholds]]
a = 1
c = 1
value = 0.25
invert = true

[[kernels]]
stream = "1.1.1"
real = [0.5, 0.5, 0.5, 0.5]
bias = [0.0, 0.1]
"#;

    #[test]
    fn test_load_toml() {
        let f = write_temp(".toml", TOML_CONFIG);
        let config = load_config(f.path()).unwrap();
        assert_eq!(config.reference, ReferenceSource::Internal);
        assert_eq!(config.mode, DigitizerMode::Averager);
        assert_eq!(config.averager.record_length, 1024);
        assert_eq!(config.stream_channels().unwrap()[1], ChannelTuple::new(1, 1, 0));
        assert_eq!(config.nco[0].frequency(), Hertz(10e6));
        assert_eq!(config.kernels[0].bias(), Some(Complex64::new(0.0, 0.1)));
        assert_eq!(config.wait_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_load_json_with_defaults() {
        let f = write_temp(".json", r#"{"name": "scope", "streams": ["2.0.0"]}"#);
        let config = load_config(f.path()).unwrap();
        assert_eq!(config.device, 0);
        assert_eq!(config.mode, DigitizerMode::Digitizer);
        assert_eq!(config.averager, AveragerSettings::default());
        assert_eq!(config.wait_timeout_ms, 10_000);
        assert!(config.native_log.is_none());
    }

    #[test]
    fn test_bad_stream_label_rejected() {
        let f = write_temp(".json", r#"{"name": "x", "streams": ["1.x.0"]}"#);
        let err = load_config(f.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("1.x.0"));
    }

    #[test]
    fn test_duplicate_stream_rejected() {
        let f = write_temp(".json", r#"{"name": "x", "streams": ["1.1.0", "(1, 1, 0)"]}"#);
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn test_bad_record_length_rejected() {
        let f = write_temp(".json", r#"{"name": "x", "averager": {"record_length": 1000}}"#);
        let err = load_config(f.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("averager"));
    }

    #[test]
    fn test_kernel_on_raw_stream_rejected() {
        let f = write_temp(
            ".json",
            r#"{"name": "x", "kernels": [{"stream": "1.1.0", "real": [0.1, 0.2]}]}"#,
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn test_kernel_length_mismatch() {
        let kernel = KernelConfig {
            stream: "1.1.1".into(),
            real: vec![0.1, 0.2],
            imag: vec![0.1],
            bias: None,
        };
        assert!(kernel.samples().is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(load_config(Path::new("/nonexistent/acq.toml")).is_err());
    }
}
