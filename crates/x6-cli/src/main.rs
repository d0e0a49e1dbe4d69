//! x6: command-line control of X6 digitizer cards.
//!
//! Loads the libx6 driver at runtime and drives it through `lib-x6-ffi`.

mod config;
mod orchestrator;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lib_types::enums::NativeLogLevel;
use lib_x6_ffi::{X6Library, X6Session};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "x6")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Path to the libx6 shared library (defaults to the platform name in
    /// the current directory)
    #[arg(short, long, env = "X6_LIBRARY")]
    library: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
    Csv,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
    Debug1,
    Debug2,
    Debug3,
    Debug4,
}

impl From<LogLevel> for NativeLogLevel {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => NativeLogLevel::Error,
            LogLevel::Warning => NativeLogLevel::Warning,
            LogLevel::Info => NativeLogLevel::Info,
            LogLevel::Debug => NativeLogLevel::Debug,
            LogLevel::Debug1 => NativeLogLevel::Debug1,
            LogLevel::Debug2 => NativeLogLevel::Debug2,
            LogLevel::Debug3 => NativeLogLevel::Debug3,
            LogLevel::Debug4 => NativeLogLevel::Debug4,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the number of attached cards
    Devices,

    /// Show firmware, temperature and clocking of a card
    Info {
        /// Card index
        #[arg(short, long, default_value = "0")]
        device: i32,
    },

    /// Run a configured acquisition and save the data
    Acquire {
        /// Path to the acquisition configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Output directory for results
        #[arg(short, long, default_value = "output")]
        output: PathBuf,
    },

    /// Read a device register
    ReadRegister {
        #[arg(short, long, default_value = "0")]
        device: i32,

        /// Register base address (decimal or 0x-prefixed hex)
        #[arg(value_parser = parse_u32)]
        addr: u32,

        #[arg(value_parser = parse_u32, default_value = "0")]
        offset: u32,
    },

    /// Write a device register
    WriteRegister {
        #[arg(short, long, default_value = "0")]
        device: i32,

        #[arg(value_parser = parse_u32)]
        addr: u32,

        #[arg(value_parser = parse_u32)]
        offset: u32,

        #[arg(value_parser = parse_u32)]
        value: u32,
    },

    /// Redirect the driver's own log
    SetLog {
        /// File path, or `stdout` / `stderr`
        target: String,

        /// Driver log level
        #[arg(short, long)]
        level: Option<LogLevel>,
    },
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{}': {}", s, e))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let library = open_library(cli.library.as_deref())?;

    match cli.command {
        Commands::Devices => {
            let n = lib_x6_ffi::num_devices(library.as_ref())?;
            output::print_record(cli.format, &[("devices", n.to_string())])?;
        }
        Commands::Info { device } => {
            show_info(library, device, cli.format)?;
        }
        Commands::Acquire { config, output } => {
            run_acquisition(library, &config, &output, cli.format)?;
        }
        Commands::ReadRegister { device, addr, offset } => {
            let session = connect(library, device)?;
            let value = session.read_register(addr, offset)?;
            output::print_record(
                cli.format,
                &[
                    ("addr", format!("{:#06x}", addr)),
                    ("offset", format!("{:#x}", offset)),
                    ("value", format!("{:#010x}", value)),
                ],
            )?;
        }
        Commands::WriteRegister { device, addr, offset, value } => {
            let session = connect(library, device)?;
            session.write_register(addr, offset, value)?;
        }
        Commands::SetLog { target, level } => {
            lib_x6_ffi::set_log(library.as_ref(), &target)?;
            if let Some(level) = level {
                lib_x6_ffi::set_logging_level(library.as_ref(), level.into())?;
            }
        }
    }

    Ok(())
}

fn open_library(path: Option<&Path>) -> Result<Arc<X6Library>> {
    match path {
        Some(p) => X6Library::load(p).with_context(|| format!("Could not open libx6 at {:?}", p)),
        None => {
            let dir = std::env::current_dir()?;
            X6Library::load_from_dir(&dir)
                .with_context(|| format!("Could not find libx6 in {:?}", dir))
        }
    }
}

fn connect(library: Arc<X6Library>, device: i32) -> Result<X6Session<X6Library>> {
    let mut session = X6Session::new(library);
    session
        .connect(device)
        .with_context(|| format!("Failed to connect to device {}", device))?;
    Ok(session)
}

fn show_info(library: Arc<X6Library>, device: i32, format: OutputFormat) -> Result<()> {
    let session = connect(library, device)?;

    let firmware = session.firmware_version()?;
    let mut fields = vec![
        ("device", device.to_string()),
        ("firmware", firmware.description.clone()),
        ("git_sha1", format!("{:08x}", firmware.git_sha1)),
        ("temperature", session.logic_temperature()?.to_string()),
        ("reference", session.reference_source()?.to_string()),
        ("mode", session.digitizer_mode()?.to_string()),
    ];
    // older drivers lack these
    if let Ok(rate) = session.sample_rate() {
        fields.push(("sample_rate", rate.to_string()));
    }
    if let Ok(trigger) = session.trigger_source() {
        fields.push(("trigger", trigger.to_string()));
    }

    output::print_record(format, &fields)
}

fn run_acquisition(library: Arc<X6Library>, config_path: &Path, output_dir: &Path, format: OutputFormat) -> Result<()> {
    tracing::info!("Loading configuration from {:?}", config_path);

    let config = config::load_config(config_path)?;
    let mut orchestrator = orchestrator::Orchestrator::new(library, config);
    let results = orchestrator.run()?;

    output::write_results(&results, output_dir, format)?;
    if let OutputFormat::Text = format {
        output::print_results(&results)?;
    }

    tracing::info!("Acquisition complete. Results written to {:?}", output_dir);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_register_numbers() {
        assert_eq!(parse_u32("0x0800"), Ok(0x800));
        assert_eq!(parse_u32("16"), Ok(16));
        assert!(parse_u32("0xzz").is_err());
    }

    #[test]
    fn test_parse_acquire_command() {
        let cli = Cli::try_parse_from([
            "x6", "-vv", "--format", "csv", "--library", "/opt/libx6.so",
            "acquire", "--config", "acq.toml",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.format, OutputFormat::Csv));
        assert_eq!(cli.library, Some(PathBuf::from("/opt/libx6.so")));
        assert!(matches!(cli.command, Commands::Acquire { ref output, .. } if output == Path::new("output")));
    }

    #[test]
    fn test_parse_set_log_level() {
        let cli = Cli::try_parse_from(["x6", "set-log", "stderr", "--level", "debug2"]).unwrap();
        match cli.command {
            Commands::SetLog { target, level } => {
                assert_eq!(target, "stderr");
                assert_eq!(level.map(NativeLogLevel::from), Some(NativeLogLevel::Debug2));
            }
            _ => panic!("expected set-log"),
        }
    }
}
