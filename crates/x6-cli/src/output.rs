//! Result output formatting and writing.

use crate::orchestrator::{AcquisitionResults, StreamResult};
use crate::OutputFormat;
use anyhow::{Context, Result};
use lib_types::channel::ChannelTuple;
use lib_types::samples::{StreamData, VarianceTriple};
use std::io::Write;
use std::path::Path;

/// Write acquisition results to the output directory.
///
/// A plain-text summary is always written. Data goes to `results.json` for
/// JSON output and to one CSV per stream (and variance) otherwise.
pub fn write_results(results: &AcquisitionResults, output_dir: &Path, format: OutputFormat) -> Result<()> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory {:?}", output_dir))?;

    match format {
        OutputFormat::Json => {
            let path = output_dir.join("results.json");
            let f = std::fs::File::create(&path)?;
            serde_json::to_writer_pretty(std::io::BufWriter::new(f), results)?;
            tracing::info!("Wrote results to {:?}", path);
        }
        OutputFormat::Text | OutputFormat::Csv => {
            for stream in &results.streams {
                write_stream_csv(stream, output_dir)?;
            }
        }
    }

    let summary_path = output_dir.join("summary.txt");
    let mut f = std::fs::File::create(&summary_path)?;
    write_summary(&mut f, results)?;
    tracing::info!("Wrote summary to {:?}", summary_path);

    Ok(())
}

fn file_stem(prefix: &str, channel: ChannelTuple) -> String {
    format!("{}_{}_{}_{}", prefix, channel.a, channel.b, channel.c)
}

fn write_stream_csv(stream: &StreamResult, output_dir: &Path) -> Result<()> {
    if let Some(data) = &stream.data {
        let path = output_dir.join(format!("{}.csv", file_stem("stream", stream.channel)));
        let mut f = std::io::BufWriter::new(std::fs::File::create(&path)?);
        write_data_csv(&mut f, data)?;
        f.flush()?;
        tracing::info!(channel = %stream.channel, "Wrote stream to {:?}", path);
    }

    if let Some(variance) = &stream.variance {
        let path = output_dir.join(format!("{}.csv", file_stem("variance", stream.channel)));
        let mut f = std::io::BufWriter::new(std::fs::File::create(&path)?);
        write_variance_csv(&mut f, variance)?;
        f.flush()?;
    }

    Ok(())
}

fn write_data_csv<W: Write>(w: &mut W, data: &StreamData) -> Result<()> {
    match data {
        StreamData::Real(samples) => {
            writeln!(w, "sample,value")?;
            for (i, v) in samples.iter().enumerate() {
                writeln!(w, "{},{}", i, v)?;
            }
        }
        StreamData::Complex(samples) => {
            writeln!(w, "sample,re,im")?;
            for (i, z) in samples.iter().enumerate() {
                writeln!(w, "{},{},{}", i, z.re, z.im)?;
            }
        }
    }
    Ok(())
}

fn write_variance_csv<W: Write>(w: &mut W, variance: &VarianceTriple) -> Result<()> {
    writeln!(w, "sample,real,imag,prod")?;
    for i in 0..variance.len() {
        writeln!(w, "{},{},{},{}", i, variance.real[i], variance.imag[i], variance.prod[i])?;
    }
    Ok(())
}

fn write_summary<W: Write>(w: &mut W, results: &AcquisitionResults) -> Result<()> {
    writeln!(w, "X6 Acquisition Summary")?;
    writeln!(w, "======================")?;
    writeln!(w)?;
    writeln!(w, "Name:         {}", results.name)?;
    writeln!(w, "Device:       {}", results.device)?;
    writeln!(w, "Firmware:     {}", results.firmware)?;
    writeln!(w, "Mode:         {}", results.mode)?;
    writeln!(
        w,
        "Averager:     record_length={} segments={} waveforms={} round_robins={}",
        results.averager.record_length,
        results.averager.segments,
        results.averager.waveforms,
        results.averager.round_robins
    )?;
    writeln!(w, "Elapsed:      {} ms", results.elapsed_ms)?;
    writeln!(w)?;
    writeln!(w, "Streams:")?;
    for stream in &results.streams {
        match &stream.data {
            Some(data) => writeln!(
                w,
                "  {:<8} {:>8} samples ({:?})",
                stream.channel.to_string(),
                data.len(),
                data.layout()
            )?,
            None => writeln!(w, "  {:<8} no data", stream.channel.to_string())?,
        }
    }
    Ok(())
}

/// Print results to stdout.
pub fn print_results(results: &AcquisitionResults) -> Result<()> {
    let stdout = std::io::stdout();
    write_summary(&mut stdout.lock(), results)
}

/// Print a flat list of fields in the requested format.
pub fn print_record(format: OutputFormat, fields: &[(&str, String)]) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    write_record(&mut out, format, fields)
}

fn write_record<W: Write>(w: &mut W, format: OutputFormat, fields: &[(&str, String)]) -> Result<()> {
    match format {
        OutputFormat::Text => {
            let width = fields.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
            for (key, value) in fields {
                writeln!(w, "{:<width$}  {}", key, value, width = width)?;
            }
        }
        OutputFormat::Json => {
            let map: serde_json::Map<String, serde_json::Value> = fields
                .iter()
                .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.clone())))
                .collect();
            writeln!(w, "{}", serde_json::to_string_pretty(&map)?)?;
        }
        OutputFormat::Csv => {
            writeln!(w, "field,value")?;
            for (key, value) in fields {
                writeln!(w, "{},{}", key, value)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_types::enums::DigitizerMode;
    use lib_types::samples::AveragerSettings;
    use lib_types::Complex64;

    fn results() -> AcquisitionResults {
        AcquisitionResults {
            name: "readout".into(),
            device: 0,
            firmware: "v1.4 2016-12-1".into(),
            mode: DigitizerMode::Averager,
            averager: AveragerSettings::default(),
            elapsed_ms: 12,
            streams: vec![
                StreamResult {
                    channel: ChannelTuple::physical(1),
                    data: Some(StreamData::Real(vec![0.5, 0.25])),
                    variance: Some(VarianceTriple {
                        real: vec![0.1, 0.1],
                        imag: vec![0.0, 0.0],
                        prod: vec![0.0, 0.0],
                    }),
                },
                StreamResult {
                    channel: ChannelTuple::new(1, 1, 0),
                    data: Some(StreamData::Complex(vec![Complex64::new(1.0, -1.0)])),
                    variance: None,
                },
                StreamResult {
                    channel: ChannelTuple::new(2, 0, 0),
                    data: None,
                    variance: None,
                },
            ],
        }
    }

    #[test]
    fn test_csv_output() {
        let dir = tempfile::tempdir().unwrap();
        write_results(&results(), dir.path(), OutputFormat::Csv).unwrap();

        let raw = std::fs::read_to_string(dir.path().join("stream_1_0_0.csv")).unwrap();
        assert_eq!(raw, "sample,value\n0,0.5\n1,0.25\n");
        let demod = std::fs::read_to_string(dir.path().join("stream_1_1_0.csv")).unwrap();
        assert_eq!(demod, "sample,re,im\n0,1,-1\n");
        assert!(dir.path().join("variance_1_0_0.csv").exists());
        assert!(!dir.path().join("stream_2_0_0.csv").exists());
    }

    #[test]
    fn test_json_output() {
        let dir = tempfile::tempdir().unwrap();
        write_results(&results(), dir.path(), OutputFormat::Json).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("results.json")).unwrap()).unwrap();
        assert_eq!(json["name"], "readout");
        assert_eq!(json["mode"], "averager");
        assert_eq!(json["streams"][0]["channel"]["a"], 1);
        assert!(json["streams"][2]["data"].is_null());
    }

    #[test]
    fn test_summary_lists_streams() {
        let dir = tempfile::tempdir().unwrap();
        write_results(&results(), dir.path(), OutputFormat::Text).unwrap();
        let summary = std::fs::read_to_string(dir.path().join("summary.txt")).unwrap();
        assert!(summary.contains("Mode:         averager"));
        assert!(summary.contains("2.0.0    no data"));
    }

    #[test]
    fn test_record_formats() {
        let fields = [("devices", "2".to_string())];
        let mut buf = Vec::new();
        write_record(&mut buf, OutputFormat::Csv, &fields).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "field,value\ndevices,2\n");

        let mut buf = Vec::new();
        write_record(&mut buf, OutputFormat::Json, &fields).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(v["devices"], "2");
    }
}
