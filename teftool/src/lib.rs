pub mod config;
pub mod summary;

use config::OutputFormat;
use eyre::{Context, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tef_codec::Trace;

pub fn read_trace(path: &Path) -> Result<Trace> {
    let file = File::open(path).with_context(|| format!("failed to open trace path={}", path.display()))?;
    let trace = Trace::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to decode trace path={}", path.display()))?;
    tracing::info!(path = %path.display(), events = trace.events.len(), "loaded trace");
    Ok(trace)
}

pub fn write_trace(trace: &Trace, path: &Path, format: OutputFormat) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create output path={}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let written = match format {
        OutputFormat::Object => trace.write_json_object(&mut writer),
        OutputFormat::Array => trace.write_json_array(&mut writer),
    };
    written.with_context(|| format!("failed to encode trace path={}", path.display()))?;
    writer.flush()?;
    tracing::info!(path = %path.display(), ?format, events = trace.events.len(), "wrote trace");
    Ok(())
}
