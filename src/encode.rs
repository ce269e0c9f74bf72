use anyhow::Result;
use std::io::Write;

use crate::models::RunSummary;
use crate::report::write_text_report;

/// Output formats of a CLI run
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    /// Human-readable report
    Text,
    /// The summary as pretty-printed JSON
    Json,
    /// One row per probe
    Csv,
}

/// Write a run summary in the requested format
pub fn write_summary<W: Write>(summary: &RunSummary, format: Format, writer: &mut W) -> Result<()> {
    match format {
        Format::Text => write_text_report(summary, writer)?,
        Format::Json => {
            serde_json::to_writer_pretty(&mut *writer, summary)?;
            writeln!(writer)?;
        }
        Format::Csv => encode_csv(summary, writer)?,
    }
    Ok(())
}

/// Encode the probes of a run to CSV
fn encode_csv<W: Write>(summary: &RunSummary, writer: &mut W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer.write_record(["id", "type", "url", "status", "success", "time", "error"])?;

    for probe in &summary.requests {
        csv_writer.write_record([
            probe.id.to_string(),
            probe.kind.clone(),
            summary.url.clone(),
            probe.status.to_string(),
            probe.is_success().to_string(),
            probe.time.to_string(),
            probe.error.clone().unwrap_or_default(),
        ])?;
    }

    csv_writer.flush()?;

    Ok(())
}
