use anyhow::Result;
use std::collections::BTreeMap;
use std::io::Write;
use std::time::Duration;

use crate::models::{ProbeResult, RunSummary};
use crate::utils::format_duration;

/// Reduce the probes of one run into a summary
///
/// The reduction does not depend on the order probes finished in: results
/// are sorted by id before the ordered lists are built.
pub fn summarize(url: &str, kind: &str, mut results: Vec<ProbeResult>) -> RunSummary {
    results.sort_by_key(|r| r.id);

    let total_requests = results.len();
    let mut status_codes: BTreeMap<String, usize> = BTreeMap::new();
    let mut success_count = 0;

    for result in &results {
        *status_codes.entry(result.status.to_string()).or_insert(0) += 1;
        if result.is_success() {
            success_count += 1;
        }
    }

    let response_times: Vec<f64> = results.iter().map(|r| r.time).collect();
    let avg_time = mean(&response_times);

    RunSummary {
        url: url.to_string(),
        kind: kind.to_string(),
        total_requests,
        success_count,
        rejected_count: total_requests - success_count,
        success_rate: success_rate(success_count, total_requests),
        avg_time,
        response_times,
        status_codes,
        requests: results,
    }
}

/// Format the share of successful probes as a rounded percentage
pub fn success_rate(success: usize, total: usize) -> String {
    if total == 0 {
        return "0%".to_string();
    }
    let percent = (success as f64 / total as f64 * 100.0).round();
    format!("{}%", percent as u64)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Calculate a percentile from a sorted list of durations
pub fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::from_secs(0);
    }

    let index = ((sorted.len() as f64 * p).ceil() as usize).saturating_sub(1);
    sorted[index.min(sorted.len() - 1)]
}

/// Write a human-readable report of a run
pub fn write_text_report<W: Write>(summary: &RunSummary, writer: &mut W) -> Result<()> {
    let mut latencies: Vec<Duration> = summary
        .response_times
        .iter()
        .map(|t| Duration::from_secs_f64(t.max(0.0)))
        .collect();
    latencies.sort();

    let min = latencies.first().copied().unwrap_or_default();
    let max = latencies.last().copied().unwrap_or_default();

    writeln!(writer, "Target:\t\t{} ({})", summary.url, summary.kind)?;
    writeln!(writer, "Requests:\t{}", summary.total_requests)?;
    writeln!(writer, "Success:\t{} ({})", summary.success_count, summary.success_rate)?;
    writeln!(writer, "Rejected:\t{}", summary.rejected_count)?;
    writeln!(writer, "Min:\t\t{}", format_duration(min))?;
    writeln!(writer, "Mean:\t\t{}", format_duration(Duration::from_secs_f64(summary.avg_time.max(0.0))))?;
    writeln!(writer, "50th percentile:\t{}", format_duration(percentile(&latencies, 0.5)))?;
    writeln!(writer, "90th percentile:\t{}", format_duration(percentile(&latencies, 0.9)))?;
    writeln!(writer, "95th percentile:\t{}", format_duration(percentile(&latencies, 0.95)))?;
    writeln!(writer, "99th percentile:\t{}", format_duration(percentile(&latencies, 0.99)))?;
    writeln!(writer, "Max:\t\t{}", format_duration(max))?;
    writeln!(writer, "Status codes:")?;
    for (status, count) in &summary.status_codes {
        writeln!(writer, "  {}\t\t{}", status, count)?;
    }

    Ok(())
}
