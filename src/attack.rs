use futures::stream::{FuturesUnordered, StreamExt};
use reqwest::Client;
use std::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{MAX_REQUESTS, ProbeConfig};
use crate::error::RunError;
use crate::models::{ProbeResult, RunSummary};
use crate::report::summarize;

/// Fires batches of concurrent probes over one shared connection pool
#[derive(Debug, Clone)]
pub struct LoadRunner {
    client: Client,
    config: ProbeConfig,
}

impl LoadRunner {
    pub(crate) fn from_parts(client: Client, config: ProbeConfig) -> Self {
        Self { client, config }
    }

    /// Settings the runner's client was built with
    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Run `num_requests` concurrent probes against `url` and summarize them
    pub async fn run(&self, url: &str, num_requests: usize, kind: &str) -> Result<RunSummary, RunError> {
        self.run_observed(url, num_requests, kind, |_| {}).await
    }

    /// Like [`LoadRunner::run`], calling `observer` as each probe finishes
    ///
    /// The whole batch is awaited before summarizing. If any probe task fails
    /// to join, the run fails and no partial summary is produced.
    pub async fn run_observed<F>(
        &self,
        url: &str,
        num_requests: usize,
        kind: &str,
        mut observer: F,
    ) -> Result<RunSummary, RunError>
    where
        F: FnMut(&ProbeResult),
    {
        if num_requests == 0 || num_requests > MAX_REQUESTS as usize {
            return Err(RunError::InvalidCount(num_requests));
        }
        let target = Url::parse(url).map_err(|e| RunError::InvalidUrl(format!("{}: {}", url, e)))?;

        info!(
            event = "run_started",
            url = url,
            kind = kind,
            num_requests = num_requests,
            message = "Starting load run"
        );
        let started = Instant::now();

        let mut pending: FuturesUnordered<_> = (1..=num_requests as u32)
            .map(|id| {
                let client = self.client.clone();
                let target = target.clone();
                let kind = kind.to_string();
                tokio::spawn(async move { probe(&client, target, id, kind).await })
            })
            .collect();

        let mut results = Vec::with_capacity(num_requests);
        while let Some(joined) = pending.next().await {
            let result = joined?;
            observer(&result);
            results.push(result);
        }

        let summary = summarize(url, kind, results);

        info!(
            event = "run_completed",
            url = url,
            kind = kind,
            total_requests = summary.total_requests,
            success_count = summary.success_count,
            rejected_count = summary.rejected_count,
            avg_time = summary.avg_time,
            elapsed_ms = started.elapsed().as_millis() as u64,
            message = "Load run completed"
        );

        Ok(summary)
    }
}

/// Make a single timed GET request
///
/// Never fails: any status the target returns is a valid outcome, and
/// network-level failures, including a body cut short by the timeout, are
/// reported as status 0 with the error attached.
pub async fn probe(client: &Client, url: Url, id: u32, kind: String) -> ProbeResult {
    let start_time = Instant::now();

    match client.get(url.clone()).send().await {
        Ok(response) => {
            let received = response.status().as_u16();

            // Drain the body so the timing covers the whole exchange. A body
            // that never completes is a network failure, not an answer.
            let (status, error) = match response.bytes().await {
                Ok(_) => (received, None),
                Err(e) => {
                    warn!(
                        event = "probe_body_error",
                        url = url.as_str(),
                        id = id,
                        status = received,
                        timeout = e.is_timeout(),
                        error = %e,
                        message = "Failed to read response body"
                    );
                    (0, Some(format!("Failed to read response body: {}", e)))
                }
            };

            let result = ProbeResult {
                id,
                status,
                time: start_time.elapsed().as_secs_f64(),
                kind,
                error,
            };

            debug!(
                event = "probe_completed",
                url = url.as_str(),
                id = id,
                status = status,
                time = result.time,
                message = "Probe completed"
            );

            result
        }
        Err(e) => {
            let result = ProbeResult {
                id,
                status: 0,
                time: start_time.elapsed().as_secs_f64(),
                kind,
                error: Some(format!("Request failed: {}", e)),
            };

            warn!(
                event = "probe_error",
                url = url.as_str(),
                id = id,
                time = result.time,
                error = %e,
                message = "Probe failed without a response"
            );

            result
        }
    }
}
