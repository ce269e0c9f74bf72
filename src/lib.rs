//! Bulwark - compare resilient and unprotected HTTP endpoints under load
//!
//! Bulwark fires batches of concurrent GET requests at a target, times each
//! one, and reduces the outcomes into a summary: success rate, mean latency
//! and a histogram of status codes. It ships a dashboard API that runs such
//! batches on demand and keeps their history in memory, a relay for
//! actuator-style metrics, and a demo target whose protected endpoint sits
//! behind a bulkhead and a fixed-window rate limiter.
//!
//! # Example
//!
//! ```rust,no_run
//! use bulwark::LoadRunnerBuilder;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runner = LoadRunnerBuilder::new()
//!         .timeout(Duration::from_secs(10))
//!         .build()?;
//!
//!     let summary = runner
//!         .run("http://localhost:8080/demo/protected", 50, "protected")
//!         .await?;
//!
//!     println!("{} succeeded, {:?}", summary.success_rate, summary.status_codes);
//!     Ok(())
//! }
//! ```

pub mod actuator;
pub mod attack;
pub mod config;
pub mod encode;
pub mod error;
pub mod limiter;
pub mod models;
pub mod report;
pub mod server;
pub mod storage;
pub mod target;
pub mod utils;

// Re-export the main types for library users
pub use attack::{LoadRunner, probe};
pub use config::ProbeConfig;
pub use error::{AppError, RunError};
pub use models::{ProbeResult, RequestLog, RunSummary, TestRunRecord};
pub use report::summarize;

use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;

/// Builder for the HTTP client behind a [`LoadRunner`]
#[derive(Debug, Clone, Default)]
pub struct LoadRunnerBuilder {
    config: ProbeConfig,
}

impl LoadRunnerBuilder {
    /// Create a new LoadRunnerBuilder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timeout of each probe
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the maximum number of idle connections kept per host
    pub fn max_idle_connections(mut self, connections: usize) -> Self {
        self.config.max_idle_connections = connections;
        self
    }

    /// Build the runner and its connection pool
    pub fn build(self) -> Result<LoadRunner> {
        let client = Client::builder()
            .timeout(self.config.timeout)
            .pool_max_idle_per_host(self.config.max_idle_connections)
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(LoadRunner::from_parts(client, self.config))
    }
}
