use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use bulwark::LoadRunnerBuilder;
use bulwark::config::{
    BulkheadConfig, DEFAULT_ACTUATOR_URL, DEFAULT_DASHBOARD_PORT, DEFAULT_HISTORY_LIMIT,
    DEFAULT_MAX_CONCURRENT_CALLS, DEFAULT_POLICY, PolicyConfig, DEFAULT_MAX_IDLE_CONNECTIONS, DEFAULT_MAX_QUEUE_SIZE,
    DEFAULT_RATE_LIMIT, DEFAULT_TARGET_PORT, ProbeConfig, RateLimitConfig, ServerConfig,
    TargetConfig,
};
use bulwark::encode::{Format, write_summary};
use bulwark::utils::{get_writer, parse_policy, parse_target_url};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the dashboard API
    Serve {
        /// Address to bind
        #[arg(long, default_value = "0.0.0.0")]
        bind: IpAddr,

        /// Port to listen on
        #[arg(long, default_value_t = DEFAULT_DASHBOARD_PORT)]
        port: u16,

        /// Timeout of each probe
        #[arg(long, default_value = "60s")]
        timeout: humantime::Duration,

        /// Max idle connections kept per target host
        #[arg(long, default_value_t = DEFAULT_MAX_IDLE_CONNECTIONS)]
        connections: usize,

        /// Timeout of relayed actuator calls
        #[arg(long = "actuator-timeout", default_value = "3s")]
        actuator_timeout: humantime::Duration,

        /// Actuator metrics URL used when a metric request names none
        #[arg(long = "actuator-url", default_value = DEFAULT_ACTUATOR_URL)]
        actuator_url: String,

        /// Number of runs returned by the history route
        #[arg(long = "history-limit", default_value_t = DEFAULT_HISTORY_LIMIT)]
        history_limit: usize,

        /// Directory with a pre-built dashboard client
        #[arg(long = "static-dir")]
        static_dir: Option<PathBuf>,
    },

    /// Run one batch of concurrent requests and print a report
    Run {
        /// Target URL
        #[arg(long)]
        url: String,

        /// Number of concurrent requests [1-1000]
        #[arg(long, short = 'n', default_value = "10", value_parser = clap::value_parser!(u32).range(1..=1000))]
        requests: u32,

        /// Type tag of the run, e.g. protected or unprotected
        #[arg(long = "type", default_value = "protected")]
        kind: String,

        /// Timeout of each probe
        #[arg(long, default_value = "60s")]
        timeout: humantime::Duration,

        /// Max idle connections kept per target host
        #[arg(long, default_value_t = DEFAULT_MAX_IDLE_CONNECTIONS)]
        connections: usize,

        /// Report format
        #[arg(long, value_enum, default_value = "text")]
        format: Format,

        /// Output file
        #[arg(long, default_value = "stdout")]
        output: String,
    },

    /// Serve a demo backend with a protected and an unprotected endpoint
    Target {
        /// Address to bind
        #[arg(long, default_value = "0.0.0.0")]
        bind: IpAddr,

        /// Port to listen on
        #[arg(long, default_value_t = DEFAULT_TARGET_PORT)]
        port: u16,

        /// Maximum concurrent calls admitted by the default policy
        #[arg(long = "max-concurrent", default_value_t = DEFAULT_MAX_CONCURRENT_CALLS)]
        max_concurrent: usize,

        /// Calls allowed to wait for the bulkhead [0 = reject immediately]
        #[arg(long = "queue-size", default_value_t = DEFAULT_MAX_QUEUE_SIZE)]
        queue_size: usize,

        /// How long a queued call waits for the bulkhead
        #[arg(long = "queue-timeout", default_value = "500ms")]
        queue_timeout: humantime::Duration,

        /// Calls allowed per rate-limit window of the default policy
        #[arg(long = "rate-limit", default_value_t = DEFAULT_RATE_LIMIT)]
        rate_limit: u32,

        /// Rate-limit window
        #[arg(long, default_value = "1s")]
        window: humantime::Duration,

        /// Simulated processing time of each call
        #[arg(long, default_value = "0s")]
        work: humantime::Duration,

        /// Policy guarding /demo/protected and unknown policy names
        #[arg(long = "default-policy", default_value = DEFAULT_POLICY)]
        default_policy: String,

        /// Named policy served at /demo/protected/NAME, as
        /// NAME=MAX_CONCURRENT/RATE_LIMIT[/WINDOW] or NAME=off [repeatable]
        #[arg(long = "policy", value_parser = parse_policy)]
        policies: Vec<(String, PolicyConfig)>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bulwark=info,tower_http=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            bind,
            port,
            timeout,
            connections,
            actuator_timeout,
            actuator_url,
            history_limit,
            static_dir,
        } => {
            let config = ServerConfig {
                addr: SocketAddr::new(bind, port),
                probe: ProbeConfig {
                    timeout: timeout.into(),
                    max_idle_connections: connections,
                },
                actuator_timeout: actuator_timeout.into(),
                actuator_url,
                history_limit,
                static_dir,
            };
            bulwark::server::serve(config).await?;
        }
        Commands::Run {
            url,
            requests,
            kind,
            timeout,
            connections,
            format,
            output,
        } => {
            run(url, requests as usize, kind, timeout, connections, format, output).await?;
        }
        Commands::Target {
            bind,
            port,
            max_concurrent,
            queue_size,
            queue_timeout,
            rate_limit,
            window,
            work,
            default_policy,
            policies,
        } => {
            let config = TargetConfig {
                addr: SocketAddr::new(bind, port),
                bulkhead: BulkheadConfig {
                    max_concurrent_calls: max_concurrent,
                    max_queue_size: queue_size,
                    queue_timeout: queue_timeout.into(),
                },
                rate_limit: RateLimitConfig {
                    limit: rate_limit,
                    window: window.into(),
                },
                default_policy,
                policies: policies.into_iter().collect(),
                work: work.into(),
            };
            bulwark::target::serve(config).await?;
        }
    }

    Ok(())
}

/// Fire one batch from the command line
async fn run(
    url: String,
    requests: usize,
    kind: String,
    timeout: humantime::Duration,
    connections: usize,
    format: Format,
    output: String,
) -> Result<()> {
    parse_target_url(&url)?;

    let runner = LoadRunnerBuilder::new()
        .timeout(timeout.into())
        .max_idle_connections(connections)
        .build()?;

    let progress_bar = ProgressBar::new(requests as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("##-"),
    );

    let summary = runner
        .run_observed(&url, requests, &kind, |_| progress_bar.inc(1))
        .await?;
    progress_bar.finish_with_message("Run completed");

    let mut writer = get_writer(&output)?;
    write_summary(&summary, format, &mut writer)?;
    writer.flush()?;

    Ok(())
}
