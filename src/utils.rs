use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, Write};
use std::time::Duration;
use url::Url;

use crate::config::{BulkheadConfig, PolicyConfig, RateLimitConfig};

/// Parse a load target, accepting only absolute http(s) URLs
pub fn parse_target_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).context(format!("Invalid URL: {}", raw))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => anyhow::bail!("Unsupported URL scheme: {}", other),
    }
}

/// Get a writer for a file or stdout
pub fn get_writer(path: &str) -> Result<Box<dyn Write>> {
    if path == "stdout" {
        Ok(Box::new(io::stdout()))
    } else {
        let file = File::create(path).context(format!("Failed to create file: {}", path))?;
        Ok(Box::new(file))
    }
}

/// Format a duration in a human-readable format
pub fn format_duration(duration: Duration) -> String {
    let total_micros = duration.as_micros();

    if total_micros < 1_000 {
        return format!("{}µs", total_micros);
    }

    let total_millis = duration.as_millis();
    if total_millis < 1_000 {
        return format!("{:.2}ms", duration.as_secs_f64() * 1000.0);
    }

    let total_secs = duration.as_secs_f64();
    if total_secs < 60.0 {
        return format!("{:.2}s", total_secs);
    }

    let minutes = (total_secs / 60.0).floor();
    let seconds = total_secs - (minutes * 60.0);
    format!("{}m{:.2}s", minutes as u64, seconds)
}
/// Parse a named policy: `NAME=MAX_CONCURRENT/RATE_LIMIT[/WINDOW]` or `NAME=off`
pub fn parse_policy(raw: &str) -> Result<(String, PolicyConfig), String> {
    let (name, settings) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=MAX_CONCURRENT/RATE_LIMIT[/WINDOW], got {}", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("policy name is empty".to_string());
    }

    if settings.trim().eq_ignore_ascii_case("off") {
        let config = PolicyConfig {
            enabled: false,
            ..PolicyConfig::default()
        };
        return Ok((name.to_string(), config));
    }

    let parts: Vec<&str> = settings.split('/').map(str::trim).collect();
    if !(2..=3).contains(&parts.len()) {
        return Err(format!("expected MAX_CONCURRENT/RATE_LIMIT[/WINDOW], got {}", settings));
    }

    let max_concurrent_calls = parts[0]
        .parse::<usize>()
        .map_err(|e| format!("invalid max concurrent calls {}: {}", parts[0], e))?;
    let limit = parts[1]
        .parse::<u32>()
        .map_err(|e| format!("invalid rate limit {}: {}", parts[1], e))?;
    let mut rate_limit = RateLimitConfig {
        limit,
        ..RateLimitConfig::default()
    };
    if let Some(window) = parts.get(2) {
        rate_limit.window = humantime::parse_duration(window)
            .map_err(|e| format!("invalid window {}: {}", window, e))?;
    }

    let config = PolicyConfig {
        enabled: true,
        bulkhead: BulkheadConfig {
            max_concurrent_calls,
            ..BulkheadConfig::default()
        },
        rate_limit,
    };
    Ok((name.to_string(), config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target_url() {
        assert!(parse_target_url("http://localhost:8080/demo/protected").is_ok());
        assert!(parse_target_url("https://example.com").is_ok());
        assert!(parse_target_url("ftp://example.com").is_err());
        assert!(parse_target_url("not a url").is_err());
        assert!(parse_target_url("").is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_micros(250)), "250µs");
        assert_eq!(format_duration(Duration::from_millis(12)), "12.00ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30.00s");
    }

    #[test]
    fn test_parse_policy() {
        let (name, config) = parse_policy("payments=5/20/2s").unwrap();
        assert_eq!(name, "payments");
        assert!(config.enabled);
        assert_eq!(config.bulkhead.max_concurrent_calls, 5);
        assert_eq!(config.rate_limit.limit, 20);
        assert_eq!(config.rate_limit.window, Duration::from_secs(2));

        let (_, config) = parse_policy("reports=3/10").unwrap();
        assert_eq!(config.rate_limit.window, Duration::from_secs(1));

        let (name, config) = parse_policy("default=off").unwrap();
        assert_eq!(name, "default");
        assert!(!config.enabled);
    }

    #[test]
    fn test_parse_policy_rejects_malformed() {
        for raw in ["payments", "=5/20", "payments=5", "payments=x/20", "payments=5/20/soon", "a=1/2/3s/4"] {
            assert!(parse_policy(raw).is_err(), "{raw} should not parse");
        }
    }
}
