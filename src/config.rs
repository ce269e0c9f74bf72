use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

// Probe constants
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_IDLE_CONNECTIONS: usize = 1000;
pub const MIN_REQUESTS: i64 = 1;
pub const MAX_REQUESTS: i64 = 1000;

// Dashboard constants
pub const DEFAULT_DASHBOARD_PORT: u16 = 5000;
pub const DEFAULT_HISTORY_LIMIT: usize = 10;
pub const DEFAULT_ACTUATOR_TIMEOUT_SECS: u64 = 3;
pub const DEFAULT_ACTUATOR_URL: &str = "http://localhost:8080/actuator/metrics";

// Demo target constants
pub const DEFAULT_TARGET_PORT: u16 = 8080;
pub const DEFAULT_MAX_CONCURRENT_CALLS: usize = 10;
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 0;
pub const DEFAULT_QUEUE_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_RATE_LIMIT: u32 = 100;
pub const DEFAULT_RATE_WINDOW_SECS: u64 = 1;
pub const DEFAULT_POLICY: &str = "default";

/// HTTP client settings shared by every probe of a runner
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Timeout for each probe
    pub timeout: Duration,
    /// Maximum number of idle connections kept per host
    pub max_idle_connections: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            max_idle_connections: DEFAULT_MAX_IDLE_CONNECTIONS,
        }
    }
}

/// Settings for the dashboard API server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub probe: ProbeConfig,
    /// Timeout for calls relayed to the actuator
    pub actuator_timeout: Duration,
    /// Actuator metrics URL used when a metric request names none
    pub actuator_url: String,
    /// Number of runs returned by the history route
    pub history_limit: usize,
    /// Pre-built dashboard client to serve on unmatched routes
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_DASHBOARD_PORT)),
            probe: ProbeConfig::default(),
            actuator_timeout: Duration::from_secs(DEFAULT_ACTUATOR_TIMEOUT_SECS),
            actuator_url: DEFAULT_ACTUATOR_URL.to_string(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            static_dir: None,
        }
    }
}

/// Bulkhead settings
#[derive(Debug, Clone)]
pub struct BulkheadConfig {
    /// Maximum concurrent executions allowed
    pub max_concurrent_calls: usize,
    /// Callers allowed to wait for a permit; 0 rejects as soon as the bulkhead is full
    pub max_queue_size: usize,
    /// How long a queued caller waits for a permit
    pub queue_timeout: Duration,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: DEFAULT_MAX_CONCURRENT_CALLS,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            queue_timeout: Duration::from_millis(DEFAULT_QUEUE_TIMEOUT_MS),
        }
    }
}

/// Fixed-window rate limit settings
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests allowed per window
    pub limit: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_RATE_LIMIT,
            window: Duration::from_secs(DEFAULT_RATE_WINDOW_SECS),
        }
    }
}

/// One named pair of bulkhead and rate limit
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Disabled policies are not created; lookups fall back to the default
    pub enabled: bool,
    pub bulkhead: BulkheadConfig,
    pub rate_limit: RateLimitConfig,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bulkhead: BulkheadConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Settings for the demo target server
#[derive(Debug, Clone)]
pub struct TargetConfig {
    pub addr: SocketAddr,
    /// Settings of the default policy, unless `policies` names it explicitly
    pub bulkhead: BulkheadConfig,
    pub rate_limit: RateLimitConfig,
    /// Name of the policy guarding `/demo/protected` and unknown lookups
    pub default_policy: String,
    /// Additional named policies
    pub policies: BTreeMap<String, PolicyConfig>,
    /// Simulated processing time of each demo call
    pub work: Duration,
}

impl TargetConfig {
    /// Settings of the default policy
    pub fn default_policy_config(&self) -> PolicyConfig {
        self.policies
            .get(&self.default_policy)
            .cloned()
            .unwrap_or_else(|| PolicyConfig {
                enabled: true,
                bulkhead: self.bulkhead.clone(),
                rate_limit: self.rate_limit.clone(),
            })
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_TARGET_PORT)),
            bulkhead: BulkheadConfig::default(),
            rate_limit: RateLimitConfig::default(),
            default_policy: DEFAULT_POLICY.to_string(),
            policies: BTreeMap::new(),
            work: Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.actuator_url, "http://localhost:8080/actuator/metrics");
        assert_eq!(config.history_limit, 10);
        assert_eq!(config.probe.max_idle_connections, 1000);
    }

    #[test]
    fn test_default_policy_config() {
        let mut config = TargetConfig {
            rate_limit: RateLimitConfig {
                limit: 7,
                window: Duration::from_secs(2),
            },
            ..TargetConfig::default()
        };
        assert_eq!(config.default_policy_config().rate_limit.limit, 7);

        let explicit = PolicyConfig {
            bulkhead: BulkheadConfig {
                max_concurrent_calls: 3,
                ..BulkheadConfig::default()
            },
            ..PolicyConfig::default()
        };
        config.policies.insert(DEFAULT_POLICY.to_string(), explicit);
        let resolved = config.default_policy_config();
        assert_eq!(resolved.bulkhead.max_concurrent_calls, 3);
        assert_eq!(resolved.rate_limit.limit, DEFAULT_RATE_LIMIT);
    }
}
