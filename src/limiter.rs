//! Bulkhead and rate-limit guards used by the demo target.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

use crate::config::{BulkheadConfig, PolicyConfig, RateLimitConfig, TargetConfig};

/// Metric names exposed for every resilience policy
pub const METRIC_NAMES: [&str; 9] = [
    "bulkhead.available",
    "bulkhead.queue.size",
    "bulkhead.rejected",
    "bulkhead.success",
    "execution.error",
    "ratelimit.available",
    "ratelimit.rejected",
    "ratelimit.remaining.window",
    "ratelimit.success",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimitError {
    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Bulkhead capacity full and queueing not enabled")]
    BulkheadFull,

    #[error("Bulkhead queue is full")]
    QueueFull,

    #[error("Bulkhead queue wait timeout exceeded")]
    QueueTimeout,

    #[error("No bulkhead/rate-limit policy found with name: {0}")]
    UnknownPolicy(String),
}

impl LimitError {
    /// Whether the rejection came from the bulkhead
    pub fn is_bulkhead(&self) -> bool {
        matches!(
            self,
            LimitError::BulkheadFull | LimitError::QueueFull | LimitError::QueueTimeout
        )
    }
}

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

/// Point-in-time view of a rate limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSnapshot {
    pub available: u32,
    pub limit: u32,
    pub window: Duration,
    pub remaining_window: Duration,
}

/// Allows `limit` calls per window; the window restarts on the first call
/// after it has fully elapsed.
#[derive(Debug)]
pub struct FixedWindowRateLimiter {
    limit: u32,
    window: Duration,
    state: Mutex<Window>,
}

impl FixedWindowRateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            limit: config.limit,
            window: config.window,
            state: Mutex::new(Window {
                started: Instant::now(),
                count: 0,
            }),
        }
    }

    pub fn try_acquire(&self) -> Result<(), LimitError> {
        self.try_acquire_at(Instant::now())
    }

    fn try_acquire_at(&self, now: Instant) -> Result<(), LimitError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if now.saturating_duration_since(state.started) > self.window {
            state.started = now;
            state.count = 0;
        }

        // Rejected calls still consume the window
        state.count = state.count.saturating_add(1);
        if state.count > self.limit {
            return Err(LimitError::RateLimited);
        }
        Ok(())
    }

    pub fn snapshot(&self) -> RateLimitSnapshot {
        self.snapshot_at(Instant::now())
    }

    fn snapshot_at(&self, now: Instant) -> RateLimitSnapshot {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let elapsed = now.saturating_duration_since(state.started);

        if elapsed > self.window {
            return RateLimitSnapshot {
                available: self.limit,
                limit: self.limit,
                window: self.window,
                remaining_window: Duration::ZERO,
            };
        }

        RateLimitSnapshot {
            available: self.limit.saturating_sub(state.count),
            limit: self.limit,
            window: self.window,
            remaining_window: self.window.saturating_sub(elapsed),
        }
    }
}

/// Point-in-time view of a bulkhead
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkheadSnapshot {
    pub available: usize,
    pub max_concurrent_calls: usize,
    pub queue_size: usize,
    pub queue_capacity: usize,
}

/// Caps concurrent executions, optionally letting a bounded number of callers
/// wait for a permit.
#[derive(Debug)]
pub struct Bulkhead {
    semaphore: Arc<Semaphore>,
    max_concurrent_calls: usize,
    max_queue_size: usize,
    queue_timeout: Duration,
    queued: AtomicUsize,
}

struct QueueSlot<'a>(&'a AtomicUsize);

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Bulkhead {
    pub fn new(config: &BulkheadConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_calls)),
            max_concurrent_calls: config.max_concurrent_calls,
            max_queue_size: config.max_queue_size,
            queue_timeout: config.queue_timeout,
            queued: AtomicUsize::new(0),
        }
    }

    /// Acquire a permit; it is released when dropped
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, LimitError> {
        if let Ok(permit) = self.semaphore.clone().try_acquire_owned() {
            return Ok(permit);
        }

        if self.max_queue_size == 0 {
            return Err(LimitError::BulkheadFull);
        }

        let max_queue_size = self.max_queue_size;
        self.queued
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |queued| {
                (queued < max_queue_size).then_some(queued + 1)
            })
            .map_err(|_| LimitError::QueueFull)?;
        let _slot = QueueSlot(&self.queued);

        match tokio::time::timeout(self.queue_timeout, self.semaphore.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(LimitError::BulkheadFull),
            Err(_) => Err(LimitError::QueueTimeout),
        }
    }

    pub fn snapshot(&self) -> BulkheadSnapshot {
        BulkheadSnapshot {
            available: self.semaphore.available_permits(),
            max_concurrent_calls: self.max_concurrent_calls,
            queue_size: self.queued.load(Ordering::SeqCst),
            queue_capacity: self.max_queue_size,
        }
    }
}

/// Rate limit followed by bulkhead, with success, rejection and error counters
#[derive(Debug)]
pub struct ResiliencePolicy {
    name: String,
    rate_limiter: FixedWindowRateLimiter,
    bulkhead: Bulkhead,
    ratelimit_success: AtomicU64,
    ratelimit_rejected: AtomicU64,
    bulkhead_success: AtomicU64,
    bulkhead_rejected: AtomicU64,
    execution_errors: AtomicU64,
}

impl ResiliencePolicy {
    pub fn new(name: &str, config: &PolicyConfig) -> Self {
        Self {
            name: name.to_string(),
            rate_limiter: FixedWindowRateLimiter::new(&config.rate_limit),
            bulkhead: Bulkhead::new(&config.bulkhead),
            ratelimit_success: AtomicU64::new(0),
            ratelimit_rejected: AtomicU64::new(0),
            bulkhead_success: AtomicU64::new(0),
            bulkhead_rejected: AtomicU64::new(0),
            execution_errors: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `call` under this policy
    ///
    /// The outer error is a rejection; the inner result is the call's own
    /// outcome. Failed calls are counted as execution errors. The bulkhead
    /// permit is held until `call` completes.
    pub async fn execute<T, E, Fut>(&self, call: Fut) -> Result<Result<T, E>, LimitError>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let _permit = self.admit().await?;
        let outcome = call.await;
        if outcome.is_err() {
            self.execution_errors.fetch_add(1, Ordering::Relaxed);
        }
        Ok(outcome)
    }

    /// Admit one call; hold the returned permit for the duration of the call
    pub async fn admit(&self) -> Result<OwnedSemaphorePermit, LimitError> {
        if let Err(e) = self.rate_limiter.try_acquire() {
            self.ratelimit_rejected.fetch_add(1, Ordering::Relaxed);
            return Err(e);
        }
        self.ratelimit_success.fetch_add(1, Ordering::Relaxed);

        match self.bulkhead.acquire().await {
            Ok(permit) => {
                self.bulkhead_success.fetch_add(1, Ordering::Relaxed);
                Ok(permit)
            }
            Err(e) => {
                self.bulkhead_rejected.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Current value of one of [`METRIC_NAMES`]
    pub fn metric(&self, name: &str) -> Option<f64> {
        let bulkhead = self.bulkhead.snapshot();
        let rate_limit = self.rate_limiter.snapshot();

        let value = match name {
            "bulkhead.available" => bulkhead.available as f64,
            "bulkhead.queue.size" => bulkhead.queue_size as f64,
            "bulkhead.rejected" => self.bulkhead_rejected.load(Ordering::Relaxed) as f64,
            "bulkhead.success" => self.bulkhead_success.load(Ordering::Relaxed) as f64,
            "execution.error" => self.execution_errors.load(Ordering::Relaxed) as f64,
            "ratelimit.available" => rate_limit.available as f64,
            "ratelimit.rejected" => self.ratelimit_rejected.load(Ordering::Relaxed) as f64,
            "ratelimit.remaining.window" => rate_limit.remaining_window.as_millis() as f64,
            "ratelimit.success" => self.ratelimit_success.load(Ordering::Relaxed) as f64,
            _ => return None,
        };
        Some(value)
    }
}

/// Named policies, always including the default one
#[derive(Debug)]
pub struct PolicyRegistry {
    policies: HashMap<String, Arc<ResiliencePolicy>>,
    default: Arc<ResiliencePolicy>,
}

impl PolicyRegistry {
    /// Create every enabled policy, then the default policy if it is missing
    ///
    /// The default exists even when its own entry is disabled.
    pub fn new(
        default_policy: &str,
        default_config: &PolicyConfig,
        policies: &BTreeMap<String, PolicyConfig>,
    ) -> Self {
        let mut created = HashMap::new();
        for (name, config) in policies {
            if !config.enabled {
                debug!(event = "policy_disabled", policy = name.as_str(), "Skipping disabled policy");
                continue;
            }
            created.insert(name.clone(), Arc::new(ResiliencePolicy::new(name, config)));
            info!(
                event = "policy_created",
                policy = name.as_str(),
                max_concurrent_calls = config.bulkhead.max_concurrent_calls,
                rate_limit = config.rate_limit.limit,
                "Created bulkhead/rate-limit policy"
            );
        }

        let default = created
            .entry(default_policy.to_string())
            .or_insert_with(|| {
                info!(event = "policy_created", policy = default_policy, "Created default bulkhead/rate-limit policy");
                Arc::new(ResiliencePolicy::new(default_policy, default_config))
            })
            .clone();

        Self {
            policies: created,
            default,
        }
    }

    pub fn from_config(config: &TargetConfig) -> Self {
        Self::new(
            &config.default_policy,
            &config.default_policy_config(),
            &config.policies,
        )
    }

    /// Names of the created policies, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.policies.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get(&self, name: &str) -> Result<Arc<ResiliencePolicy>, LimitError> {
        self.policies
            .get(name)
            .cloned()
            .ok_or_else(|| LimitError::UnknownPolicy(name.to_string()))
    }

    /// The named policy, or the default one when no such policy exists
    pub fn get_or_default(&self, name: &str) -> Arc<ResiliencePolicy> {
        self.policies.get(name).unwrap_or(&self.default).clone()
    }

    pub fn default_policy(&self) -> Arc<ResiliencePolicy> {
        self.default.clone()
    }

    /// Value of a metric for one policy, or summed over all policies
    pub fn metric(&self, name: &str, policy: Option<&str>) -> Option<f64> {
        match policy {
            Some(policy) => self.policies.get(policy)?.metric(name),
            None => self
                .policies
                .values()
                .map(|p| p.metric(name))
                .sum::<Option<f64>>(),
        }
    }
}
