//! Engine configuration, loaded once at startup.

use std::collections::HashMap;
use std::time::Duration;

use crate::domain::Capability;
use crate::sched::RetryPolicy;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Retry budget for capabilities without an explicit policy.
    pub default_max_attempts: u32,

    /// Worker invocation timeout when nothing better is known.
    pub default_timeout: Duration,

    /// Explicit per-capability timeout overrides.
    pub timeout_overrides: HashMap<Capability, Duration>,

    /// Once a capability has this many latency samples, its timeout is
    /// derived from observed p95 instead of `default_timeout`.
    pub p95_min_samples: usize,

    /// Multiplier applied to the observed p95 when deriving a timeout.
    pub p95_timeout_factor: f64,

    /// Grace period a cancelled worker gets to respond before the task is
    /// forced to Failed.
    pub cancel_grace: Duration,

    /// Scheduler wakes at least this often (backoff gates expire without
    /// any ledger activity to notify on).
    pub tick_interval: Duration,

    pub retry: RetryPolicy,
}

impl EngineConfig {
    pub fn with_timeout_override(mut self, capability: Capability, timeout: Duration) -> Self {
        self.timeout_overrides.insert(capability, timeout);
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_max_attempts: 3,
            default_timeout: Duration::from_secs(30),
            timeout_overrides: HashMap::new(),
            p95_min_samples: 8,
            p95_timeout_factor: 2.0,
            cancel_grace: Duration::from_secs(2),
            tick_interval: Duration::from_millis(100),
            retry: RetryPolicy::default(),
        }
    }
}
