//! Retry backoff: decides how long a corrected task waits before it is
//! eligible for re-dispatch.

use rand::Rng;
use std::time::Duration;

/// Exponential backoff with jitter.
///
/// delay = base_delay * multiplier^(attempts - 1), capped at max_delay,
/// then widened by up to `jitter` in either direction so simultaneous
/// retries don't stampede the same worker.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,

    /// Fraction of the delay used as the jitter band (0.0 disables).
    pub jitter: f64,
}

impl RetryPolicy {
    /// Calculate the delay before the next attempt.
    ///
    /// `attempts` is the number of attempts already made (1-indexed).
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        let exp = attempts.saturating_sub(1) as i32;
        let mut delay_secs = base_secs * self.multiplier.powi(exp);
        delay_secs = delay_secs.min(self.max_delay.as_secs_f64());

        if self.jitter > 0.0 {
            let band = delay_secs * self.jitter;
            let offset = rand::thread_rng().gen_range(-band..=band);
            delay_secs = (delay_secs + offset).max(0.0);
        }
        Duration::from_secs_f64(delay_secs)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: 0.1,
        }
    }
}
