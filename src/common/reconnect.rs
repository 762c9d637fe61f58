//! Exponential backoff reconnection logic.

use std::time::Duration;

use backon::BackoffBuilder;

/// Configuration for exponential backoff reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnection attempt.
    pub min_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Multiplier for each successive attempt.
    pub factor: f32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            factor: 1.5,
        }
    }
}

impl ReconnectPolicy {
    /// Build a fresh, jittered, unlimited backoff iterator.
    ///
    /// Call again after a successful connection to reset the delay.
    pub fn backoff(&self) -> impl Iterator<Item = Duration> {
        backon::ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_factor(self.factor)
            .with_jitter()
            .without_max_times()
            .build()
    }

    /// Next delay from `backoff`, falling back to the maximum.
    pub fn next_delay(&self, backoff: &mut impl Iterator<Item = Duration>) -> Duration {
        backoff.next().unwrap_or(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_unlimited() {
        let policy = ReconnectPolicy {
            min_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            factor: 2.0,
        };
        let mut backoff = policy.backoff();
        for _ in 0..50 {
            assert!(backoff.next().is_some());
        }
    }

    #[test]
    fn test_backoff_respects_bounds() {
        let policy = ReconnectPolicy {
            min_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            factor: 2.0,
        };
        let mut backoff = policy.backoff();
        let first = policy.next_delay(&mut backoff);
        assert!(first >= Duration::from_millis(10));
        for _ in 0..20 {
            // Jitter can at most double a capped delay.
            assert!(policy.next_delay(&mut backoff) <= Duration::from_millis(200));
        }
    }
}
