// Exponential backoff between step attempts.
use std::time::Duration;

use crate::config::ExecutorConfig;

/// Exponential backoff between ordinary attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            base_delay,
        }
    }

    pub fn from_config(cfg: &ExecutorConfig) -> Self {
        Self::new(cfg.max_retries, Duration::from_millis(cfg.base_delay_ms))
    }

    /// `base × 2^(attempt-1)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exp)
    }

    /// Wait after failed attempt `attempt`, or `None` once retries are spent
    /// and recovery takes over.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        (attempt >= 1 && attempt < self.max_retries).then(|| self.backoff(attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_base() {
        let p = RetryPolicy::new(3, Duration::from_secs(1));
        assert_eq!(p.backoff(1), Duration::from_secs(1));
        assert_eq!(p.backoff(2), Duration::from_secs(2));
        assert_eq!(p.backoff(3), Duration::from_secs(4));
    }

    #[test]
    fn no_backoff_after_last_ordinary_attempt() {
        let p = RetryPolicy::new(3, Duration::from_millis(1000));
        let delays: Vec<Option<Duration>> = (1..=4).map(|a| p.delay_after(a)).collect();
        assert_eq!(
            delays,
            vec![
                Some(Duration::from_millis(1000)),
                Some(Duration::from_millis(2000)),
                None,
                None
            ]
        );
    }

    #[test]
    fn defaults_follow_config() {
        let p = RetryPolicy::from_config(&ExecutorConfig::default());
        assert_eq!(p.max_retries, 3);
        assert_eq!(p.base_delay, Duration::from_secs(1));
    }
}
