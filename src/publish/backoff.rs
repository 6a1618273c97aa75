//! Poll delay after consecutive builder status failures.

use std::time::Duration;

use crate::config::PublishConfig;

/// Exponential backoff with a cap: `min(base * multiplier^failures, max)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffCalculator {
    base: Duration,
    multiplier: f64,
    max: Duration,
}

impl BackoffCalculator {
    pub fn new(base: Duration, multiplier: f64, max: Duration) -> Self {
        Self {
            base,
            multiplier: multiplier.max(1.0),
            max: max.max(base),
        }
    }

    pub fn from_config(config: &PublishConfig) -> Self {
        Self::new(
            config.poll_interval(),
            config.backoff_multiplier,
            config.max_poll_backoff(),
        )
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    /// Delay before the next poll once `failures` consecutive polls failed.
    pub fn delay_after_failures(&self, failures: u32) -> Duration {
        if failures == 0 {
            return self.base;
        }

        let exponent = i32::try_from(failures).unwrap_or(i32::MAX);
        let scaled = self.base.as_secs_f64() * self.multiplier.powi(exponent);

        if !scaled.is_finite() || scaled >= self.max.as_secs_f64() {
            return self.max;
        }
        Duration::from_secs_f64(scaled)
    }
}

impl From<&PublishConfig> for BackoffCalculator {
    fn from(config: &PublishConfig) -> Self {
        Self::from_config(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_grows_and_caps() {
        let backoff =
            BackoffCalculator::new(Duration::from_secs(5), 2.0, Duration::from_secs(60));

        assert_eq!(backoff.delay_after_failures(0), Duration::from_secs(5));
        assert_eq!(backoff.delay_after_failures(1), Duration::from_secs(10));
        assert_eq!(backoff.delay_after_failures(3), Duration::from_secs(40));
        assert_eq!(backoff.delay_after_failures(4), Duration::from_secs(60));
        assert_eq!(backoff.delay_after_failures(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_from_config_defaults() {
        let backoff = BackoffCalculator::from(&PublishConfig::default());

        assert_eq!(backoff.base(), Duration::from_secs(5));
        assert_eq!(backoff.delay_after_failures(10), Duration::from_secs(60));
    }

    #[test]
    fn test_unit_multiplier_is_constant() {
        let backoff =
            BackoffCalculator::new(Duration::from_millis(250), 1.0, Duration::from_secs(1));

        assert_eq!(backoff.delay_after_failures(7), Duration::from_millis(250));
    }
}
