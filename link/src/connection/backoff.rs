use std::time::Duration;

use crate::models::ConnectionOptions;

/// Exponential reconnect policy: `min(initial * 2^(attempt-1), max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    max_attempts: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            initial,
            max,
            max_attempts,
        }
    }

    /// A zero-attempt policy when automatic reconnection is off.
    pub fn from_options(options: &ConnectionOptions) -> Self {
        let max_attempts = if options.auto_reconnect {
            options.max_reconnect_attempts
        } else {
            0
        };
        Self::new(
            Duration::from_millis(options.reconnect_delay_ms),
            Duration::from_millis(options.max_reconnect_delay_ms),
            max_attempts,
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether retry number `attempt` (1-based) may run.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt >= 1 && attempt <= self.max_attempts
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63);
        let factor = 1u64.checked_shl(exp).unwrap_or(u64::MAX);
        let millis = (self.initial.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(millis).min(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> Backoff {
        Backoff::new(Duration::from_millis(1000), Duration::from_millis(30_000), 5)
    }

    #[test]
    fn test_delay_doubles_from_initial() {
        let b = policy();
        assert_eq!(b.delay_for(1), Duration::from_millis(1000));
        assert_eq!(b.delay_for(2), Duration::from_millis(2000));
        assert_eq!(b.delay_for(3), Duration::from_millis(4000));
        assert_eq!(b.delay_for(5), Duration::from_millis(16_000));
    }

    #[test]
    fn test_delay_is_capped() {
        let b = policy();
        assert_eq!(b.delay_for(6), Duration::from_millis(30_000));
        assert_eq!(b.delay_for(200), Duration::from_millis(30_000));
    }

    #[test]
    fn test_allows_within_limit() {
        let b = policy();
        assert!(!b.allows(0));
        assert!(b.allows(1));
        assert!(b.allows(5));
        assert!(!b.allows(6));
    }

    #[test]
    fn test_auto_reconnect_off_means_no_attempts() {
        let options = ConnectionOptions::default().with_auto_reconnect(false);
        let b = Backoff::from_options(&options);
        assert_eq!(b.max_attempts(), 0);
        assert!(!b.allows(1));
    }
}
