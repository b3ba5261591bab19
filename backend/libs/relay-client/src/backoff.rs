use std::time::Duration;

/// Bounded exponential backoff between reconnection attempts.
///
/// Attempt `n` (0-based) waits `base_delay * 2^n`; there is no attempt
/// `max_attempts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }

    /// Delay before reconnection attempt `attempt`, or `None` once exhausted
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        Some(self.base_delay.saturating_mul(factor))
    }

    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_attempts).filter_map(move |attempt| self.delay(attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sequence() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = policy.delays().map(|d| d.as_secs()).collect();

        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
        assert_eq!(policy.delay(5), None);
    }

    #[test]
    fn test_custom_base() {
        let policy = ReconnectPolicy::new(Duration::from_millis(250), 3);
        let delays: Vec<Duration> = policy.delays().collect();

        assert_eq!(
            delays,
            vec![
                Duration::from_millis(250),
                Duration::from_millis(500),
                Duration::from_millis(1000),
            ]
        );
    }

    #[test]
    fn test_zero_attempts_never_retries() {
        let policy = ReconnectPolicy::new(Duration::from_secs(1), 0);
        assert_eq!(policy.delay(0), None);
        assert_eq!(policy.delays().count(), 0);
    }

    #[test]
    fn test_large_attempt_saturates() {
        let policy = ReconnectPolicy::new(Duration::from_secs(1), 64);
        assert!(policy.delay(40).is_some());
    }
}
