//! Fibonacci requeue backoff
//!
//! Failed reconciles are requeued with a Fibonacci schedule rather than pure
//! exponential growth: 30s, 30s, 1m, 1m30s, 2m30s, 4m, capped at 10m. The
//! sequence resets on the first successful reconcile of a resource.

use std::time::Duration;

/// Fibonacci backoff calculator
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min: Duration,
    max: Duration,
    prev: Duration,
    current: Duration,
}

impl FibonacciBackoff {
    /// Create a backoff spanning `min` to `max`. The first two delays are
    /// both `min`.
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            prev: Duration::ZERO,
            current: min,
        }
    }

    /// The schedule used for reconcile requeues.
    #[must_use]
    pub fn for_reconcile() -> Self {
        Self::new(Duration::from_secs(30), Duration::from_secs(600))
    }

    /// Return the next delay and advance the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let result = self.current;
        let next = self.prev + self.current;
        self.prev = self.current;
        self.current = std::cmp::min(next, self.max);
        result
    }

    /// Restart the sequence after a success.
    pub fn reset(&mut self) {
        self.prev = Duration::ZERO;
        self.current = self.min;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_follows_fibonacci() {
        let mut backoff = FibonacciBackoff::for_reconcile();
        assert_eq!(backoff.next_delay(), Duration::from_secs(30));
        assert_eq!(backoff.next_delay(), Duration::from_secs(30));
        assert_eq!(backoff.next_delay(), Duration::from_secs(60));
        assert_eq!(backoff.next_delay(), Duration::from_secs(90));
        assert_eq!(backoff.next_delay(), Duration::from_secs(150));
        assert_eq!(backoff.next_delay(), Duration::from_secs(240));
    }

    #[test]
    fn test_sequence_caps_at_max() {
        let mut backoff = FibonacciBackoff::new(Duration::from_secs(300), Duration::from_secs(600));
        assert_eq!(backoff.next_delay(), Duration::from_secs(300));
        assert_eq!(backoff.next_delay(), Duration::from_secs(300));
        assert_eq!(backoff.next_delay(), Duration::from_secs(600));
        assert_eq!(backoff.next_delay(), Duration::from_secs(600));
    }

    #[test]
    fn test_reset_restarts_sequence() {
        let mut backoff = FibonacciBackoff::for_reconcile();
        backoff.next_delay();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(30));
    }
}
