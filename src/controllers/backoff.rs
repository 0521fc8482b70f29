//! Per-object exponential backoff for failed reconciles

use std::time::Duration;

use dashmap::DashMap;

use crate::store::ObjectKey;

/// Tracks consecutive failures per object.
///
/// The n-th consecutive failure of a key waits `min(base * 2^n, max)`.
pub struct Backoff {
    base: Duration,
    max: Duration,
    failures: DashMap<ObjectKey, u32>,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: DashMap::new(),
        }
    }

    /// Delay before retrying `key`, counting this failure.
    pub fn next_delay(&self, key: &ObjectKey) -> Duration {
        let mut failures = self.failures.entry(key.clone()).or_insert(0);
        let delay = self
            .base
            .saturating_mul(2u32.saturating_pow(*failures))
            .min(self.max);
        *failures = failures.saturating_add(1);
        delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max
    }

    /// Forget the failures of `key` after a successful reconcile.
    pub fn reset(&self, key: &ObjectKey) {
        self.failures.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> ObjectKey {
        ObjectKey::namespaced("bookinfo", name)
    }

    #[test]
    fn test_delay_doubles_up_to_max() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(10));
        let delays: Vec<u64> = (0..6).map(|_| backoff.next_delay(&key("reviews")).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10, 10]);
    }

    #[test]
    fn test_keys_back_off_independently() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(300));
        backoff.next_delay(&key("reviews"));
        backoff.next_delay(&key("reviews"));
        assert_eq!(backoff.next_delay(&key("ratings")), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(&key("reviews")), Duration::from_secs(4));
    }

    #[test]
    fn test_reset_starts_over() {
        let backoff = Backoff::new(Duration::from_secs(2), Duration::from_secs(300));
        backoff.next_delay(&key("reviews"));
        backoff.next_delay(&key("reviews"));
        backoff.reset(&key("reviews"));
        assert_eq!(backoff.next_delay(&key("reviews")), Duration::from_secs(2));
    }

    #[test]
    fn test_many_failures_do_not_overflow() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(300));
        for _ in 0..100 {
            backoff.next_delay(&key("reviews"));
        }
        assert_eq!(backoff.next_delay(&key("reviews")), Duration::from_secs(300));
    }
}
