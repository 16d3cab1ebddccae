//! Backoff and retry bookkeeping for failed keys.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use rand::Rng;

/// Exponential backoff configuration.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Base delay for first retry.
    pub base: Duration,

    /// Maximum delay.
    pub max: Duration,

    /// Jitter factor (0.0 to 1.0).
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(5),
            max: Duration::from_secs(1000),
            jitter: 0.1,
        }
    }
}

impl BackoffPolicy {
    /// Calculate delay for the given attempt number (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(62) as i32;
        let delay = self.base.as_millis() as f64 * 2.0_f64.powi(exponent);
        let delay = delay.min(self.max.as_millis() as f64);

        let jitter = if self.jitter > 0.0 {
            delay * self.jitter * rand::rng().random_range(-1.0_f64..=1.0)
        } else {
            0.0
        };

        Duration::from_millis((delay + jitter).max(0.0) as u64)
    }
}

/// Failure counter per key.
///
/// Counts consecutive failures within a window; a key that stays quiet for
/// longer than the window starts over at attempt one.
#[derive(Debug, Clone)]
pub struct RetryTracker<K> {
    /// Retry window duration.
    window: Duration,

    /// Tracked failures: key -> (count, first_failure_time).
    failures: BTreeMap<K, (u32, Instant)>,
}

impl<K: Ord + Clone> RetryTracker<K> {
    /// Create a new retry tracker.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            failures: BTreeMap::new(),
        }
    }

    /// Record a failure for a key.
    ///
    /// Returns the attempt number, starting at 1.
    pub fn record_failure(&mut self, key: &K) -> u32 {
        let now = Instant::now();

        let (count, first) = self.failures.entry(key.clone()).or_insert((0, now));

        // Reset if outside window
        if now.duration_since(*first) > self.window {
            *count = 0;
            *first = now;
        }

        *count = count.saturating_add(1);
        *count
    }

    /// Number of failures currently recorded for a key.
    pub fn failures(&self, key: &K) -> u32 {
        self.failures.get(key).map(|(count, _)| *count).unwrap_or(0)
    }

    /// Clear failure tracking for a key (on success).
    pub fn clear(&mut self, key: &K) {
        self.failures.remove(key);
    }
}
