use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounded exponential backoff with jitter for contended counter updates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Delay before the first retry, in milliseconds
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    /// Upper bound on a single delay, in milliseconds
    pub max_delay_ms: u64,
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Give up once this much time has passed, in milliseconds
    pub max_elapsed_ms: Option<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            max_attempts: 10,
            max_elapsed_ms: None,
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after `attempt` failed attempts, or `None` to give up.
    ///
    /// `jitter` is a sample in `[0, 1]`, clamped otherwise; the returned delay
    /// lies in `[base / 2, base]`, rounded to whole milliseconds, where `base`
    /// is the capped exponential delay.
    ///
    /// # Examples
    ///
    /// ```
    /// use variant_accession::accession::retry::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::default();
    /// assert_eq!(policy.next_delay(1, Duration::ZERO, 0.0), Some(Duration::from_millis(50)));
    /// assert_eq!(policy.next_delay(10, Duration::ZERO, 0.0), None);
    /// ```
    #[must_use]
    pub fn next_delay(&self, attempt: u32, elapsed: Duration, jitter: f64) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }
        if let Some(max_elapsed) = self.max_elapsed_ms {
            if elapsed >= Duration::from_millis(max_elapsed) {
                return None;
            }
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        #[allow(clippy::cast_precision_loss)]
        let uncapped = self.initial_delay_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        #[allow(clippy::cast_precision_loss)]
        let base = uncapped.min(self.max_delay_ms as f64);
        let jitter = jitter.clamp(0.0, 1.0);
        let delay_ms = base / 2.0 + base / 2.0 * jitter;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Some(Duration::from_millis(delay_ms.round() as u64))
    }

    /// Policy that retries immediately, for tests and in-memory stores
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            initial_delay_ms: 0,
            multiplier: 1.0,
            max_delay_ms: 0,
            max_attempts,
            max_elapsed_ms: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_growth() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (1..5)
            .map(|a| {
                policy
                    .next_delay(a, Duration::ZERO, 1.0)
                    .unwrap()
                    .as_millis() as u64
            })
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800]);
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 100,
            ..RetryPolicy::default()
        };
        let delay = policy.next_delay(50, Duration::ZERO, 1.0).unwrap();
        assert_eq!(delay, Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = RetryPolicy::default();
        let low = policy.next_delay(2, Duration::ZERO, 0.0).unwrap();
        let high = policy.next_delay(2, Duration::ZERO, 0.999).unwrap();
        assert_eq!(low, Duration::from_millis(100));
        assert!(high <= Duration::from_millis(200));
        assert!(high > low);

        // The upper bound is reached, and out-of-range samples are clamped
        let top = Duration::from_millis(200);
        assert_eq!(policy.next_delay(2, Duration::ZERO, 1.0), Some(top));
        assert_eq!(policy.next_delay(2, Duration::ZERO, 7.5), Some(top));
        assert_eq!(policy.next_delay(2, Duration::ZERO, -1.0), Some(low));
    }

    #[test]
    fn test_gives_up() {
        let policy = RetryPolicy {
            max_attempts: 3,
            max_elapsed_ms: Some(1_000),
            ..RetryPolicy::default()
        };
        assert!(policy.next_delay(2, Duration::ZERO, 0.5).is_some());
        assert!(policy.next_delay(3, Duration::ZERO, 0.5).is_none());
        assert!(policy
            .next_delay(1, Duration::from_millis(1_000), 0.5)
            .is_none());
    }
}
