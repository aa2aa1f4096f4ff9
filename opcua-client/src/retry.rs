// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Exponential backoff used when reconnecting a session or secure channel.

use std::time::Duration;

/// An iterator over successive backoff delays, doubling each time up to `max`,
/// with up to 20% jitter to avoid synchronized reconnect storms.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    current: Duration,
    max: Duration,
    retries_left: Option<u32>,
    initial: Duration,
}

impl ExponentialBackoff {
    /// Create a new backoff generator.
    ///
    /// `max` caps the delay. `retries` limits how many delays are produced before the
    /// iterator is exhausted; `None` retries forever. `initial` is the first delay.
    pub fn new(max: Duration, retries: Option<u32>, initial: Duration) -> Self {
        Self {
            current: initial,
            max,
            retries_left: retries,
            initial,
        }
    }

    /// Reset the backoff back to its initial delay and retry count.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Iterator for ExponentialBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if let Some(left) = &mut self.retries_left {
            if *left == 0 {
                return None;
            }
            *left -= 1;
        }

        let delay = self.current;
        self.current = (self.current * 2).min(self.max);

        let jitter_millis = (delay.as_millis() as f64 * 0.2 * rand_fraction()) as u64;
        Some(delay + Duration::from_millis(jitter_millis))
    }
}

fn rand_fraction() -> f64 {
    use rand::Rng;
    rand::thread_rng().gen_range(0.0..1.0)
}

/// Governs how a session reconnects after losing its secure channel: how many attempts
/// to make and how the delay between attempts grows.
#[derive(Debug, Clone)]
pub struct SessionRetryPolicy {
    max_delay: Duration,
    retry_limit: Option<u32>,
    initial_delay: Duration,
}

impl SessionRetryPolicy {
    /// Default number of reconnect attempts before giving up, if not configured otherwise.
    pub const DEFAULT_RETRY_LIMIT: u32 = 10;

    /// Create a new session retry policy.
    ///
    /// `retry_limit` of `None` means retry forever.
    pub fn new(max_delay: Duration, retry_limit: Option<u32>, initial_delay: Duration) -> Self {
        Self {
            max_delay,
            retry_limit,
            initial_delay,
        }
    }

    /// Construct a fresh backoff generator using this policy's parameters.
    pub fn new_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.max_delay, self.retry_limit, self.initial_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_caps_at_max() {
        let mut backoff = ExponentialBackoff::new(
            Duration::from_secs(4),
            None,
            Duration::from_secs(1),
        );
        for _ in 0..10 {
            let delay = backoff.next().unwrap();
            assert!(delay <= Duration::from_secs(4) + Duration::from_millis(800));
        }
    }

    #[test]
    fn backoff_exhausts_after_limit() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(4), Some(3), Duration::from_millis(100));
        assert!(backoff.next().is_some());
        assert!(backoff.next().is_some());
        assert!(backoff.next().is_some());
        assert!(backoff.next().is_none());
    }
}
