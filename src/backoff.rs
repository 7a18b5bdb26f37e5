// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Exponential retry delays for waiting on dependent resources

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Doubling delay capped at `max_delay`.
///
/// The attempt counter is atomic so independent retry loops can share one
/// instance without extra locking.
#[derive(Debug)]
pub struct Backoff {
    start_delay: Duration,
    max_delay: Duration,
    attempt: AtomicU32,
}

impl Backoff {
    pub fn new(start_delay: Duration, max_delay: Duration) -> Self {
        Self {
            start_delay,
            max_delay,
            attempt: AtomicU32::new(0),
        }
    }

    /// Delay for the next attempt: `start_delay * 2^(n-1)`, capped at `max_delay`
    pub fn next(&self) -> Duration {
        let n = self
            .attempt
            .fetch_add(1, Ordering::SeqCst)
            .saturating_add(1);
        let factor = 2u32.checked_pow(n - 1).unwrap_or(u32::MAX);
        self.start_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    pub fn reset(&self) {
        self.attempt.store(0, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> u32 {
        self.attempt.load(Ordering::SeqCst)
    }
}
