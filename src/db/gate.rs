//! Availability gate for the store's query capability.
//!
//! The query engine can come up after the connection itself succeeds. The gate
//! probes it with capped exponential backoff until it answers once, then latches
//! open for the lifetime of the store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{error, info, warn};

use super::error::{Result, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 30,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl BackoffPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
        }
    }

    /// Delay following `delay`: grown by 1.5x, capped at `max_delay`.
    pub fn next_delay(&self, delay: Duration) -> Duration {
        delay.saturating_add(delay / 2).min(self.max_delay)
    }

    /// Sleeps taken when every attempt fails: one between each pair of attempts.
    pub fn schedule(&self) -> Vec<Duration> {
        let mut delays = Vec::new();
        let mut delay = self.initial_delay.min(self.max_delay);
        for _ in 1..self.max_retries {
            delays.push(delay);
            delay = self.next_delay(delay);
        }
        delays
    }
}

/// Blocks the calling thread between attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Default)]
pub struct AvailabilityGate {
    ready: AtomicBool,
}

impl AvailabilityGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Runs `probe` until it succeeds, retrying only transient failures.
    ///
    /// Returns immediately once the gate has latched. A non-transient failure is
    /// returned as-is; running out of attempts yields [`StoreError::Exhausted`].
    pub fn await_up<F>(
        &self,
        policy: &BackoffPolicy,
        sleeper: &dyn Sleeper,
        mut probe: F,
    ) -> Result<()>
    where
        F: FnMut() -> Result<()>,
    {
        if self.is_ready() {
            return Ok(());
        }

        let mut delay = policy.initial_delay.min(policy.max_delay);
        for attempt in 1..=policy.max_retries {
            match probe() {
                Ok(()) => {
                    self.ready.store(true, Ordering::Release);
                    info!("Store: Query service is ready (attempt {})", attempt);
                    return Ok(());
                }
                Err(e) if e.is_transient() => {
                    if attempt == policy.max_retries {
                        warn!(
                            "Attempt {}/{}: query service not available yet, giving up",
                            attempt, policy.max_retries
                        );
                        break;
                    }
                    warn!(
                        "Attempt {}/{}: query service not available yet. \
                         Retrying in {:.1} seconds...",
                        attempt,
                        policy.max_retries,
                        delay.as_secs_f64()
                    );
                    sleeper.sleep(delay);
                    delay = policy.next_delay(delay);
                }
                Err(e) => {
                    error!("Error checking query service: {}", e);
                    return Err(e);
                }
            }
        }

        Err(StoreError::Exhausted {
            attempts: policy.max_retries,
        })
    }
}
