//! Bounded polling.
//!
//! [`poll_until`] re-evaluates a check at a fixed interval until it reports
//! [`Check::Ready`] or the deadline passes. A check that *errors* ends the
//! poll immediately: only "not yet" is retried, never a failure.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::error::{HarnessError, Result};

/// Interval and outer bound for one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollSettings {
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Result of evaluating a polled predicate once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check<T> {
    Ready(T),
    /// Not met yet. Carries a description of each unmet predicate.
    Pending(Vec<String>),
}

impl<T> Check<T> {
    pub fn pending(reason: impl Into<String>) -> Self {
        Check::Pending(vec![reason.into()])
    }
}

/// Evaluate `check` every `settings.interval` until it is ready.
///
/// The check always runs once more at the deadline itself, so a predicate
/// that becomes true exactly at the deadline counts as success. On timeout the
/// error names `what` and the unmet predicates of the last attempt. A zero
/// interval is rejected rather than spinning.
pub async fn poll_until<T, F, Fut>(what: &str, settings: PollSettings, mut check: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Check<T>>>,
{
    if settings.interval.is_zero() {
        return Err(HarnessError::InvalidConfig {
            details: format!("poll interval for {what} must be greater than zero"),
        });
    }
    let started = Instant::now();
    let deadline = started
        .checked_add(settings.timeout)
        .ok_or_else(|| HarnessError::InvalidConfig {
            details: format!("poll timeout {:?} for {what} is out of range", settings.timeout),
        })?;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match check().await? {
            Check::Ready(value) => {
                debug!(what, attempt, elapsed_ms = started.elapsed().as_millis() as u64, "poll satisfied");
                return Ok(value);
            }
            Check::Pending(unmet) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(HarnessError::Timeout {
                        what: what.to_string(),
                        elapsed: now - started,
                        unmet,
                    });
                }
                debug!(what, attempt, ?unmet, "poll not satisfied yet");
                tokio::time::sleep_until((now + settings.interval).min(deadline)).await;
            }
        }
    }
}
