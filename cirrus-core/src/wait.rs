//! Wait-For-State Engine - Poll a refresh function until a target status
//!
//! The deadline is fixed when the wait starts. Poll intervals grow from a
//! minimum to a cap and never exceed the remaining budget.

use std::future::Future;
use std::time::Duration;

use log::debug;
use tokio::time::Instant;

use crate::cancel::Cancellation;
use crate::error::ErrorKind;
use crate::refresh::{NOT_FOUND_STATUS, Observed};
use crate::timeouts::deadline_after;

/// Polls a refresh function until the observed status reaches a target set
#[derive(Debug, Clone)]
pub struct StateWaiter {
    pending: Vec<String>,
    target: Vec<String>,
    /// Statuses that count as disappearance when waiting for deletion
    absent: Vec<String>,
    timeout: Duration,
    delay: Duration,
    min_interval: Duration,
    max_interval: Duration,
    not_found_checks: u32,
}

impl StateWaiter {
    pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(2);
    pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(10);
    pub const DEFAULT_NOT_FOUND_CHECKS: u32 = 20;

    /// An empty `target` waits for the object to disappear.
    pub fn new(pending: &[&str], target: &[&str]) -> Self {
        Self {
            pending: pending.iter().map(|s| s.to_string()).collect(),
            target: target.iter().map(|s| s.to_string()).collect(),
            absent: Vec::new(),
            timeout: Duration::from_secs(20 * 60),
            delay: Duration::ZERO,
            min_interval: Self::DEFAULT_MIN_INTERVAL,
            max_interval: Self::DEFAULT_MAX_INTERVAL,
            not_found_checks: Self::DEFAULT_NOT_FOUND_CHECKS,
        }
    }

    pub fn absent(mut self, statuses: &[&str]) -> Self {
        self.absent = statuses.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sleep before the first poll
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self.max_interval = self.max_interval.max(interval);
        self
    }

    pub fn max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval.max(self.min_interval);
        self
    }

    /// Consecutive not-found observations tolerated while waiting for a target
    pub fn not_found_checks(mut self, checks: u32) -> Self {
        self.not_found_checks = checks;
        self
    }

    fn is_target(&self, status: &str) -> bool {
        self.target.iter().any(|s| s == status)
    }

    fn is_pending(&self, status: &str) -> bool {
        self.pending.iter().any(|s| s == status)
    }

    fn is_absent(&self, status: &str) -> bool {
        self.absent.iter().any(|s| s == status)
    }

    fn timeout_error(&self, last_status: Option<String>) -> ErrorKind {
        ErrorKind::WaitTimeout {
            last_status,
            target: self.target.clone(),
            timeout: self.timeout,
        }
    }

    /// Run the wait.
    ///
    /// Returns the object once its status is in the target set, or `None`
    /// when waiting for disappearance and the object is gone.
    pub async fn wait<T, F, Fut>(
        &self,
        cancel: &Cancellation,
        mut refresh: F,
    ) -> Result<Option<T>, ErrorKind>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Observed<T>, ErrorKind>>,
    {
        let deadline = deadline_after(self.timeout);
        let mut interval = self.min_interval;
        let mut last_status: Option<String> = None;
        let mut not_found: u32 = 0;

        if !self.delay.is_zero() {
            cancel.sleep(self.delay.min(self.timeout)).await?;
        }

        loop {
            cancel.check()?;

            match refresh().await? {
                Observed::Present { object, status, .. } if self.is_target(&status) => {
                    debug!("Reached target state '{}'", status);
                    return Ok(Some(object));
                }
                Observed::Present { status, .. }
                    if self.target.is_empty() && self.is_absent(&status) =>
                {
                    debug!("Object reached '{}', treating as gone", status);
                    return Ok(None);
                }
                Observed::Absent if self.target.is_empty() => {
                    debug!("Object no longer exists");
                    return Ok(None);
                }
                Observed::Absent => {
                    not_found += 1;
                    if not_found > self.not_found_checks {
                        return Err(ErrorKind::UnexpectedStatus {
                            status: NOT_FOUND_STATUS.to_string(),
                            reason: Some(format!(
                                "object not found after {} checks",
                                self.not_found_checks
                            )),
                        });
                    }
                    debug!("Object not found yet ({}/{})", not_found, self.not_found_checks);
                    last_status = Some(NOT_FOUND_STATUS.to_string());
                }
                Observed::Present { status, reason, .. } => {
                    if !self.is_pending(&status) {
                        return Err(ErrorKind::UnexpectedStatus { status, reason });
                    }
                    debug!("Still in state '{}'", status);
                    not_found = 0;
                    last_status = Some(status);
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining < self.min_interval {
                if !remaining.is_zero() {
                    cancel.sleep(remaining).await?;
                }
                return Err(self.timeout_error(last_status));
            }

            cancel.sleep(interval.min(remaining)).await?;
            interval = interval.saturating_mul(2).min(self.max_interval);
        }
    }
}
