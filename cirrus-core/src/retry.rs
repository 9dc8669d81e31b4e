//! Retry Policy - Bounded-duration retry of a single remote call
//!
//! Errors are classified as retryable or fatal by matching the vendor error
//! code and message against a static table declared at each call site.

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use tokio::time::Instant;

use crate::cancel::Cancellation;
use crate::error::{ErrorKind, RemoteError};
use crate::timeouts::deadline_after;

/// Matches a vendor error by code and message substring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorMatcher {
    pub code: &'static str,
    /// Substring the message must contain; empty matches any message
    pub message_contains: &'static str,
}

impl ErrorMatcher {
    pub const fn new(code: &'static str, message_contains: &'static str) -> Self {
        Self {
            code,
            message_contains,
        }
    }

    /// Match on the code alone
    pub const fn code(code: &'static str) -> Self {
        Self::new(code, "")
    }

    pub fn matches(&self, err: &RemoteError) -> bool {
        err.code == self.code && err.message.contains(self.message_contains)
    }
}

/// Static table of error matchers
#[derive(Debug, Clone, Copy)]
pub struct ErrorTable(&'static [ErrorMatcher]);

impl ErrorTable {
    pub const fn new(matchers: &'static [ErrorMatcher]) -> Self {
        Self(matchers)
    }

    pub fn matches(&self, err: &RemoteError) -> bool {
        self.0.iter().any(|m| m.matches(err))
    }

    /// Matching errors are retryable, everything else is fatal
    pub fn classify(&self, err: RemoteError) -> Attempt {
        if self.matches(&err) {
            Attempt::Retryable(ErrorKind::Transient(err))
        } else {
            Attempt::Fatal(ErrorKind::Request(err))
        }
    }
}

/// Throttling codes used across the vendor's services
pub const THROTTLING: &[ErrorMatcher] = &[
    ErrorMatcher::code("ThrottlingException"),
    ErrorMatcher::code("Throttling"),
    ErrorMatcher::code("RequestLimitExceeded"),
    ErrorMatcher::code("TooManyRequestsException"),
];

/// Failed outcome of one attempt
#[derive(Debug)]
pub enum Attempt {
    /// Try again while budget remains
    Retryable(ErrorKind),
    /// Stop immediately
    Fatal(ErrorKind),
}

/// Retries an operation within a fixed time budget
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    budget: Duration,
    min_delay: Duration,
    max_delay: Duration,
    final_attempt: bool,
}

impl RetryPolicy {
    pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(500);
    pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

    pub fn new(budget: Duration) -> Self {
        Self {
            budget,
            min_delay: Self::DEFAULT_MIN_DELAY,
            max_delay: Self::DEFAULT_MAX_DELAY,
            final_attempt: true,
        }
    }

    /// Make one last unconditional attempt once the budget is exhausted.
    ///
    /// This mirrors a vendor eventual-consistency workaround and is on by default.
    pub fn with_final_attempt(mut self, enabled: bool) -> Self {
        self.final_attempt = enabled;
        self
    }

    /// Run `op` until it succeeds, fails fatally, or the budget runs out
    pub async fn retry<T, F, Fut>(&self, cancel: &Cancellation, mut op: F) -> Result<T, ErrorKind>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Attempt>>,
    {
        let deadline = deadline_after(self.budget);
        let mut delay = self.min_delay;
        let mut attempts: u32 = 0;

        loop {
            cancel.check()?;
            attempts += 1;

            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(Attempt::Fatal(err)) => return Err(err),
                Err(Attempt::Retryable(err)) => err,
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || remaining < self.min_delay {
                if !self.final_attempt {
                    return Err(err);
                }
                warn!(
                    "Retry budget of {:?} exhausted after {} attempts ({}), making one final attempt",
                    self.budget, attempts, err
                );
                cancel.check()?;
                return match op().await {
                    Ok(value) => Ok(value),
                    Err(Attempt::Fatal(err) | Attempt::Retryable(err)) => Err(err),
                };
            }

            let sleep_for = delay.min(remaining);
            debug!(
                "Attempt {} failed with retryable error ({}), retrying in {:?}",
                attempts, err, sleep_for
            );
            cancel.sleep(sleep_for).await?;
            delay = delay.saturating_mul(2).min(self.max_delay);
        }
    }

    /// Run a remote call, classifying its errors with `table`
    pub async fn retry_remote<T, F, Fut>(
        &self,
        table: &ErrorTable,
        cancel: &Cancellation,
        mut op: F,
    ) -> Result<T, ErrorKind>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        self.retry(cancel, || {
            let call = op();
            async move { call.await.map_err(|e| table.classify(e)) }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancellation;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    const INSTANCE_PROFILE: ErrorTable = ErrorTable::new(&[
        ErrorMatcher::new("ValidationException", "Invalid InstanceProfile:"),
        ErrorMatcher::new("AccessDeniedException", "Failed to authorize instance profile"),
    ]);

    fn not_visible() -> RemoteError {
        RemoteError::new("ValidationException", "Invalid InstanceProfile: EMR_EC2_Role")
    }

    #[test]
    fn matcher_requires_code_and_substring() {
        assert!(INSTANCE_PROFILE.matches(&not_visible()));
        assert!(!INSTANCE_PROFILE.matches(&RemoteError::new(
            "ValidationException",
            "Invalid release label"
        )));
        assert!(!INSTANCE_PROFILE.matches(&RemoteError::new(
            "InternalFailure",
            "Invalid InstanceProfile:"
        )));
        assert!(ErrorTable::new(THROTTLING).matches(&RemoteError::new("Throttling", "Rate exceeded")));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_then_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(Duration::from_secs(30));

        let result = policy
            .retry_remote(&INSTANCE_PROFILE, &Cancellation::never(), || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(not_visible())
                    } else {
                        Ok("j-2AXXXXXXGAPLF")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "j-2AXXXXXXGAPLF");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_budget_retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(Duration::MAX);

        let result = policy
            .retry_remote(&INSTANCE_PROFILE, &Cancellation::never(), || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 8 {
                        Err(not_visible())
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn n_minus_one_transient_failures() {
        for n in 1..=5u32 {
            let calls = Arc::new(AtomicU32::new(0));
            let policy = RetryPolicy::new(Duration::from_secs(120));

            let result = policy
                .retry_remote(&INSTANCE_PROFILE, &Cancellation::never(), || {
                    let calls = calls.clone();
                    async move {
                        if calls.fetch_add(1, Ordering::SeqCst) + 1 < n {
                            Err(not_visible())
                        } else {
                            Ok(n)
                        }
                    }
                })
                .await;

            assert_eq!(result.unwrap(), n);
            assert_eq!(calls.load(Ordering::SeqCst), n);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(Duration::from_secs(30));

        let result: Result<(), _> = policy
            .retry_remote(&INSTANCE_PROFILE, &Cancellation::never(), || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(RemoteError::new("ValidationException", "Invalid release label"))
                }
            })
            .await;

        assert!(matches!(result, Err(ErrorKind::Request(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    // Documented quirk: one unconditional attempt once the budget is spent.
    #[tokio::test(start_paused = true)]
    async fn final_attempt_after_budget_exhausted() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();
        let policy = RetryPolicy::new(Duration::from_secs(5));

        // Five attempts fit in a 5s budget; the sixth is the final one
        let result = policy
            .retry_remote(&INSTANCE_PROFILE, &Cancellation::never(), || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 5 {
                        Err(not_visible())
                    } else {
                        Ok("late")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "late");
        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn final_attempt_outcome_is_returned_verbatim() {
        let policy = RetryPolicy::new(Duration::from_secs(2));

        let result: Result<(), _> = policy
            .retry_remote(&INSTANCE_PROFILE, &Cancellation::never(), || async {
                Err(not_visible())
            })
            .await;

        match result {
            Err(ErrorKind::Transient(e)) => assert_eq!(e, not_visible()),
            other => panic!("Expected Transient, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn no_final_attempt_when_disabled() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();
        let policy = RetryPolicy::new(Duration::from_secs(5)).with_final_attempt(false);

        let result: Result<(), _> = policy
            .retry_remote(&INSTANCE_PROFILE, &Cancellation::never(), || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(not_visible())
                }
            })
            .await;

        assert!(matches!(result, Err(ErrorKind::Transient(_))));
        let elapsed = start.elapsed();
        assert!(elapsed <= Duration::from_secs(5));

        // Backoff of 0.5s, 1s and 2s, then a sleep capped at the last 1.5s of budget
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_retrying() {
        let calls = Arc::new(AtomicU32::new(0));
        let (handle, cancel) = cancellation();
        let policy = RetryPolicy::new(Duration::from_secs(600));

        let task = tokio::spawn({
            let calls = calls.clone();
            async move {
                policy
                    .retry_remote(&INSTANCE_PROFILE, &cancel, || {
                        let calls = calls.clone();
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            Err::<(), _>(not_visible())
                        }
                    })
                    .await
            }
        });

        tokio::time::sleep(Duration::from_secs(3)).await;
        handle.cancel();
        let result = task.await.unwrap();

        assert!(matches!(result, Err(ErrorKind::Cancelled)));
        let made = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), made);
    }
}
