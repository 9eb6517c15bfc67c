//! Retry and error-handling combinators for asynchronous requests
//!
//! These helpers wrap a future-producing closure and decide, based on the
//! [`ErrorKind`] of a failure, whether to wait and try again or give up.
//! Nothing runs until the returned future is polled, and dropping that
//! future cancels it: a pending wait is aborted and the closure is never
//! invoked again.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::error::{Classify, ErrorKind};

/// When and how often a failed operation is attempted again
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOptions {
    /// Kinds of failure that trigger a retry; every other kind is final
    pub retry_on: Vec<ErrorKind>,
    /// Delay between a failure and the next attempt
    pub retry_interval: Duration,
    /// Maximum number of retries after the first attempt, `None` for no limit
    pub retry_attempts: Option<u32>,
}

impl RetryOptions {
    pub fn new(retry_on: Vec<ErrorKind>, retry_interval: Duration) -> Self {
        Self {
            retry_on,
            retry_interval,
            retry_attempts: None,
        }
    }

    pub fn with_attempts(mut self, retry_attempts: u32) -> Self {
        self.retry_attempts = Some(retry_attempts);
        self
    }

    /// The attempt budget is checked before the kind of the failure
    fn should_retry(&self, kind: ErrorKind, retries: u32) -> bool {
        if let Some(max) = self.retry_attempts {
            if retries >= max {
                return false;
            }
        }
        self.retry_on.contains(&kind)
    }
}

/// Run `initiate` until it succeeds or fails with a final error
///
/// A failure whose kind is listed in `options.retry_on` is retried after
/// `options.retry_interval`, as long as the retry budget allows it. Any
/// other failure is returned immediately without another attempt. With
/// `retry_attempts: None` a retryable failure is retried forever.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use libcourier::error::{ApiError, ErrorKind};
/// use libcourier::retry::{retry, RetryOptions};
///
/// # async fn example() -> Result<(), ApiError> {
/// let options = RetryOptions::new(vec![ErrorKind::Connection], Duration::from_secs(1))
///     .with_attempts(3);
/// let value = retry(|| async { Ok::<_, ApiError>(42) }, &options).await?;
/// assert_eq!(value, 42);
/// # Ok(())
/// # }
/// ```
pub async fn retry<F, Fut, R, E>(mut initiate: F, options: &RetryOptions) -> Result<R, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<R, E>>,
    E: Classify + Display,
{
    let mut retries: u32 = 0;

    loop {
        match initiate().await {
            Ok(value) => {
                if retries > 0 {
                    debug!("Request succeeded after {} retries", retries);
                }
                return Ok(value);
            }
            Err(e) => {
                let kind = e.kind();
                if !options.should_retry(kind, retries) {
                    if retries > 0 {
                        warn!("Giving up after {} retries: {}", retries, e);
                    }
                    return Err(e);
                }

                retries = retries.saturating_add(1);
                warn!(
                    "Retryable {:?} error (retry {}): {}. Retrying in {:?}...",
                    kind, retries, e, options.retry_interval
                );
                sleep(options.retry_interval).await;
            }
        }
    }
}

/// Turn failures of the given kinds into values; propagate all others
pub async fn handle_error<Fut, T, E, H>(future: Fut, kinds: &[ErrorKind], handler: H) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
    E: Classify,
    H: FnOnce(E) -> T,
{
    match future.await {
        Ok(value) => Ok(value),
        Err(e) if kinds.contains(&e.kind()) => Ok(handler(e)),
        Err(e) => Err(e),
    }
}

/// Log a failure and yield nothing in its place
///
/// Diagnostics only: a failure never becomes `Some`, so anything
/// downstream still sees that no value was produced.
pub async fn log_error<Fut, T, E>(future: Fut) -> Option<T>
where
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    match future.await {
        Ok(value) => Some(value),
        Err(e) => {
            error!("{}", e);
            None
        }
    }
}

/// Ignore new requests while one is already in flight
///
/// Requests are neither queued nor merged: a call to [`ExhaustGate::run`]
/// made while another is running returns `None` without invoking its
/// closure. Clones share the same gate.
#[derive(Debug, Clone, Default)]
pub struct ExhaustGate {
    busy: Arc<AtomicBool>,
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ExhaustGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub async fn run<F, Fut, T>(&self, initiate: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Request ignored, another one is in flight");
            return None;
        }
        let _guard = BusyGuard(&self.busy);
        Some(initiate().await)
    }
}
