//! Retry logic with capped exponential backoff and jitter.
//!
//! Retries live below the reconciler: [`RetryingRemote`] wraps any
//! [`RemoteApi`] and retries throttling and transient errors, so the
//! reconciler can treat the collaborator as already retry-safe.

use crate::remote::{
    CancelToken, Describe, RemoteApi, RemoteError, RemoteObject, RemoteResult,
};
use crate::tags::TagDiff;
use rand::Rng;
use std::thread;
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Draw each delay uniformly from `[0, capped delay]`
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(20),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings.
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_factor,
            ..Default::default()
        }
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Upper bound of the delay for a given attempt number (0-indexed).
    pub fn capped_delay(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Delay to wait before the next attempt, jittered if configured.
    pub fn delay_for_attempt<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let cap = self.capped_delay(attempt);
        if !self.jitter || cap.is_zero() {
            return cap;
        }
        Duration::from_secs_f64(rng.gen_range(0.0..=cap.as_secs_f64()))
    }
}

/// Callback trait for retry progress notifications.
pub trait RetryCallback: Send + Sync {
    /// Called when an operation is being retried.
    ///
    /// # Arguments
    /// * `operation` - Remote operation name
    /// * `attempt` - Current attempt number (1-indexed)
    /// * `max_attempts` - Maximum number of attempts
    /// * `reason` - What triggered the retry
    /// * `delay` - Time until next attempt
    fn on_retry(
        &self,
        operation: &str,
        attempt: u32,
        max_attempts: u32,
        reason: &str,
        delay: Duration,
    );
}

/// Callback that logs retries at warn level.
pub struct LogCallback;

impl RetryCallback for LogCallback {
    fn on_retry(
        &self,
        operation: &str,
        attempt: u32,
        max_attempts: u32,
        reason: &str,
        delay: Duration,
    ) {
        log::warn!(
            "{operation}: attempt {attempt}/{max_attempts} failed: {reason}. Retrying in {}ms",
            delay.as_millis()
        );
    }
}

/// What to do with one attempt's outcome.
enum Verdict<T> {
    Done(RemoteResult<T>),
    Retry(RemoteResult<T>, String),
}

/// Execute an operation with retry logic.
///
/// `classify` decides whether an outcome is final or worth another try.
/// Sleeps never outlast the cancel token; once it fires the last outcome
/// is returned, or a cancellation error if the operation never completed.
fn retry_loop<T, F, C>(
    config: &RetryConfig,
    callback: &dyn RetryCallback,
    operation: &str,
    cancel: &CancelToken,
    mut attempt_fn: F,
    classify: C,
) -> RemoteResult<T>
where
    F: FnMut() -> RemoteResult<T>,
    C: Fn(RemoteResult<T>) -> Verdict<T>,
{
    let mut rng = rand::thread_rng();
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(RemoteError::cancelled());
        }

        let (outcome, reason) = match classify(attempt_fn()) {
            Verdict::Done(outcome) => return outcome,
            Verdict::Retry(outcome, reason) => (outcome, reason),
        };

        if attempt + 1 >= max_attempts {
            return outcome;
        }

        let mut delay = config.delay_for_attempt(attempt, &mut rng);
        if let Some(remaining) = cancel.remaining() {
            delay = delay.min(remaining);
        }
        callback.on_retry(operation, attempt + 1, max_attempts, &reason, delay);
        thread::sleep(delay);

        if cancel.is_cancelled() {
            return Err(RemoteError::cancelled());
        }
        attempt += 1;
    }
}

fn retry_errors<T>(outcome: RemoteResult<T>) -> Verdict<T> {
    match outcome {
        Err(e) if e.is_retryable() => {
            let reason = e.to_string();
            Verdict::Retry(Err(e), reason)
        }
        other => Verdict::Done(other),
    }
}

fn retry_errors_and_not_found(outcome: RemoteResult<Describe>) -> Verdict<Describe> {
    match outcome {
        Ok(Describe::NotFound) => Verdict::Retry(
            Ok(Describe::NotFound),
            "new entity not visible yet".to_string(),
        ),
        other => retry_errors(other),
    }
}

/// A [`RemoteApi`] decorator that retries transient failures.
pub struct RetryingRemote<R> {
    inner: R,
    config: RetryConfig,
    callback: Box<dyn RetryCallback>,
}

impl<R: RemoteApi> RetryingRemote<R> {
    pub fn new(inner: R, config: RetryConfig) -> Self {
        Self {
            inner,
            config,
            callback: Box::new(LogCallback),
        }
    }

    /// Replace the retry callback.
    pub fn with_callback(mut self, callback: Box<dyn RetryCallback>) -> Self {
        self.callback = callback;
        self
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

impl<R: RemoteApi> RemoteApi for RetryingRemote<R> {
    fn describe(
        &self,
        resource_type: &str,
        identifiers: &[String],
        cancel: &CancelToken,
    ) -> RemoteResult<Describe> {
        retry_loop(
            &self.config,
            self.callback.as_ref(),
            "describe",
            cancel,
            || self.inner.describe(resource_type, identifiers, cancel),
            retry_errors,
        )
    }

    fn describe_new(
        &self,
        resource_type: &str,
        identifiers: &[String],
        cancel: &CancelToken,
    ) -> RemoteResult<Describe> {
        retry_loop(
            &self.config,
            self.callback.as_ref(),
            "describe",
            cancel,
            || self.inner.describe_new(resource_type, identifiers, cancel),
            retry_errors_and_not_found,
        )
    }

    fn create(
        &self,
        resource_type: &str,
        request: &RemoteObject,
        cancel: &CancelToken,
    ) -> RemoteResult<Vec<String>> {
        retry_loop(
            &self.config,
            self.callback.as_ref(),
            "create",
            cancel,
            || self.inner.create(resource_type, request, cancel),
            retry_errors,
        )
    }

    fn update(
        &self,
        resource_type: &str,
        identifiers: &[String],
        request: &RemoteObject,
        cancel: &CancelToken,
    ) -> RemoteResult<()> {
        retry_loop(
            &self.config,
            self.callback.as_ref(),
            "update",
            cancel,
            || self.inner.update(resource_type, identifiers, request, cancel),
            retry_errors,
        )
    }

    fn delete(
        &self,
        resource_type: &str,
        identifiers: &[String],
        cancel: &CancelToken,
    ) -> RemoteResult<Describe> {
        retry_loop(
            &self.config,
            self.callback.as_ref(),
            "delete",
            cancel,
            || self.inner.delete(resource_type, identifiers, cancel),
            retry_errors,
        )
    }

    fn update_tags(
        &self,
        resource_type: &str,
        identifiers: &[String],
        changes: &TagDiff,
        cancel: &CancelToken,
    ) -> RemoteResult<()> {
        retry_loop(
            &self.config,
            self.callback.as_ref(),
            "update_tags",
            cancel,
            || {
                self.inner
                    .update_tags(resource_type, identifiers, changes, cancel)
            },
            retry_errors,
        )
    }
}
