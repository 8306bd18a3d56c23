//! # Retriable Task Executor
//!
//! Wraps a fallible asynchronous operation with a bounded, fixed-delay retry
//! budget. Whether a particular failure is retried is decided per failure:
//!
//! 1. the failure hook (if any) runs to completion exactly once, and may call
//!    [`RetryContext::prevent_retries`] or mutate shared state such as a
//!    session cache,
//! 2. the retry predicate is consulted (by default the error's own
//!    classification),
//! 3. the remaining budget is checked.
//!
//! With `max_retries = N` the operation is invoked at most `N + 1` times.

use crate::config::RetryPolicy;
use crate::orchestration::error_classifier::ClassifiedError;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Errors that know whether they are worth another attempt
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for ClassifiedError {
    fn is_retryable(&self) -> bool {
        self.retryable
    }
}

/// Ephemeral state of one invocation sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryContext {
    attempt: u32,
    max_retries: u32,
    retries_prevented: bool,
}

impl RetryContext {
    fn new(max_retries: u32) -> Self {
        Self {
            attempt: 0,
            max_retries,
            retries_prevented: false,
        }
    }

    /// 1-based number of the invocation currently running or just failed
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Stop after the current failure regardless of remaining budget
    pub fn prevent_retries(&mut self) {
        self.retries_prevented = true;
    }

    pub fn retries_prevented(&self) -> bool {
        self.retries_prevented
    }

    pub fn has_budget(&self) -> bool {
        self.attempt <= self.max_retries
    }
}

type FailureHook<'a, E> = Box<dyn FnMut(&E, &mut RetryContext) + Send + 'a>;
type RetryPredicate<'a, E> = Box<dyn Fn(&E) -> bool + Send + Sync + 'a>;

pub struct RetriableTask<'a, E> {
    name: String,
    max_retries: u32,
    delay: Duration,
    on_failure: Option<FailureHook<'a, E>>,
    retry_if: Option<RetryPredicate<'a, E>>,
}

impl<'a, E> RetriableTask<'a, E>
where
    E: Retryable + Display,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_retries: 0,
            delay: Duration::ZERO,
            on_failure: None,
            retry_if: None,
        }
    }

    pub fn from_policy(name: impl Into<String>, policy: &RetryPolicy) -> Self {
        Self::new(name)
            .with_max_retries(policy.max_retries)
            .with_delay(policy.delay())
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Hook run exactly once per failure, before the retry decision
    pub fn on_failure<H>(mut self, hook: H) -> Self
    where
        H: FnMut(&E, &mut RetryContext) + Send + 'a,
    {
        self.on_failure = Some(Box::new(hook));
        self
    }

    /// Override the default predicate (`Retryable::is_retryable`)
    pub fn retry_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'a,
    {
        self.retry_if = Some(Box::new(predicate));
        self
    }

    pub async fn execute<T, F, Fut>(mut self, mut operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut context = RetryContext::new(self.max_retries);

        loop {
            context.attempt += 1;
            let error = match operation(context.attempt).await {
                Ok(value) => {
                    if context.attempt > 1 {
                        debug!(task = %self.name, attempt = context.attempt, "Retriable task succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if let Some(hook) = self.on_failure.as_mut() {
                hook(&error, &mut context);
            }

            let retryable = match &self.retry_if {
                Some(predicate) => predicate(&error),
                None => error.is_retryable(),
            };

            if !retryable || context.retries_prevented() || !context.has_budget() {
                warn!(
                    task = %self.name,
                    attempt = context.attempt,
                    max_retries = self.max_retries,
                    retryable = retryable,
                    retries_prevented = context.retries_prevented(),
                    error = %error,
                    "Retriable task failed"
                );
                return Err(error);
            }

            debug!(
                task = %self.name,
                attempt = context.attempt,
                delay_ms = self.delay.as_millis() as u64,
                error = %error,
                "Retrying task after failure"
            );
            tokio::time::sleep(self.delay).await;
        }
    }
}
