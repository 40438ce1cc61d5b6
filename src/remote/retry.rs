use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

/// Failure reported by a remote service implementation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    /// Worth retrying: connection refused, timeout, 5xx, throttling.
    #[error("transient failure: {0}")]
    Transient(String),
    /// Retrying will not help: bad request, unparseable response.
    #[error("service failure: {0}")]
    Fatal(String),
    /// The caller's deadline passed before the call could complete.
    #[error("deadline exceeded during {0}")]
    DeadlineExceeded(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per remote call, first try included.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    /// No sleeping between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Exponential backoff before retry number `retry` (1-based).
    fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

// ---------------------------------------------------------------------------
// Per-invocation call context
// ---------------------------------------------------------------------------

/// Retry counters, deadline and warnings of one remote invocation. Created
/// fresh for every call and never shared, so concurrent invocations cannot
/// observe each other's state.
#[derive(Debug)]
pub struct CallContext {
    policy: RetryPolicy,
    deadline: Option<Instant>,
    attempts: u32,
    warnings: Vec<String>,
}

impl CallContext {
    pub fn new(policy: RetryPolicy, timeout: Option<Duration>) -> Self {
        Self {
            policy,
            deadline: timeout.map(|t| Instant::now() + t),
            attempts: 0,
            warnings: Vec::new(),
        }
    }

    /// Attempts made so far across every call in this context.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn into_warnings(self) -> Vec<String> {
        self.warnings
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{message}");
        self.warnings.push(message);
    }

    fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Run `op`, retrying transient failures up to the policy's attempt
    /// limit. Fatal failures return immediately.
    pub fn call<T>(
        &mut self,
        what: &str,
        mut op: impl FnMut() -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let mut attempt = 0;
        loop {
            if self.remaining() == Some(Duration::ZERO) {
                return Err(ServiceError::DeadlineExceeded(what.to_string()));
            }
            attempt += 1;
            self.attempts += 1;
            match op() {
                Ok(value) => return Ok(value),
                Err(ServiceError::Transient(msg)) if attempt < self.policy.max_attempts => {
                    let mut pause = self.policy.backoff(attempt);
                    if let Some(left) = self.remaining() {
                        pause = pause.min(left);
                    }
                    log::debug!(
                        "{what}: attempt {attempt}/{} failed ({msg}); retrying in {pause:?}",
                        self.policy.max_attempts
                    );
                    if !pause.is_zero() {
                        thread::sleep(pause);
                    }
                }
                Err(ServiceError::Transient(msg)) => {
                    return Err(ServiceError::Transient(format!(
                        "{what}: {msg} (after {attempt} attempts)"
                    )))
                }
                Err(other) => return Err(other),
            }
        }
    }
}
