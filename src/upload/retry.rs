use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::UploadError;
use crate::logger::LOGGER;

/// Outcome of one failed attempt, or of a whole retry run.
#[derive(Debug)]
pub enum RetryError {
    /// Worth another attempt. Returned by [`RetryPolicy::run`] once the
    /// budget is spent, carrying the last error.
    Transient(UploadError),
    /// Stops the run immediately.
    Permanent(UploadError),
}

impl RetryError {
    pub fn into_inner(self) -> UploadError {
        match self {
            RetryError::Transient(e) | RetryError::Permanent(e) => e,
        }
    }
}

/// Doubling backoff bounded by total elapsed time and, optionally, attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub max_elapsed: Duration,
    pub max_attempts: Option<usize>,
}

impl RetryPolicy {
    pub fn new(initial_interval: Duration, max_interval: Duration, max_elapsed: Duration) -> Self {
        Self {
            initial_interval,
            max_interval,
            max_elapsed,
            max_attempts: None,
        }
    }

    /// Per-shard contract negotiation.
    pub fn negotiation(config: &Config) -> Self {
        Self::new(
            Duration::from_secs(1),
            Duration::from_secs(30),
            config.negotiation_timeout(),
        )
    }

    /// Storage confirmation polling over `window`.
    pub fn confirmation(window: Duration) -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(5 * 60), window)
    }

    /// Next to no waiting between attempts.
    pub fn immediate(max_elapsed: Duration) -> Self {
        Self::new(Duration::from_millis(1), Duration::from_millis(5), max_elapsed)
    }

    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Runs `op` until it succeeds, fails permanently, or the budget runs out.
    /// `scope` is checked before every attempt and during every pause; an
    /// attempt already running is never interrupted.
    pub async fn run<T, F, Fut>(
        &self,
        scope: &CancellationToken,
        label: &str,
        mut op: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, RetryError>>,
    {
        let started = Instant::now();
        let mut backoff = self.initial_interval;
        let mut attempt = 0;

        loop {
            if scope.is_cancelled() {
                return Err(RetryError::Permanent(UploadError::Cancelled));
            }
            attempt += 1;

            let err = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(RetryError::Permanent(e)) => return Err(RetryError::Permanent(e)),
                Err(RetryError::Transient(e)) => e,
            };

            let elapsed = started.elapsed();
            let attempts_left = self.max_attempts.map_or(true, |max| attempt < max);
            if elapsed >= self.max_elapsed || !attempts_left {
                LOGGER.debug(&format!("{}: giving up after {} attempts", label, attempt));
                return Err(RetryError::Transient(err));
            }

            let remaining = self.max_elapsed - elapsed;
            let pause = backoff.min(remaining).min(self.max_interval);
            LOGGER.debug(&format!(
                "{}: attempt {} failed ({}), retrying in {:?}",
                label, attempt, err, pause
            ));
            tokio::select! {
                _ = scope.cancelled() => return Err(RetryError::Permanent(UploadError::Cancelled)),
                _ = sleep(pause) => {}
            }
            backoff = (backoff * 2).min(self.max_interval);
        }
    }
}
