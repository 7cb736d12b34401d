#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use shard_market::upload::{RetryError, RetryPolicy};
    use shard_market::UploadError;
    use tokio_util::sync::CancellationToken;

    fn transient() -> RetryError {
        RetryError::Transient(UploadError::HostTimeout("host".to_string()))
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let policy = RetryPolicy::immediate(Duration::from_secs(1));
        let scope = CancellationToken::new();

        let value = policy
            .run(&scope, "flaky", |attempt| async move {
                if attempt < 3 {
                    Err(transient())
                } else {
                    Ok(attempt)
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn test_permanent_error_stops_immediately() {
        let policy = RetryPolicy::immediate(Duration::from_secs(1));
        let scope = CancellationToken::new();
        let calls = AtomicUsize::new(0);

        let result: Result<(), _> = policy
            .run(&scope, "fatal", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(RetryError::Permanent(UploadError::HostsExhausted)) }
            })
            .await;
        assert!(matches!(
            result,
            Err(RetryError::Permanent(UploadError::HostsExhausted))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempt_cap_returns_last_error() {
        let policy = RetryPolicy::immediate(Duration::from_secs(10)).with_max_attempts(4);
        let scope = CancellationToken::new();
        let calls = AtomicUsize::new(0);

        let result: Result<(), _> = policy
            .run(&scope, "capped", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(transient()) }
            })
            .await;
        assert!(matches!(
            result,
            Err(RetryError::Transient(UploadError::HostTimeout(_)))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_elapsed_budget_ends_run() {
        let policy = RetryPolicy::new(
            Duration::from_millis(20),
            Duration::from_millis(20),
            Duration::from_millis(100),
        );
        let scope = CancellationToken::new();
        let started = tokio::time::Instant::now();

        let result: Result<(), _> = policy.run(&scope, "slow", |_| async { Err(transient()) }).await;
        assert!(matches!(result, Err(RetryError::Transient(_))));
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_cancelled_scope_skips_attempts() {
        let policy = RetryPolicy::immediate(Duration::from_secs(1));
        let scope = CancellationToken::new();
        scope.cancel();
        let calls = AtomicUsize::new(0);

        let result: Result<(), _> = policy
            .run(&scope, "cancelled", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;
        assert!(matches!(
            result,
            Err(RetryError::Permanent(UploadError::Cancelled))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_during_pause_wakes_run() {
        let policy = RetryPolicy::new(
            Duration::from_secs(30),
            Duration::from_secs(30),
            Duration::from_secs(60),
        );
        let scope = CancellationToken::new();
        let canceller = scope.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let started = tokio::time::Instant::now();
        let result: Result<(), _> = policy.run(&scope, "paused", |_| async { Err(transient()) }).await;
        assert!(matches!(
            result,
            Err(RetryError::Permanent(UploadError::Cancelled))
        ));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
