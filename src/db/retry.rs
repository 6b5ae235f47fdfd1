use std::{future::Future, time::Duration};

use tracing::warn;

use super::StoreError;

/// Timeout and retry budget applied to every store call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            retries: 1,
        }
    }
}

/// Runs `call` under the policy's timeout. Transient failures (including the
/// timeout itself) are retried up to `policy.retries` times; anything else is
/// returned immediately.
pub async fn run<T, F, Fut>(policy: &RetryPolicy, op: &'static str, mut call: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0;
    loop {
        let result = match tokio::time::timeout(policy.timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(policy.timeout)),
        };

        match result {
            Err(err) if err.is_transient() && attempt < policy.retries => {
                attempt += 1;
                warn!(op, attempt, error = %err, "transient store failure, retrying");
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::db::Taken;

    #[tokio::test]
    async fn transient_failure_is_retried_once() {
        let calls = &AtomicU32::new(0);
        let result = run(&RetryPolicy::default(), "test", || async move {
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 => Err(StoreError::Unavailable("busy".to_owned())),
                _ => Ok(7),
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = run(&RetryPolicy::default(), "test", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable("busy".to_owned()))
        })
        .await;

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = run(&RetryPolicy::default(), "test", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Conflict(Taken::Username))
        })
        .await;

        assert!(matches!(result, Err(StoreError::Conflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out_as_transient() {
        let policy = RetryPolicy {
            timeout: Duration::from_millis(50),
            retries: 0,
        };
        let result: Result<(), _> = run(&policy, "test", || async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.is_transient());
        assert!(matches!(err, StoreError::Timeout(_)));
    }
}
