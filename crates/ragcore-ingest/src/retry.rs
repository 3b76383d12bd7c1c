use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::IngestError;

/// Exponential backoff for the one driver call per run that can fail transiently (§4.1 ambient
/// supplement). Non-retriable errors propagate on the first attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

pub async fn retry_if_transient<T, F, Fut>(
    policy: RetryPolicy,
    mut attempt: F,
) -> Result<T, IngestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, IngestError>>,
{
    let mut backoff = policy.initial_backoff;
    let mut tries = 0u32;
    loop {
        tries += 1;
        match attempt().await {
            Ok(v) => return Ok(v),
            Err(e) if e.kind().is_retriable() && tries < policy.max_attempts => {
                warn!(attempt = tries, error = %e, "retriable error, backing off");
                tokio::time::sleep(backoff).await;
                backoff = std::cmp::min(backoff * 2, policy.max_backoff);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_retriable_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            max_attempts: 5,
        };
        let result = retry_if_transient(policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(IngestError::Driver(ragcore_driver::DriverError::RetriableTransport(
                        "timeout".into(),
                    )))
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retriable_error_fails_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();
        let err = retry_if_transient(policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(IngestError::InvalidConfig("bad".into())) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, IngestError::InvalidConfig(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
