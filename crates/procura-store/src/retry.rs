//! Bounded retry for idempotent collaborator reads.
//!
//! Only reads go through here. A write that fails after its own single
//! attempt surfaces `Unavailable` at the call site; retrying a write could
//! apply it twice.

use std::future::Future;
use std::time::Duration;

use procura_core::{ProcuraError, Result};

/// Run an idempotent read, retrying `Unavailable` failures with doubling
/// backoff up to `attempts` total tries.
///
/// Any other error kind is returned immediately.
pub async fn retry_read<T, F, Fut>(attempts: u32, base_delay: Duration, mut read: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    debug_assert!(attempts > 0);
    let mut delay = base_delay;
    let mut last_err = ProcuraError::unavailable("no attempts configured");

    for attempt in 1..=attempts {
        match read().await {
            Ok(value) => return Ok(value),
            Err(err @ ProcuraError::Unavailable { .. }) => {
                tracing::warn!(attempt, error = %err, "collaborator read failed");
                last_err = err;
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn returns_first_success() {
        let calls = AtomicU32::new(0);
        let result = retry_read(3, Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 1 {
                    Err(ProcuraError::unavailable("transient"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_bounded_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<u32> = retry_read(3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProcuraError::unavailable("still down")) }
        })
        .await;
        assert!(matches!(result, Err(ProcuraError::Unavailable { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<u32> = retry_read(3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProcuraError::not_found("delegation x")) }
        })
        .await;
        assert!(matches!(result, Err(ProcuraError::NotFound { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
