//! Constant-delay bounded retry
//!
//! Used to wait for asynchronous server-side convergence: a deleted custom
//! resource disappearing, or a CRD being registered. Every failed attempt
//! is retried after the same delay until the retry budget runs out.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tracing::trace;

// =============================================================================
// Configuration
// =============================================================================

/// Delay and retry budget for a constant backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantBackoffConfig {
    /// Fixed pause between attempts
    pub delay: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
}

impl Default for ConstantBackoffConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            max_retries: 24,
        }
    }
}

impl ConstantBackoffConfig {
    pub fn new(delay: Duration, max_retries: u32) -> Self {
        Self { delay, max_retries }
    }

    /// Fresh policy for a single retry loop
    pub fn policy(&self) -> ConstantBackoffPolicy {
        ConstantBackoffPolicy {
            config: *self,
            retries: 0,
        }
    }
}

// =============================================================================
// Policy
// =============================================================================

/// Stateful side of a constant backoff, one per retry loop
#[derive(Debug, Clone)]
pub struct ConstantBackoffPolicy {
    config: ConstantBackoffConfig,
    retries: u32,
}

impl backoff::backoff::Backoff for ConstantBackoffPolicy {
    fn reset(&mut self) {
        self.retries = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.retries >= self.config.max_retries {
            return None;
        }
        self.retries += 1;
        Some(self.config.delay)
    }
}

// =============================================================================
// Retry
// =============================================================================

/// Run `operation` until it succeeds or the retry budget is exhausted.
///
/// Exhaustion is reported as [`Error::Timeout`] carrying the last error, so
/// callers can tell a stuck remote apart from a transient API failure.
pub async fn retry<T, F, Fut>(
    config: &ConstantBackoffConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempts = 0u32;

    let result = backoff::future::retry(config.policy(), || {
        attempts += 1;
        trace!(operation = operation_name, attempt = attempts, "attempting");
        let attempt = operation();
        async move { attempt.await.map_err(backoff::Error::transient) }
    })
    .await;

    result.map_err(|last| Error::Timeout {
        operation: operation_name.to_string(),
        attempts,
        source: Box::new(last),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_retries: u32) -> ConstantBackoffConfig {
        ConstantBackoffConfig::new(Duration::from_millis(1), max_retries)
    }

    #[tokio::test]
    async fn test_succeeds_immediately() {
        let calls = AtomicU32::new(0);
        let value = retry(&fast(3), "noop", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(42)
        })
        .await
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let result = retry(&fast(5), "flaky", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(Error::Internal(format!("attempt {}", n)))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_is_timeout() {
        let calls = AtomicU32::new(0);
        let err = retry(&fast(3), "Istio/mesh deletion", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(Error::ResourceStillExists {
                kind: "Istio".into(),
                name: "mesh".into(),
            })
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_matches!(
            err,
            Error::Timeout { attempts: 4, ref source, .. }
                if matches!(**source, Error::ResourceStillExists { .. })
        );
    }

    #[tokio::test]
    async fn test_config_is_reusable() {
        let config = fast(1);
        for _ in 0..2 {
            let calls = AtomicU32::new(0);
            let _ = retry(&config, "reuse", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::Internal("nope".into()))
            })
            .await;
            assert_eq!(calls.load(Ordering::SeqCst), 2);
        }
    }
}
