//! HTTP clients for the remote compute platform and object store.
//!
//! Both clients are thin JSON-over-REST wrappers behind the crate's trait
//! seams. Listing calls are wrapped in bounded retry with doubling backoff:
//! the polling loop depends on them succeeding repeatedly over runs that
//! last hours, and a single network hiccup must not fail the batch.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

pub mod compute;
pub mod drive;

pub use compute::{ComputeApiError, HttpComputePlatform};
pub use drive::{HttpObjectStore, StoreApiError};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Runs `operation` up to `attempts` times, sleeping a doubling backoff
/// between failures. The final error is returned unchanged.
pub(crate) async fn with_retries<T, E, F, Fut>(
    attempts: u32,
    label: &str,
    mut operation: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut backoff = INITIAL_BACKOFF;
    let mut attempt = 1_u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts => {
                warn!(
                    operation = label,
                    attempt,
                    error = %err,
                    "transient remote failure; backing off"
                );
                sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("transient")]
    struct Transient;

    #[tokio::test(start_paused = true)]
    async fn retries_until_success_within_budget() {
        let calls = AtomicU32::new(0);
        let result = with_retries(3, "listing", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 { Err(Transient) } else { Ok(n) }
            }
        })
        .await;

        assert!(matches!(result, Ok(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_return_the_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Transient> = with_retries(3, "listing", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Transient) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
