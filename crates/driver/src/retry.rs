//! Retries of external calls with exponential backoff.

use crate::{errors::DriverError, TrackerConfig};
use anyhow::Result;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Runs `op` until it succeeds, sleeping [TrackerConfig::backoff_for_attempt] between attempts.
///
/// ### Takes
/// - `cancel`: Stops the retries. Checked before every attempt and raced against every sleep.
/// - `config`: The backoff bounds.
/// - `op`: Produces a fresh attempt each time it is called.
///
/// ### Returns
/// - `Ok(T)`: The result of the first successful attempt.
/// - `Err(anyhow::Error)`: Wraps [DriverError::Cancelled] once `cancel` fires.
pub async fn until_succeeds<T, F, Fut>(
    cancel: &CancellationToken,
    config: &TrackerConfig,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(DriverError::Cancelled.into());
        }
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        let backoff = config.backoff_for_attempt(attempt);
        tracing::warn!(
            target: "retry",
            attempt,
            backoff_ms = backoff.as_millis() as u64,
            validator = %config.validator_name,
            "Retrying failed operation: {err:#}"
        );
        attempt = attempt.saturating_add(1);
        tokio::select! {
            _ = cancel.cancelled() => return Err(DriverError::Cancelled.into()),
            _ = tokio::time::sleep(backoff) => {}
        }
    }
}

#[cfg(test)]
mod test {
    use super::until_succeeds;
    use crate::{errors::DriverError, TrackerConfig};
    use anyhow::anyhow;
    use std::{
        sync::atomic::{AtomicU32, Ordering},
        time::Duration,
    };
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    fn config() -> TrackerConfig {
        TrackerConfig {
            retry_initial_backoff: Duration::from_secs(1),
            retry_max_backoff: Duration::from_secs(3),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_capped_backoff() {
        let attempts = &AtomicU32::new(0);
        let started = Instant::now();
        let value = until_succeeds(&CancellationToken::new(), &config(), || async move {
            match attempts.fetch_add(1, Ordering::SeqCst) {
                0..=3 => Err(anyhow!("rpc unavailable")),
                n => Ok(n),
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 4);
        // 1s + 2s + 3s + 3s
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(9) && elapsed < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_retries() {
        let cancel = CancellationToken::new();
        let attempts = &AtomicU32::new(0);
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            canceller.cancel();
        });
        let err = until_succeeds(&cancel, &config(), || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(anyhow!("rpc unavailable"))
        })
        .await
        .unwrap_err();
        assert_eq!(err.downcast_ref::<DriverError>(), Some(&DriverError::Cancelled));
        // Attempts at 0s and 1s, then cancelled during the 2s sleep.
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancelled_token_makes_no_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let attempts = &AtomicU32::new(0);
        let result = until_succeeds(&cancel, &config(), || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }
}
