use std::future::Future;
use std::time::Duration;

use backoff::backoff::{Backoff, Constant};

/// Up to `attempts` tries of `op`, waiting `interval` (constant backoff,
/// i.e. factor = 1) between failures. Returns the last error once `attempts`
/// is exhausted.
pub async fn with_bounded_retry<T, E, F, Fut>(attempts: usize, interval: Duration, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut backoff = Constant::new(interval);
    let mut last_err = None;
    for attempt in 1..=attempts.max(1) {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                tracing::warn!(attempt, attempts, error = %err, "handler attempt failed");
                last_err = Some(err);
                if attempt < attempts {
                    if let Some(delay) = backoff.next_backoff() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
    Err(last_err.expect("attempts is at least 1, so op() ran and recorded an error"))
}
