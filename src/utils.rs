use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Raised when an operation is abandoned after its deadline.
///
/// Timed-out calls are abandoned via a race against the timer, not cancelled
/// at the network layer; the underlying request may still complete.
#[derive(Debug, Clone, Copy, Error)]
#[error("operation timed out after {}s", .0.as_secs())]
pub struct TimeoutError(pub Duration);

/// Race a fallible operation against a deadline.
///
/// On timeout the operation's own error type absorbs the `TimeoutError`, so
/// callers handle timeouts through the same path as any other failure.
pub async fn with_timeout<T, E, F>(duration: Duration, future: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<TimeoutError>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(TimeoutError(duration).into()),
    }
}
