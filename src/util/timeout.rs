//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use crate::error::BotError;

/// Wrap a future with a timeout.
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T, BotError>>,
) -> Result<T, BotError> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(BotError::Timeout(duration.as_millis() as u64)),
    }
}
