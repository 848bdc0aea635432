//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use crate::error::BridgeError;

/// Wrap a future with a timeout.
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T, BridgeError>>,
) -> Result<T, BridgeError> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(BridgeError::Timeout(duration.as_millis() as u64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn elapsed_future_maps_to_timeout_error() {
        let result = with_timeout(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, BridgeError>(())
        })
        .await;
        assert!(matches!(result, Err(BridgeError::Timeout(50))));
    }

    #[tokio::test]
    async fn inner_error_passes_through() {
        let result: Result<(), BridgeError> = with_timeout(Duration::from_secs(1), async {
            Err(BridgeError::Transport("gone".into()))
        })
        .await;
        assert!(matches!(result, Err(BridgeError::Transport(message)) if message == "gone"));
    }
}
