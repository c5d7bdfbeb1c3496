//! Cancellable pauses used while the map UI settles

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Sleep for `duration` unless `stop` fires first.
///
/// Returns `true` when the pause was cut short by the stop token.
pub async fn settle(duration: Duration, stop: &CancellationToken) -> bool {
    if stop.is_cancelled() {
        return true;
    }
    if duration.is_zero() {
        return false;
    }

    tokio::select! {
        _ = stop.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn full_pause_when_not_stopped() {
        let stop = CancellationToken::new();
        assert!(!settle(Duration::from_secs(3), &stop).await);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_interrupts_pause() {
        let stop = CancellationToken::new();
        let trigger = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        assert!(settle(Duration::from_secs(60), &stop).await);
    }
}
