//! Element polling for the map page
//!
//! The results feed is rendered by JavaScript well after the load event, so
//! presence is polled with exponential backoff instead of checked once.

use std::future::Future;
use std::time::Duration;

use chromiumoxide::Page;
use chromiumoxide::element::Element;

/// Poll `check` until it yields a value or `timeout` elapses.
///
/// Starts at 100ms intervals, doubling each retry, capped at 1 second.
pub async fn poll_with_backoff<T, F, Fut>(mut check: F, timeout: Duration) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let start = tokio::time::Instant::now();
    let mut poll_interval = Duration::from_millis(100);
    let max_interval = Duration::from_secs(1);

    loop {
        if let Some(value) = check().await {
            return Some(value);
        }

        if start.elapsed() >= timeout {
            return None;
        }

        tokio::time::sleep(poll_interval).await;
        poll_interval = (poll_interval * 2).min(max_interval);
    }
}

/// Wait for an element to appear in the DOM
pub async fn wait_for_element(
    page: &Page,
    selector: &str,
    timeout: Duration,
) -> anyhow::Result<Element> {
    poll_with_backoff(move || async move { page.find_element(selector).await.ok() }, timeout)
        .await
        .ok_or_else(|| {
            anyhow::anyhow!(
                "Element not found (timeout after {}ms): '{}'",
                timeout.as_millis(),
                selector
            )
        })
}
