//! Browser instance manager for an extraction run
//!
//! One browser per run, launched lazily and shut down explicitly once the
//! results have been saved.
//!
//! # Async Lock Requirements
//!
//! Must use `tokio::sync::Mutex`: browser operations are async and the guard
//! is held across `.await` points.

use anyhow::Result;
use chromiumoxide::page::Page;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::BrowserConfig;
use crate::browser::{BrowserError, BrowserWrapper, create_blank_page, launch_browser};

/// Owner of the run's browser with health checking and crash recovery.
///
/// Every `get_or_launch()` pings the browser with a `version()` CDP command;
/// a dead browser is cleaned up and relaunched transparently.
pub struct BrowserManager {
    config: BrowserConfig,
    browser: Arc<Mutex<Option<BrowserWrapper>>>,
}

impl BrowserManager {
    /// Browser will be lazy-loaded on first `get_or_launch()` call.
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            browser: Arc::new(Mutex::new(None)),
        }
    }

    /// Get or launch the browser, relaunching it if the health check fails.
    ///
    /// Returns the shared slot; callers lock it to reach the `BrowserWrapper`.
    pub async fn get_or_launch(&self) -> Result<Arc<Mutex<Option<BrowserWrapper>>>> {
        let mut guard = self.browser.lock().await;

        if let Some(wrapper) = guard.as_ref() {
            match wrapper.browser().version().await {
                Ok(_) => {
                    tracing::debug!("Browser health check passed, reusing existing browser");
                    drop(guard);
                    return Ok(self.browser.clone());
                }
                Err(e) => {
                    tracing::warn!("Browser health check failed: {}. Triggering recovery...", e);

                    if let Some(mut crashed_wrapper) = guard.take() {
                        // Best-effort: the process may already be gone
                        let _ = crashed_wrapper.browser_mut().close().await;
                        let _ = crashed_wrapper.browser_mut().wait().await;
                        crashed_wrapper.cleanup_temp_dir();
                    }

                    tracing::info!("Crashed browser cleaned up, launching new instance");
                }
            }
        }

        let (browser, handler, user_data_dir) = launch_browser(&self.config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(format!("{e:#}")))?;
        *guard = Some(BrowserWrapper::new(browser, handler, user_data_dir));
        drop(guard);

        Ok(self.browser.clone())
    }

    /// Open a fresh blank page in the (possibly newly launched) browser.
    pub async fn new_page(&self) -> Result<Page> {
        let browser_arc = self.get_or_launch().await?;
        let guard = browser_arc.lock().await;
        let wrapper = guard
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Browser not available"))?;

        Ok(create_blank_page(wrapper).await?)
    }

    /// Close the browser process and remove its profile directory.
    ///
    /// Safe to call multiple times (subsequent calls are no-ops).
    ///
    /// Both `close()` and `wait()` are needed: dropping the wrapper only
    /// aborts the handler task and would leave a zombie Chrome behind.
    pub async fn shutdown(&self) -> Result<()> {
        let mut guard = self.browser.lock().await;

        if let Some(mut wrapper) = guard.take() {
            info!("Shutting down browser");

            if let Err(e) = wrapper.browser_mut().close().await {
                tracing::warn!("Failed to close browser cleanly: {}", e);
            }

            if let Err(e) = wrapper.browser_mut().wait().await {
                tracing::warn!("Failed to wait for browser exit: {}", e);
            }

            wrapper.cleanup_temp_dir();
        }

        Ok(())
    }
}

impl Drop for BrowserManager {
    fn drop(&mut self) {
        // Not a clean shutdown: only the handler is aborted (see shutdown())
        info!("BrowserManager dropping - browser will be cleaned up");
    }
}
