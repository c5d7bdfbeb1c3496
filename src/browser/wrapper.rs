//! Browser lifecycle for the extraction session
//!
//! Owns the chromiumoxide browser, its CDP handler task and the temporary
//! profile directory created for it.

use chromiumoxide::browser::Browser;
use chromiumoxide::page::Page;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing::info;

use super::{BrowserError, BrowserResult};
use crate::BrowserConfig;

/// Wrapper for Browser and its event handler task
///
/// Handler MUST be aborted when the browser goes away, otherwise it keeps
/// polling a dead websocket. `Drop` takes care of that.
pub struct BrowserWrapper {
    browser: Browser,
    handler: JoinHandle<()>,
    user_data_dir: Option<PathBuf>,
}

impl BrowserWrapper {
    pub(crate) fn new(browser: Browser, handler: JoinHandle<()>, user_data_dir: PathBuf) -> Self {
        Self {
            browser,
            handler,
            user_data_dir: Some(user_data_dir),
        }
    }

    pub(crate) fn browser(&self) -> &Browser {
        &self.browser
    }

    pub(crate) fn browser_mut(&mut self) -> &mut Browser {
        &mut self.browser
    }

    /// Remove the profile directory.
    ///
    /// MUST be called after `browser.wait()` completes so Chrome has released
    /// its file handles.
    pub fn cleanup_temp_dir(&mut self) {
        if let Some(path) = self.user_data_dir.take() {
            info!("Cleaning up temp directory: {}", path.display());
            if let Err(e) = std::fs::remove_dir_all(&path) {
                tracing::warn!(
                    "Failed to clean up temp directory {}: {}. Manual cleanup may be required.",
                    path.display(),
                    e
                );
            }
        }
    }
}

impl Drop for BrowserWrapper {
    fn drop(&mut self) {
        info!("Dropping BrowserWrapper - aborting handler task");
        self.handler.abort();

        if let Some(path) = &self.user_data_dir {
            tracing::warn!(
                "BrowserWrapper dropped without explicit cleanup. \
                Temp directory will be orphaned: {}. \
                Call BrowserManager::shutdown() before dropping to ensure proper cleanup.",
                path.display()
            );
        }
    }
}

/// Launch the extraction browser with its own profile directory.
///
/// Returns tuple of (Browser, JoinHandle, PathBuf) where PathBuf is the
/// temp directory that MUST be cleaned up after browser shuts down.
pub async fn launch_browser(
    config: &BrowserConfig,
) -> anyhow::Result<(Browser, JoinHandle<()>, PathBuf)> {
    info!("Launching extraction browser (headless: {})", config.headless);

    let user_data_dir =
        std::env::temp_dir().join(format!("maps_harvest_profile_{}", std::process::id()));

    let (browser, handler) = crate::browser_setup::launch_browser(
        config,
        Some(user_data_dir.clone()),
    )
    .await?;

    Ok((browser, handler, user_data_dir))
}

/// Create a blank page; navigation to the target happens afterwards.
pub async fn create_blank_page(wrapper: &BrowserWrapper) -> BrowserResult<Page> {
    let page = wrapper
        .browser()
        .new_page("about:blank")
        .await
        .map_err(|e| BrowserError::PageCreationFailed(e.to_string()))?;

    info!("Created blank page");
    Ok(page)
}
