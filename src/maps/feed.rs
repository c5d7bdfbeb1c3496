//! The results feed of a live map search

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::error::CdpError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::panel::ChromePanel;
use super::{FEED_SELECTOR, LISTING_LINK_SELECTOR};
use crate::BrowserManager;
use crate::extraction::{FeedError, FeedResult, ResultsFeed};

/// Pause between bringing a listing into view and clicking it
const PRE_CLICK_PAUSE: Duration = Duration::from_secs(1);

/// A closed websocket, a dropped handler channel or a silent browser all
/// mean the browser is gone. Other errors fall back to message matching.
fn feed_error(e: CdpError) -> FeedError {
    match e {
        CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse => {
            FeedError::SessionLost(e.to_string())
        }
        other => FeedError::classify(other.to_string()),
    }
}

pub struct MapsFeed {
    page: Page,
    panel: ChromePanel,
    manager: Arc<BrowserManager>,
}

impl MapsFeed {
    pub fn new(page: Page, manager: Arc<BrowserManager>) -> Self {
        Self {
            panel: ChromePanel::new(page.clone()),
            page,
            manager,
        }
    }
}

#[async_trait]
impl ResultsFeed for MapsFeed {
    type Panel = ChromePanel;

    async fn loaded_count(&mut self) -> FeedResult<usize> {
        let listings = self
            .page
            .find_elements(LISTING_LINK_SELECTOR)
            .await
            .map_err(feed_error)?;
        Ok(listings.len())
    }

    async fn open_listing(&mut self, index: usize) -> FeedResult<bool> {
        // The feed re-renders as it grows, so element handles are re-queried per visit
        let listings = self
            .page
            .find_elements(LISTING_LINK_SELECTOR)
            .await
            .map_err(feed_error)?;
        let Some(listing) = listings.into_iter().nth(index) else {
            return Ok(false);
        };

        listing.scroll_into_view().await.map_err(feed_error)?;
        tokio::time::sleep(PRE_CLICK_PAUSE).await;

        let point = listing.clickable_point().await.map_err(feed_error)?;
        self.page.click(point).await.map_err(feed_error)?;
        debug!("Opened listing {}", index + 1);

        Ok(true)
    }

    async fn scroll_to_end(&mut self) -> FeedResult<()> {
        let feed = self
            .page
            .find_element(FEED_SELECTOR)
            .await
            .map_err(feed_error)?;
        feed.call_js_fn("function() { this.scrollTop = this.scrollHeight; }", false)
            .await
            .map_err(feed_error)?;
        Ok(())
    }

    fn panel(&self) -> &ChromePanel {
        &self.panel
    }

    async fn release(&mut self) {
        if let Err(e) = self.manager.shutdown().await {
            warn!("Failed to shut down browser: {}", e);
        }
    }
}
