//! Live map page: opening the search, handing over to the operator, and the
//! chromiumoxide-backed feed and panel.

mod feed;
mod panel;

pub use feed::MapsFeed;
pub use panel::ChromePanel;

use anyhow::{Context, Result};
use dialoguer::Input;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::utils::{settle, wait_for_element};
use crate::{BrowserError, BrowserManager, Config};

pub const FEED_SELECTOR: &str = r#"div[role="feed"]"#;
pub const LISTING_LINK_SELECTOR: &str = r#"div[role="feed"] a[href*="/maps/place/"]"#;

const CONSENT_XPATH: &str = "//button[contains(text(), 'Accept') or contains(text(), 'Reject') or contains(text(), 'Got it')]";
const PAGE_LOAD_SETTLE: Duration = Duration::from_secs(3);
const CONSENT_SETTLE: Duration = Duration::from_secs(1);

/// A map page the operator has searched on, ready to be walked
pub struct MapsSession {
    pub feed: MapsFeed,
    /// Label typed by the operator (or passed on the command line)
    pub query: Option<String>,
}

impl MapsSession {
    /// Open the map URL, let the operator run a search, and wait for the
    /// results feed.
    ///
    /// `query` skips the label prompt when already known.
    pub async fn open(
        manager: Arc<BrowserManager>,
        config: &Config,
        query: Option<String>,
        stop: &CancellationToken,
    ) -> Result<Self> {
        let page = manager.new_page().await?;

        info!("Opening {}", config.maps_url);
        page.goto(&config.maps_url)
            .await
            .map_err(|e| BrowserError::NavigationFailed(format!("{}: {}", config.maps_url, e)))?;

        if settle(PAGE_LOAD_SETTLE, stop).await {
            anyhow::bail!("Stopped before the search started");
        }

        dismiss_consent(&page).await;

        println!("\n{}", "=".repeat(60));
        println!("MANUAL SEARCH REQUIRED");
        println!("{}", "=".repeat(60));
        println!("1. Type your search in the map search box");
        println!("   (e.g. 'restaurants in New York')");
        println!("2. Wait for the results list to load");
        println!("3. Come back here and continue");
        println!("{}\n", "=".repeat(60));

        let query = match query {
            Some(query) => Some(query),
            None => prompt("Search query label (optional, for the file name)").await?,
        };
        prompt("Press ENTER once the search results are loaded").await?;

        info!("Waiting for the results feed...");
        wait_for_element(&page, FEED_SELECTOR, config.pagination.feed_timeout())
            .await
            .context("No search results found. Make sure a search was performed.")?;
        info!("Results feed found, starting extraction");

        Ok(Self {
            feed: MapsFeed::new(page, manager),
            query,
        })
    }
}

/// Click a cookie/consent button if one is showing. Absence is normal.
async fn dismiss_consent(page: &chromiumoxide::Page) {
    match page.find_xpaths(CONSENT_XPATH).await {
        Ok(buttons) => {
            if let Some(button) = buttons.into_iter().next() {
                match button.click().await {
                    Ok(_) => {
                        info!("Dismissed consent dialog");
                        tokio::time::sleep(CONSENT_SETTLE).await;
                    }
                    Err(e) => debug!("Consent button not clickable: {}", e),
                }
            }
        }
        Err(e) => debug!("No consent dialog: {}", e),
    }
}

/// Blocking terminal prompt run off the async workers. Blank input is `None`.
async fn prompt(message: &'static str) -> Result<Option<String>> {
    let answer = tokio::task::spawn_blocking(move || {
        Input::<String>::new()
            .with_prompt(message)
            .allow_empty(true)
            .interact_text()
    })
    .await
    .context("Prompt task failed")??;

    let answer = answer.trim();
    Ok((!answer.is_empty()).then(|| answer.to_string()))
}
